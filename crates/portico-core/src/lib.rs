//! Core types for the portico request pipeline.
//!
//! This crate holds the vocabulary shared by every stage: the error
//! taxonomy ([`Error`], [`Failure`]), the buffered response-writer chain
//! ([`ResponseWriter`], [`BufferedWriter`]), the tracing collaborator
//! seams ([`TraceApp`], [`Transaction`]), and the per-request
//! [`RequestContext`]. It deliberately knows nothing about the pipeline
//! itself or about any concrete HTTP server.

pub mod context;
pub mod error;
pub mod trace;
pub mod writer;

pub use context::{client_ip, CorrelationId, RequestContext, CORRELATION_ID_HEADER};
pub use error::{
    classify, Error, Failure, FrameworkError, PanicError, ResolvedError, STACK_CAPTURE_LIMIT,
};
pub use trace::{AttributeError, NoopTraceApp, NoopTransaction, TraceApp, Transaction};
pub use writer::{BufferedWriter, NullWriter, Response, ResponseWriter};
