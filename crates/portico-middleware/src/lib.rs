//! # portico middleware
//!
//! Fixed-order request-processing pipeline for portico services.
//!
//! Every request flows through six stages wrapped around the application
//! handler. The order is fixed by the [`pipeline::Stage`] enum and cannot
//! be changed by users, so the recovery, error-emission, and logging
//! guarantees hold for every service.
//!
//! ## Pipeline Stages
//!
//! ```text
//! Request → Context → DefaultHeaders → RequestLogger → DebugDump
//!             → ErrorResponse → Recovery → Handler
//! ```
//!
//! | Stage | Middleware       | Purpose                                   |
//! |-------|------------------|-------------------------------------------|
//! | 1     | Context          | Correlation ID, span, transaction          |
//! | 2     | Default Headers  | Security headers, correlation echo        |
//! | 3     | Request Logger   | One structured log record per request     |
//! | 4     | Debug Dump       | Request/response dump in debug mode       |
//! | 5     | Error Response   | Classify failures, write error body       |
//! | 6     | Recovery         | Convert panics into failures              |
//!
//! ## Key Guarantees
//!
//! - **Panics never escape**: recovery sits innermost, so a panicking
//!   handler produces the standard 500 body and a log record like any
//!   other failure
//! - **One log record per request**: the logger wraps the error-response
//!   stage and always sees the final status and classified error
//! - **Exactly-once transaction end**: the context stage ends the
//!   transaction on the normal path, the context's drop covers the rest
//!
//! ## Example
//!
//! ```ignore
//! use portico_middleware::pipeline::{Pipeline, Stage};
//! use portico_middleware::stages::*;
//!
//! let identity = ServiceIdentity {
//!     app_name: "widget-svc".into(),
//!     env_name: "production".into(),
//!     build_version: "1.0.0".into(),
//! };
//! let pipeline = Pipeline::builder()
//!     .stage(Stage::Context, ContextMiddleware::new(trace_app, identity, exempt))
//!     .stage(Stage::DefaultHeaders, DefaultHeadersMiddleware::new("1.0.0"))
//!     .stage(Stage::RequestLogger, RequestLoggerMiddleware::new(exempt2))
//!     .stage(Stage::DebugDump, DebugDumpMiddleware::new())
//!     .stage(Stage::ErrorResponse, ErrorResponseMiddleware::new())
//!     .stage(Stage::Recovery, RecoveryMiddleware::new())
//!     .build();
//! ```

#![forbid(unsafe_code)]

pub mod middleware;
pub mod observer;
pub mod pipeline;
pub mod stages;
pub mod types;

// Re-export main types at crate root
pub use middleware::{BoxFuture, Handler, Middleware, Next};
pub use observer::{ObserverState, ResponseObserver};
pub use pipeline::{Pipeline, PipelineBuilder, Stage};
pub use types::{PipelineResult, Request};
