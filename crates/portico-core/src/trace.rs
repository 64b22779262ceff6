//! Tracing-collaborator interface.
//!
//! The pipeline does not implement an APM backend; it consumes one through
//! these traits. A [`TraceApp`] is a single process-wide handle whose
//! [`TraceApp::start_transaction`] is safe to call concurrently; each
//! [`Transaction`] spans exactly one request, collects attributes, wraps the
//! response writer so the SDK observes the same writes, and must be ended
//! exactly once.

use crate::writer::ResponseWriter;
use std::sync::atomic::{AtomicBool, Ordering};

/// Failure to record an attribute on a transaction.
///
/// Attribute recording is advisory: callers log these and carry on.
#[derive(Debug, thiserror::Error)]
#[error("failed to record attribute '{key}': {message}")]
pub struct AttributeError {
    /// The attribute key that was rejected.
    pub key: String,
    /// Backend-specific reason.
    pub message: String,
}

/// Process-wide tracing application handle.
pub trait TraceApp: Send + Sync {
    /// Starts a transaction spanning one request, named after the request
    /// path. Must be safe to call concurrently from many request tasks.
    fn start_transaction(&self, name: &str) -> Box<dyn Transaction>;
}

/// A tracing transaction spanning a single request.
pub trait Transaction: Send + Sync {
    /// Attaches a diagnostic attribute to the transaction.
    fn add_attribute(&self, key: &str, value: &str) -> Result<(), AttributeError>;

    /// Wraps the response writer so the tracing SDK observes the same
    /// writes the client receives (for timing and status capture).
    fn wrap(&self, inner: Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>;

    /// Ends the transaction. Implementations must be idempotent: the
    /// pipeline guarantees an `end` on every exit path and may call it from
    /// both the context stage and the context's drop guard.
    fn end(&self);

    /// Whether the transaction has been ended.
    fn ended(&self) -> bool;
}

/// A tracing application that does nothing. The default when no APM
/// backend is configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTraceApp;

impl TraceApp for NoopTraceApp {
    fn start_transaction(&self, _name: &str) -> Box<dyn Transaction> {
        Box::new(NoopTransaction::default())
    }
}

/// Transaction produced by [`NoopTraceApp`]; tracks only its own end state.
#[derive(Debug, Default)]
pub struct NoopTransaction {
    ended: AtomicBool,
}

impl Transaction for NoopTransaction {
    fn add_attribute(&self, _key: &str, _value: &str) -> Result<(), AttributeError> {
        Ok(())
    }

    fn wrap(&self, inner: Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter> {
        inner
    }

    fn end(&self) {
        self.ended.store(true, Ordering::SeqCst);
    }

    fn ended(&self) -> bool {
        self.ended.load(Ordering::SeqCst)
    }
}
