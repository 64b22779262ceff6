//! Error response middleware.
//!
//! Catches every [`Failure`] coming out of the inner chain, classifies it
//! into the stable [`Error`] taxonomy, records the error attributes on the
//! tracing transaction, and writes the error body. The stage always
//! returns `Ok`, so stages outside it (logger, headers, context) never see
//! a failure, only the finished response.
//!
//! The body is produced by an [`ErrorWriter`] callback so hosts can shape
//! their own error envelope. The callback runs under a panic guard; if it
//! panics or fails, the default JSON body is written instead.

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{PipelineResult, Request};
use portico_core::context::RequestContext;
use portico_core::error::{classify, Error, Failure, ResolvedError};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

/// Callback that writes the error body for a classified error.
pub type ErrorWriter = Arc<dyn Fn(&mut RequestContext, &Error) -> PipelineResult + Send + Sync>;

/// Writes the default error body: the error serialized as JSON, with its
/// status. Only `code` and `detail` reach the wire; params stay internal.
pub fn default_error_writer(ctx: &mut RequestContext, error: &Error) -> PipelineResult {
    ctx.json(error.status, error)
}

/// Middleware that classifies failures and emits error responses.
pub struct ErrorResponseMiddleware {
    writer: ErrorWriter,
}

impl ErrorResponseMiddleware {
    /// Creates the middleware with the default JSON error body.
    #[must_use]
    pub fn new() -> Self {
        Self {
            writer: Arc::new(default_error_writer),
        }
    }

    /// Creates the middleware with a custom error body writer.
    #[must_use]
    pub fn with_writer(writer: ErrorWriter) -> Self {
        Self { writer }
    }

    fn emit(&self, ctx: &mut RequestContext, error: &Error) {
        let outcome =
            std::panic::catch_unwind(AssertUnwindSafe(|| (self.writer)(ctx, error)));
        match outcome {
            Ok(Ok(())) => return,
            Ok(Err(err)) => {
                tracing::error!(parent: ctx.span(), %err, "error writer failed");
            }
            Err(_) => {
                tracing::error!(parent: ctx.span(), "error writer panicked");
            }
        }
        if let Err(err) = default_error_writer(ctx, error) {
            tracing::error!(parent: ctx.span(), %err, "failed to write error response");
        }
    }
}

impl Default for ErrorResponseMiddleware {
    fn default() -> Self {
        Self::new()
    }
}

impl Middleware for ErrorResponseMiddleware {
    fn name(&self) -> &'static str {
        "error_response"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let Err(failure) = next.run(ctx, request).await else {
                return Ok(());
            };

            let error = classify(&failure);
            let stack_trace = match &failure {
                Failure::Panic(panic) => Some(panic.stack_trace.clone()),
                _ => None,
            };
            let resolved = ResolvedError {
                message: failure.to_string(),
                error: error.clone(),
                stack_trace,
            };

            ctx.record_attribute("errorCode", &error.code);
            ctx.record_attribute("errorDetail", &error.detail);
            ctx.record_attribute("errorReason", &resolved.message);
            ctx.set_resolved_error(resolved);

            self.emit(ctx, &error);
            Ok(())
        })
    }
}
