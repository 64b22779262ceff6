//! Fixed-order middleware pipeline.
//!
//! This module implements the pipeline that every request flows through.
//! Stage positions are declared centrally by the [`Stage`] enum; the
//! builder sorts registered middleware by position regardless of
//! registration order, so the ordering guarantees cannot be broken by a
//! misassembled pipeline.
//!
//! ## Pipeline Stages
//!
//! From outermost to innermost:
//!
//! 1. **Context** - correlation ID, request span, tracing transaction
//! 2. **Default Headers** - security headers and correlation echo
//! 3. **Request Logger** - one structured record per request
//! 4. **Debug Dump** - request/response dump when debug is on
//! 5. **Error Response** - classify failures and emit the error body
//! 6. **Recovery** - convert panics into failures
//!
//! The handler runs inside all of them. Recovery sits innermost so every
//! outer stage observes a panic as an ordinary [`Failure`]; the error
//! response is emitted inside the logger so the logger sees the final
//! classified outcome.
//!
//! [`Failure`]: portico_core::error::Failure

use crate::middleware::{Handler, Middleware, Next};
use crate::types::{PipelineResult, Request};
use portico_core::context::RequestContext;
use std::sync::Arc;

/// A type-erased middleware that can be stored in a vector.
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Middleware stage positions.
///
/// The discriminant is the distance from the edge of the pipeline: lower
/// runs outermost. Registration order never matters; the builder sorts by
/// this value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(u8)]
pub enum Stage {
    /// Stage 1: correlation ID, span, and transaction lifecycle
    Context = 1,
    /// Stage 2: default response headers
    DefaultHeaders = 2,
    /// Stage 3: per-request structured log record
    RequestLogger = 3,
    /// Stage 4: request/response debug dump
    DebugDump = 4,
    /// Stage 5: failure classification and error body emission
    ErrorResponse = 5,
    /// Stage 6: panic capture, innermost
    Recovery = 6,
}

impl Stage {
    /// Returns the stage name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Context => "context",
            Self::DefaultHeaders => "default_headers",
            Self::RequestLogger => "request_logger",
            Self::DebugDump => "debug_dump",
            Self::ErrorResponse => "error_response",
            Self::Recovery => "recovery",
        }
    }

    /// Returns all stages, outermost first.
    #[must_use]
    pub const fn all() -> [Stage; 6] {
        [
            Self::Context,
            Self::DefaultHeaders,
            Self::RequestLogger,
            Self::DebugDump,
            Self::ErrorResponse,
            Self::Recovery,
        ]
    }
}

/// The fixed-order middleware pipeline.
///
/// Construction goes through [`PipelineBuilder`], which pins each
/// middleware to a [`Stage`]. After `build()` the order is immutable.
///
/// # Example
///
/// ```ignore
/// use portico_middleware::pipeline::{Pipeline, Stage};
///
/// let pipeline = Pipeline::builder()
///     .stage(Stage::Recovery, RecoveryMiddleware::new())
///     .stage(Stage::Context, ContextMiddleware::new(trace_app, exempt))
///     .build();
///
/// let result = pipeline.process(&mut ctx, request, &handler).await;
/// ```
pub struct Pipeline {
    /// Stages sorted outermost first.
    stages: Vec<(Stage, BoxedMiddleware)>,
}

impl Pipeline {
    /// Creates a new pipeline builder.
    #[must_use]
    pub fn builder() -> PipelineBuilder {
        PipelineBuilder::new()
    }

    /// Processes a request through the pipeline and into the handler.
    ///
    /// The response is written through the context's writer; the returned
    /// result only reports failures that escaped the outermost stage,
    /// which a correctly assembled pipeline never produces.
    pub async fn process(
        &self,
        ctx: &mut RequestContext,
        request: Request,
        handler: &dyn Handler,
    ) -> PipelineResult {
        let next = self.build_chain(handler);
        next.run(ctx, request).await
    }

    fn build_chain<'a>(&'a self, handler: &'a dyn Handler) -> Next<'a> {
        let mut next = Next::handler(handler);
        // Innermost stage wraps first.
        for (_, middleware) in self.stages.iter().rev() {
            next = Next::new(middleware.as_ref(), next);
        }
        next
    }

    /// Returns the names of all middleware stages, outermost first.
    #[must_use]
    pub fn stage_names(&self) -> Vec<&'static str> {
        self.stages.iter().map(|(_, mw)| mw.name()).collect()
    }

    /// Returns the number of middleware stages.
    #[must_use]
    pub fn stage_count(&self) -> usize {
        self.stages.len()
    }
}

/// Builder for constructing a [`Pipeline`].
///
/// Each middleware is registered against a [`Stage`]; `build()` sorts by
/// stage position, so callers cannot produce a misordered pipeline.
pub struct PipelineBuilder {
    stages: Vec<(Stage, BoxedMiddleware)>,
}

impl PipelineBuilder {
    /// Creates an empty pipeline builder.
    #[must_use]
    pub fn new() -> Self {
        Self { stages: Vec::new() }
    }

    /// Registers a middleware at its pipeline stage.
    ///
    /// Registering two middleware at the same stage keeps both, in
    /// registration order within the stage.
    #[must_use]
    pub fn stage<M: Middleware>(mut self, stage: Stage, middleware: M) -> Self {
        self.stages.push((stage, Arc::new(middleware)));
        self
    }

    /// Builds the pipeline, sorting registered middleware by stage.
    #[must_use]
    pub fn build(mut self) -> Pipeline {
        // Stable sort keeps registration order within a stage.
        self.stages.sort_by_key(|(stage, _)| *stage);
        Pipeline {
            stages: self.stages,
        }
    }
}

impl Default for PipelineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::BoxFuture;
    use bytes::Bytes;
    use http::StatusCode;
    use portico_core::writer::BufferedWriter;
    use std::sync::Mutex;

    struct OrderTrackingMiddleware {
        name: &'static str,
        order: Arc<Mutex<Vec<&'static str>>>,
    }

    impl Middleware for OrderTrackingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut RequestContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, PipelineResult> {
            let order = Arc::clone(&self.order);
            let name = self.name;
            Box::pin(async move {
                order.lock().unwrap().push(name);
                next.run(ctx, request).await
            })
        }
    }

    fn ok_handler<'a>(
        ctx: &'a mut RequestContext,
        _request: Request,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move { ctx.json_blob(StatusCode::OK, b"OK") })
    }

    fn test_request() -> Request {
        http::Request::builder()
            .uri("/test")
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn registration_order_does_not_matter() {
        let order = Arc::new(Mutex::new(Vec::new()));

        // Registered innermost-first on purpose.
        let pipeline = Pipeline::builder()
            .stage(
                Stage::Recovery,
                OrderTrackingMiddleware {
                    name: "recovery",
                    order: Arc::clone(&order),
                },
            )
            .stage(
                Stage::ErrorResponse,
                OrderTrackingMiddleware {
                    name: "error_response",
                    order: Arc::clone(&order),
                },
            )
            .stage(
                Stage::Context,
                OrderTrackingMiddleware {
                    name: "context",
                    order: Arc::clone(&order),
                },
            )
            .build();

        assert_eq!(
            pipeline.stage_names(),
            vec!["context", "error_response", "recovery"]
        );

        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, false);
        pipeline
            .process(&mut ctx, test_request(), &ok_handler)
            .await
            .unwrap();

        assert_eq!(
            *order.lock().unwrap(),
            vec!["context", "error_response", "recovery"]
        );
        assert_eq!(writer.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn empty_pipeline_invokes_handler() {
        let pipeline = Pipeline::builder().build();
        assert_eq!(pipeline.stage_count(), 0);

        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, false);
        pipeline
            .process(&mut ctx, test_request(), &ok_handler)
            .await
            .unwrap();
        assert_eq!(&writer.body()[..], b"OK");
    }

    #[test]
    fn stage_positions_are_fixed() {
        assert!(Stage::Context < Stage::DefaultHeaders);
        assert!(Stage::DefaultHeaders < Stage::RequestLogger);
        assert!(Stage::RequestLogger < Stage::DebugDump);
        assert!(Stage::DebugDump < Stage::ErrorResponse);
        assert!(Stage::ErrorResponse < Stage::Recovery);
    }

    #[test]
    fn stage_names_are_stable() {
        let names: Vec<_> = Stage::all().iter().map(|s| s.name()).collect();
        assert_eq!(
            names,
            vec![
                "context",
                "default_headers",
                "request_logger",
                "debug_dump",
                "error_response",
                "recovery",
            ]
        );
    }
}
