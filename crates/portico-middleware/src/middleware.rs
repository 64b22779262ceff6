//! Core middleware trait and chain types.
//!
//! This module defines the [`Middleware`] trait that all pipeline stages
//! implement, the [`Next`] chain that threads a request through them, and
//! the [`Handler`] trait for the terminal application callback.
//!
//! # Design Philosophy
//!
//! portico uses a fixed-order middleware pipeline. Stages cannot be
//! reordered or interleaved by users; the pipeline builder sorts them by
//! their [`Stage`](crate::pipeline::Stage) position. This ensures the
//! recovery, error-emission, and logging guarantees hold for every service.
//!
//! # Example
//!
//! ```ignore
//! use portico_middleware::{Middleware, Next, Request, PipelineResult, BoxFuture};
//! use portico_core::RequestContext;
//!
//! struct TimingMiddleware;
//!
//! impl Middleware for TimingMiddleware {
//!     fn name(&self) -> &'static str {
//!         "timing"
//!     }
//!
//!     fn process<'a>(
//!         &'a self,
//!         ctx: &'a mut RequestContext,
//!         request: Request,
//!         next: Next<'a>,
//!     ) -> BoxFuture<'a, PipelineResult> {
//!         Box::pin(async move {
//!             let start = std::time::Instant::now();
//!             let result = next.run(ctx, request).await;
//!             tracing::debug!(elapsed = ?start.elapsed(), "handled");
//!             result
//!         })
//!     }
//! }
//! ```

use crate::types::{PipelineResult, Request};
use portico_core::context::RequestContext;
use std::future::Future;
use std::pin::Pin;

/// A boxed future tied to the borrow of the context it works on.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// The core middleware trait.
///
/// All pipeline stages implement this trait. A stage receives the mutable
/// per-request context, the incoming request, and a [`Next`] to invoke the
/// rest of the chain.
///
/// # Invariants
///
/// - A stage MUST call `next.run()` exactly once, unless it
///   short-circuits with its own result
/// - A stage MUST NOT suppress a downstream [`Failure`] it is not
///   responsible for handling
///
/// [`Failure`]: portico_core::error::Failure
pub trait Middleware: Send + Sync + 'static {
    /// Returns the unique name of this middleware stage.
    ///
    /// This name is used for logging and debugging.
    fn name(&self) -> &'static str;

    /// Process the request through this middleware.
    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult>;
}

/// The terminal application callback at the end of the chain.
///
/// Handlers write their response through the context's writer and report
/// failures through the returned [`PipelineResult`]; they never build raw
/// HTTP responses themselves.
///
/// Plain functions with the matching signature implement this trait:
///
/// ```ignore
/// fn hello<'a>(
///     ctx: &'a mut RequestContext,
///     _request: Request,
/// ) -> BoxFuture<'a, PipelineResult> {
///     Box::pin(async move {
///         ctx.json(http::StatusCode::OK, &serde_json::json!({"hello": "world"}))
///     })
/// }
/// ```
pub trait Handler: Send + Sync {
    /// Handles the request, writing the response through `ctx`.
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
    ) -> BoxFuture<'a, PipelineResult>;
}

impl<F> Handler for F
where
    F: for<'a> Fn(&'a mut RequestContext, Request) -> BoxFuture<'a, PipelineResult> + Send + Sync,
{
    fn call<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
    ) -> BoxFuture<'a, PipelineResult> {
        self(ctx, request)
    }
}

/// Callback to invoke the next middleware in the chain.
///
/// This type is passed to middleware and must be called (exactly once)
/// to continue processing. If not called, the middleware short-circuits
/// the pipeline and returns its own result.
pub struct Next<'a> {
    inner: NextInner<'a>,
}

enum NextInner<'a> {
    /// More middleware to process
    Chain {
        middleware: &'a dyn Middleware,
        next: Box<Next<'a>>,
    },
    /// End of chain, invoke the handler
    Handler(&'a dyn Handler),
}

impl<'a> Next<'a> {
    /// Creates a new `Next` that will invoke the given middleware.
    pub(crate) fn new(middleware: &'a dyn Middleware, next: Next<'a>) -> Self {
        Self {
            inner: NextInner::Chain {
                middleware,
                next: Box::new(next),
            },
        }
    }

    /// Creates a terminal `Next` that invokes the handler.
    pub(crate) fn handler(handler: &'a dyn Handler) -> Self {
        Self {
            inner: NextInner::Handler(handler),
        }
    }

    /// Invokes the next middleware or handler in the chain.
    ///
    /// This consumes `self` to ensure it can only be called once.
    pub async fn run(self, ctx: &mut RequestContext, request: Request) -> PipelineResult {
        match self.inner {
            NextInner::Chain { middleware, next } => {
                middleware.process(ctx, request, *next).await
            }
            NextInner::Handler(handler) => handler.call(ctx, request).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use portico_core::writer::BufferedWriter;

    struct MarkingMiddleware {
        name: &'static str,
    }

    impl Middleware for MarkingMiddleware {
        fn name(&self) -> &'static str {
            self.name
        }

        fn process<'a>(
            &'a self,
            ctx: &'a mut RequestContext,
            request: Request,
            next: Next<'a>,
        ) -> BoxFuture<'a, PipelineResult> {
            Box::pin(async move {
                ctx.set_extension(format!("visited:{}", self.name));
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
    async fn test_terminal_handler() {
        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, false);

        let next = Next::handler(&ok_handler);
        next.run(&mut ctx, test_request()).await.unwrap();

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(&writer.body()[..], b"OK");
    }

    #[tokio::test]
    async fn test_middleware_chain_runs_through() {
        let mw1 = MarkingMiddleware { name: "first" };
        let mw2 = MarkingMiddleware { name: "second" };

        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, false);

        let next = Next::new(&mw1, Next::new(&mw2, Next::handler(&ok_handler)));
        next.run(&mut ctx, test_request()).await.unwrap();

        assert_eq!(
            ctx.get_extension::<String>().map(String::as_str),
            Some("visited:second")
        );
        assert_eq!(writer.status(), Some(StatusCode::OK));
    }
}
