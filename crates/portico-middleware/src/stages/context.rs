//! Context middleware.
//!
//! Outermost stage. It resolves the correlation ID, opens the per-request
//! tracing span, and drives the transaction lifecycle against the
//! configured [`TraceApp`]:
//!
//! - start a transaction named after the matched route
//! - record the baseline attributes (route, correlation ID, client IP,
//!   build version)
//! - wrap the response writer with the transaction's instrumentation
//! - end the transaction when the chain returns
//!
//! Exempt paths (health probes and the like) skip the transaction but
//! still get a correlation ID and span.
//!
//! ## Correlation ID Sources
//!
//! 1. **Correlation-Id header**: if present and non-empty, used verbatim
//! 2. **Generated UUID v7**: otherwise
//!
//! The inbound value is deliberately not validated; callers may correlate
//! with whatever scheme they already use.

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{PipelineResult, Request};
use portico_core::context::{client_ip, CorrelationId, RequestContext};
use portico_core::trace::TraceApp;
use std::sync::Arc;

/// Service identity carried on every span and transaction.
#[derive(Debug, Clone, Default)]
pub struct ServiceIdentity {
    /// Application name.
    pub app_name: String,
    /// Deployment environment name.
    pub env_name: String,
    /// Build version of the running binary.
    pub build_version: String,
}

/// Middleware that establishes per-request identity and tracing.
pub struct ContextMiddleware {
    trace_app: Arc<dyn TraceApp>,
    identity: ServiceIdentity,
    exempt_paths: Vec<String>,
}

impl ContextMiddleware {
    /// Creates the context middleware.
    ///
    /// `exempt_paths` are matched exactly against the request path;
    /// matching requests do not start a transaction.
    #[must_use]
    pub fn new(
        trace_app: Arc<dyn TraceApp>,
        identity: ServiceIdentity,
        exempt_paths: Vec<String>,
    ) -> Self {
        Self {
            trace_app,
            identity,
            exempt_paths,
        }
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|exempt| exempt == path)
    }
}

impl Middleware for ContextMiddleware {
    fn name(&self) -> &'static str {
        "context"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            let correlation_id = CorrelationId::from_request(&request);
            ctx.set_correlation_id(correlation_id.clone());

            if ctx.route().is_empty() {
                ctx.set_route(request.uri().path().to_string());
            }
            let route = ctx.route().to_string();
            let ip = client_ip(&request, ctx.remote_addr());

            let span = tracing::info_span!(
                "request",
                scope = "request",
                correlation_id = %correlation_id,
                http.method = %request.method(),
                http.path = %request.uri().path(),
                route = %route,
                client_ip = %ip,
                app = %self.identity.app_name,
                env = %self.identity.env_name,
                build_version = %self.identity.build_version,
            );
            ctx.set_span(span);

            if !self.is_exempt(request.uri().path()) {
                let transaction = self.trace_app.start_transaction(&route);
                ctx.set_transaction(transaction);

                ctx.record_attribute("route", &route);
                ctx.record_attribute("correlationID", correlation_id.as_str());
                ctx.record_attribute("ip", &ip);
                ctx.record_attribute("buildVersion", &self.identity.build_version);

                // Instrument the writer so the transaction sees the
                // response as it is produced.
                ctx.wrap_writer_with_transaction();
            }

            let result = next.run(ctx, request).await;

            // Normal exit path; the context's Drop covers unwinds that
            // escape the whole pipeline.
            ctx.end_transaction();

            result
        })
    }
}
