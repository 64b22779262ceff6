//! Request logging middleware.
//!
//! Emits exactly one structured log record per request, after the rest of
//! the chain has finished. Because the error-response stage runs inside
//! this one and converts every failure into a written response, the record
//! always reflects the final outcome: the status actually sent, the total
//! body bytes, and the classified error when there was one.
//!
//! The stage installs a [`ResponseObserver`] on the writer to learn the
//! final status without buffering, and keeps the assembled
//! [`RequestLogRecord`] in the context extensions so hosts and tests can
//! inspect it.

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::observer::{ObserverState, ResponseObserver};
use crate::types::{PipelineResult, Request};
use portico_core::context::RequestContext;
use portico_core::error::ResolvedError;
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

/// Injectable clock, for deterministic duration tests.
pub type TimeSource = Arc<dyn Fn() -> Instant + Send + Sync>;

/// Classified error fields carried on a failed request's log record.
#[derive(Debug, Clone, Serialize)]
pub struct LoggedError {
    /// Stable error code.
    pub code: String,
    /// Human-readable detail.
    pub detail: String,
    /// Diagnostic params, never sent to clients.
    pub params: BTreeMap<String, String>,
    /// Full failure message.
    pub message: String,
}

/// The fields of a single request log record.
#[derive(Debug, Clone, Serialize)]
pub struct RequestLogRecord {
    /// HTTP method.
    pub method: String,
    /// Request path.
    pub path: String,
    /// Matched route pattern.
    pub route: String,
    /// Raw query string, empty when absent.
    pub query: String,
    /// Host header, empty when absent.
    pub host: String,
    /// Request body length in bytes.
    pub content_length: u64,
    /// User-Agent header, empty when absent.
    pub user_agent: String,
    /// Referer header, empty when absent.
    pub referer: String,
    /// X-Forwarded-For header, empty when absent.
    pub forwarded_for: String,
    /// X-Forwarded-Proto header, empty when absent.
    pub forwarded_proto: String,
    /// Final response status.
    pub status: u16,
    /// Response body bytes written.
    pub bytes_written: u64,
    /// Wall-clock handling time in milliseconds.
    pub duration_ms: u64,
    /// Correlation ID for this request.
    pub correlation_id: String,
    /// Classified error, when the request failed.
    pub error: Option<LoggedError>,
    /// Captured stack trace, panics only.
    pub stack_trace: Option<String>,
}

fn header_string(request: &Request, name: &str) -> String {
    request
        .headers()
        .get(name)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn logged_error(resolved: &ResolvedError) -> LoggedError {
    LoggedError {
        code: resolved.error.code.clone(),
        detail: resolved.error.detail.clone(),
        params: resolved.error.params.clone(),
        message: resolved.message.clone(),
    }
}

/// Middleware that logs one record per request.
pub struct RequestLoggerMiddleware {
    now: TimeSource,
    exempt_paths: Vec<String>,
}

impl RequestLoggerMiddleware {
    /// Creates the logger with the system clock.
    #[must_use]
    pub fn new(exempt_paths: Vec<String>) -> Self {
        Self::with_time_source(Arc::new(Instant::now), exempt_paths)
    }

    /// Creates the logger with an injected clock.
    #[must_use]
    pub fn with_time_source(now: TimeSource, exempt_paths: Vec<String>) -> Self {
        Self { now, exempt_paths }
    }

    fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.iter().any(|exempt| exempt == path)
    }
}

impl Middleware for RequestLoggerMiddleware {
    fn name(&self) -> &'static str {
        "request_logger"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if self.is_exempt(request.uri().path()) {
                return next.run(ctx, request).await;
            }

            let method = request.method().to_string();
            let path = request.uri().path().to_string();
            let query = request.uri().query().unwrap_or_default().to_string();
            let host = header_string(&request, "host");
            let user_agent = header_string(&request, "user-agent");
            let referer = header_string(&request, "referer");
            let forwarded_for = header_string(&request, "x-forwarded-for");
            let forwarded_proto = header_string(&request, "x-forwarded-proto");
            let content_length = request.body().len() as u64;

            let state = ObserverState::new();
            let observer_state = state.clone();
            ctx.wrap_writer(move |inner| Box::new(ResponseObserver::new(inner, observer_state)));

            let start = (self.now)();
            let result = next.run(ctx, request).await;
            let elapsed = (self.now)().duration_since(start);

            let record = RequestLogRecord {
                method,
                path,
                route: ctx.route().to_string(),
                query,
                host,
                content_length,
                user_agent,
                referer,
                forwarded_for,
                forwarded_proto,
                status: state.effective_status().as_u16(),
                bytes_written: state.bytes_written(),
                duration_ms: u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX),
                correlation_id: ctx.correlation_id().as_str().to_string(),
                error: ctx.resolved_error().map(logged_error),
                stack_trace: ctx
                    .resolved_error()
                    .and_then(|resolved| resolved.stack_trace.clone()),
            };

            let message = format!("[{}] {} {}", record.method, record.route, record.status);
            match &record.error {
                Some(error) => {
                    tracing::error!(
                        parent: ctx.span(),
                        correlation_id = %record.correlation_id,
                        http.method = %record.method,
                        http.path = %record.path,
                        route = %record.route,
                        query = %record.query,
                        host = %record.host,
                        content_length = record.content_length,
                        user_agent = %record.user_agent,
                        referer = %record.referer,
                        forwarded_for = %record.forwarded_for,
                        forwarded_proto = %record.forwarded_proto,
                        http.status_code = record.status,
                        bytes_written = record.bytes_written,
                        duration_ms = record.duration_ms,
                        error.code = %error.code,
                        error.detail = %error.detail,
                        error.params = %serde_json::to_string(&error.params).unwrap_or_default(),
                        error.message = %error.message,
                        stack_trace = record.stack_trace.as_deref().unwrap_or_default(),
                        "{message}",
                    );
                }
                None => {
                    tracing::info!(
                        parent: ctx.span(),
                        correlation_id = %record.correlation_id,
                        http.method = %record.method,
                        http.path = %record.path,
                        route = %record.route,
                        query = %record.query,
                        host = %record.host,
                        content_length = record.content_length,
                        user_agent = %record.user_agent,
                        referer = %record.referer,
                        forwarded_for = %record.forwarded_for,
                        forwarded_proto = %record.forwarded_proto,
                        http.status_code = record.status,
                        bytes_written = record.bytes_written,
                        duration_ms = record.duration_ms,
                        "{message}",
                    );
                }
            }

            ctx.set_extension(record);
            result
        })
    }
}
