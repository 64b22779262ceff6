//! Application assembly and request dispatch.
//!
//! [`App`] owns the route table and the six-stage pipeline, and turns one
//! buffered HTTP request into one buffered HTTP response. Routing failures
//! are dispatched through the pipeline like any other failure, so a 404
//! gets the same taxonomy body, transaction attributes, and log record as
//! a handler error.

use crate::config::AppConfig;
use bytes::Bytes;
use http::{Method, StatusCode};
use portico_core::error::{Failure, FrameworkError};
use portico_core::trace::{NoopTraceApp, TraceApp};
use portico_core::writer::BufferedWriter;
use portico_core::{RequestContext, Response};
use portico_middleware::pipeline::{Pipeline, Stage};
use portico_middleware::stages::{
    ContextMiddleware, DebugDumpMiddleware, DefaultHeadersMiddleware, ErrorResponseMiddleware,
    ErrorWriter, RecoveryMiddleware, RequestLoggerMiddleware, ServiceIdentity,
};
use portico_middleware::{BoxFuture, Handler, PipelineResult, Request};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

/// Path parameters captured from the matched route pattern.
///
/// Stored in the request context's extensions; handlers read them with
/// [`RequestContext::get_extension`].
#[derive(Debug, Clone, Default)]
pub struct PathParams(HashMap<String, String>);

impl PathParams {
    /// Returns the captured value for `name`.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    /// Number of captured parameters.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether no parameters were captured.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

struct Route {
    method: Method,
    pattern: String,
    handler: Arc<dyn Handler>,
}

/// Matches `path` against a `:param` pattern, capturing parameters.
fn match_pattern(pattern: &str, path: &str) -> Option<HashMap<String, String>> {
    let pattern_segments: Vec<&str> = pattern.trim_matches('/').split('/').collect();
    let path_segments: Vec<&str> = path.trim_matches('/').split('/').collect();
    if pattern_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = HashMap::new();
    for (pat, seg) in pattern_segments.iter().zip(&path_segments) {
        if let Some(name) = pat.strip_prefix(':') {
            if seg.is_empty() {
                return None;
            }
            params.insert(name.to_string(), (*seg).to_string());
        } else if pat != seg {
            return None;
        }
    }
    Some(params)
}

/// Terminal handler for requests that did not match any route.
struct UnroutedHandler {
    status: StatusCode,
}

impl Handler for UnroutedHandler {
    fn call<'a>(
        &'a self,
        _ctx: &'a mut RequestContext,
        _request: Request,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move { Err(Failure::Framework(FrameworkError::from_status(self.status))) })
    }
}

enum Dispatch {
    Handler {
        pattern: String,
        params: PathParams,
        handler: Arc<dyn Handler>,
    },
    Unrouted(StatusCode),
}

/// A portico application: route table plus pipeline.
///
/// # Example
///
/// ```ignore
/// use portico::{App, AppConfig};
///
/// let mut app = App::new(AppConfig::default());
/// app.route(http::Method::GET, "/users/:id", get_user);
/// let response = app.handle(request, None).await;
/// ```
pub struct App {
    config: AppConfig,
    pipeline: Pipeline,
    routes: Vec<Route>,
}

impl App {
    /// Creates an application with no external tracing agent.
    #[must_use]
    pub fn new(config: AppConfig) -> Self {
        Self::builder(config).build()
    }

    /// Creates an application builder.
    #[must_use]
    pub fn builder(config: AppConfig) -> AppBuilder {
        AppBuilder {
            config,
            trace_app: Arc::new(NoopTraceApp),
            error_writer: None,
        }
    }

    /// Registers a handler for a method and `:param` route pattern.
    pub fn route<H: Handler + 'static>(&mut self, method: Method, pattern: &str, handler: H) {
        self.routes.push(Route {
            method,
            pattern: pattern.to_string(),
            handler: Arc::new(handler),
        });
    }

    /// Returns the application configuration.
    #[must_use]
    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    fn dispatch_for(&self, method: &Method, path: &str) -> Dispatch {
        let mut path_matched = false;
        for route in &self.routes {
            let Some(params) = match_pattern(&route.pattern, path) else {
                continue;
            };
            if &route.method == method {
                return Dispatch::Handler {
                    pattern: route.pattern.clone(),
                    params: PathParams(params),
                    handler: Arc::clone(&route.handler),
                };
            }
            path_matched = true;
        }

        if path_matched {
            Dispatch::Unrouted(StatusCode::METHOD_NOT_ALLOWED)
        } else {
            Dispatch::Unrouted(StatusCode::NOT_FOUND)
        }
    }

    /// Handles one buffered request, producing one buffered response.
    ///
    /// Always returns a response: every failure path inside the pipeline
    /// ends with a written error body.
    pub async fn handle(&self, request: Request, remote_addr: Option<SocketAddr>) -> Response {
        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(
            Box::new(writer.clone()),
            remote_addr,
            self.config.debug(),
        );

        let dispatch = self.dispatch_for(request.method(), request.uri().path());
        let handler: Arc<dyn Handler> = match dispatch {
            Dispatch::Handler {
                pattern,
                params,
                handler,
            } => {
                ctx.set_route(pattern);
                ctx.set_extension(params);
                handler
            }
            Dispatch::Unrouted(status) => Arc::new(UnroutedHandler { status }),
        };

        let result = self
            .pipeline
            .process(&mut ctx, request, handler.as_ref())
            .await;
        if let Err(err) = result {
            // A correctly assembled pipeline converts everything inside;
            // this only fires when the error-response stage is missing.
            tracing::error!(%err, "failure escaped the pipeline");
            let error = portico_core::error::classify(&err);
            if let Err(write_err) = ctx.json(error.status, &error) {
                tracing::error!(err = %write_err, "failed to write fallback error body");
            }
        }
        drop(ctx);

        writer.take_response()
    }

    /// Builds a fresh request from hyper parts, for host integrations.
    #[must_use]
    pub fn request_from_parts(parts: http::request::Parts, body: Bytes) -> Request {
        Request::from_parts(parts, body)
    }
}

/// Builder for [`App`].
pub struct AppBuilder {
    config: AppConfig,
    trace_app: Arc<dyn TraceApp>,
    error_writer: Option<ErrorWriter>,
}

impl AppBuilder {
    /// Sets the tracing collaborator.
    #[must_use]
    pub fn trace_app(mut self, trace_app: Arc<dyn TraceApp>) -> Self {
        self.trace_app = trace_app;
        self
    }

    /// Replaces the default error body writer.
    #[must_use]
    pub fn error_writer(mut self, writer: ErrorWriter) -> Self {
        self.error_writer = Some(writer);
        self
    }

    /// Assembles the pipeline and the application.
    ///
    /// The health endpoint is registered automatically.
    #[must_use]
    pub fn build(self) -> App {
        let exempt = self.config.exempt_paths().to_vec();
        let error_response = match self.error_writer {
            Some(writer) => ErrorResponseMiddleware::with_writer(writer),
            None => ErrorResponseMiddleware::new(),
        };

        let identity = ServiceIdentity {
            app_name: self.config.app_name().to_string(),
            env_name: self.config.env_name().to_string(),
            build_version: self.config.build_version().to_string(),
        };

        let mut builder = Pipeline::builder().stage(
            Stage::Context,
            ContextMiddleware::new(self.trace_app, identity, exempt.clone()),
        );
        if self.config.use_default_headers() {
            builder = builder.stage(
                Stage::DefaultHeaders,
                DefaultHeadersMiddleware::new(self.config.build_version()),
            );
        }
        let pipeline = builder
            .stage(Stage::RequestLogger, RequestLoggerMiddleware::new(exempt))
            .stage(Stage::DebugDump, DebugDumpMiddleware::new())
            .stage(Stage::ErrorResponse, error_response)
            .stage(Stage::Recovery, RecoveryMiddleware::new())
            .build();

        let mut app = App {
            config: self.config,
            pipeline,
            routes: Vec::new(),
        };
        app.route(Method::GET, "/health", crate::health::health_handler);
        app
    }
}
