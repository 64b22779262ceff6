//! # portico
//!
//! HTTP service shell with a fixed middleware pipeline, a stable error
//! taxonomy, and per-request telemetry.
//!
//! Every request an [`App`] handles flows through six fixed stages around
//! the handler:
//!
//! ```text
//! Request → Context → DefaultHeaders → RequestLogger → DebugDump
//!             → ErrorResponse → Recovery → Handler
//! ```
//!
//! That buys three guarantees no handler can break:
//!
//! - a panicking handler produces the standard 500 body, not a dropped
//!   connection
//! - every request emits exactly one structured log record with the final
//!   status and classified error
//! - the tracing transaction is ended exactly once, on every path
//!
//! ## Example
//!
//! ```rust,ignore
//! use portico::{App, AppConfig, serve};
//! use portico_core::RequestContext;
//! use portico_middleware::{BoxFuture, PipelineResult, Request};
//! use std::sync::Arc;
//!
//! fn get_user<'a>(
//!     ctx: &'a mut RequestContext,
//!     _request: Request,
//! ) -> BoxFuture<'a, PipelineResult> {
//!     Box::pin(async move {
//!         let id = ctx
//!             .get_extension::<portico::PathParams>()
//!             .and_then(|p| p.get("id").map(str::to_string))
//!             .unwrap_or_default();
//!         ctx.json(http::StatusCode::OK, &serde_json::json!({"id": id}))
//!     })
//! }
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // `serve` installs the logging subscriber from the config's `log`
//!     // section unless the host already installed one.
//!     let mut app = App::new(AppConfig::builder().build_version("1.0.0").build());
//!     app.route(http::Method::GET, "/users/:id", get_user);
//!     serve(Arc::new(app)).await?;
//!     Ok(())
//! }
//! ```

#![forbid(unsafe_code)]

pub mod app;
pub mod config;
pub mod health;
pub mod server;

pub use app::{App, AppBuilder, PathParams};
pub use config::{AppConfig, AppConfigBuilder};
pub use health::{health_handler, HealthStatus};
pub use server::{serve, serve_with_shutdown, ServerError};

// Re-export the layers for host code that only depends on the umbrella.
pub use portico_core as core;
pub use portico_middleware as middleware;
pub use portico_telemetry as telemetry;
