//! HTTP server front-end.
//!
//! Binds a TCP listener, buffers each request body, and hands the request
//! to the [`App`] for pipeline dispatch. Built on Hyper and Tokio.
//!
//! # Example
//!
//! ```rust,ignore
//! use portico::{App, AppConfig, serve};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let app = Arc::new(App::new(AppConfig::default()));
//!     serve(app).await?;
//!     Ok(())
//! }
//! ```

use crate::app::App;
use bytes::Bytes;
use http::Request as HttpRequest;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper_util::rt::TokioIo;
use portico_telemetry::LogConfig;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tokio::net::TcpListener;

/// Errors from the server front-end.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not be bound.
    #[error("Failed to bind: {0}")]
    Bind(String),

    /// IO error while serving.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Runs the server until SIGINT.
///
/// # Errors
///
/// Returns an error if the configured address cannot be bound.
pub async fn serve(app: Arc<App>) -> Result<(), ServerError> {
    serve_with_shutdown(app, shutdown_signal()).await
}

/// Installs the logging subscriber from the app's [`LogConfig`].
///
/// Hosts that install their own subscriber before calling [`serve`] keep it;
/// the init failure is demoted to a debug record.
fn bootstrap_logging(config: &LogConfig) {
    if let Err(err) = portico_telemetry::init_logging(config) {
        tracing::debug!(%err, "keeping the already-installed logging subscriber");
    }
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for shutdown signal");
    }
}

/// Runs the server until `shutdown` resolves.
///
/// Useful for tests and for hosts that control shutdown programmatically.
///
/// # Errors
///
/// Returns an error if the configured address cannot be bound.
pub async fn serve_with_shutdown(
    app: Arc<App>,
    shutdown: impl std::future::Future<Output = ()> + Send,
) -> Result<(), ServerError> {
    bootstrap_logging(app.config().log());

    let addr = app
        .config()
        .socket_addr()
        .map_err(|e| ServerError::Bind(format!("Invalid address '{}': {e}", app.config().http_addr())))?;

    let listener = TcpListener::bind(addr)
        .await
        .map_err(|e| ServerError::Bind(format!("Failed to bind to {addr}: {e}")))?;

    tracing::info!("Server listening on {addr}");

    tokio::pin!(shutdown);
    let mut connections = tokio::task::JoinSet::new();
    loop {
        tokio::select! {
            result = listener.accept() => {
                match result {
                    Ok((stream, remote_addr)) => {
                        let app = Arc::clone(&app);
                        connections.spawn(async move {
                            if let Err(err) = handle_connection(app, stream, remote_addr).await {
                                tracing::error!(%err, %remote_addr, "connection error");
                            }
                        });
                    }
                    Err(err) => {
                        tracing::error!(%err, "failed to accept connection");
                    }
                }
            }
            // Reap finished connections so the set does not grow for the
            // lifetime of the server.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
            () = &mut shutdown => {
                tracing::info!("Shutdown signal received, stopping server");
                break;
            }
        }
    }

    let drain = async {
        while connections.join_next().await.is_some() {}
    };
    if tokio::time::timeout(app.config().shutdown_timeout(), drain)
        .await
        .is_err()
    {
        tracing::warn!("shutdown timeout elapsed with connections still open");
    }

    Ok(())
}

async fn handle_connection(
    app: Arc<App>,
    stream: tokio::net::TcpStream,
    remote_addr: SocketAddr,
) -> Result<(), hyper::Error> {
    let io = TokioIo::new(stream);

    let service = service_fn(move |request: HttpRequest<Incoming>| {
        let app = Arc::clone(&app);
        async move {
            let (parts, body) = request.into_parts();
            let body = match collect_body(body).await {
                Ok(body) => body,
                Err(err) => {
                    tracing::error!(%err, "failed to collect request body");
                    Bytes::new()
                }
            };
            let request = App::request_from_parts(parts, body);
            let response = app.handle(request, Some(remote_addr)).await;
            Ok::<_, Infallible>(response.map(Full::new))
        }
    });

    http1::Builder::new().serve_connection(io, service).await
}

async fn collect_body(body: Incoming) -> Result<Bytes, hyper::Error> {
    let collected = body.collect().await?;
    Ok(collected.to_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bootstrap_logging_tolerates_an_installed_subscriber() {
        let config = LogConfig::default();
        bootstrap_logging(&config);
        // The second call finds a subscriber already installed and must
        // leave it in place without panicking.
        bootstrap_logging(&config);
    }
}
