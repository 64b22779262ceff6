//! Health endpoint.
//!
//! `GET /health` answers `{"status": "ok"}` with 200. The path is exempt
//! from transactions and request logging by default, so probes do not
//! pollute telemetry.

use http::StatusCode;
use portico_core::RequestContext;
use portico_middleware::{BoxFuture, PipelineResult, Request};
use serde::Serialize;

/// The health response body.
#[derive(Debug, Clone, Serialize)]
pub struct HealthStatus {
    /// Always "ok" while the process can serve requests.
    pub status: &'static str,
}

/// Handler for `GET /health`.
pub fn health_handler<'a>(
    ctx: &'a mut RequestContext,
    _request: Request,
) -> BoxFuture<'a, PipelineResult> {
    Box::pin(async move { ctx.json(StatusCode::OK, &HealthStatus { status: "ok" }) })
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use portico_core::writer::BufferedWriter;

    #[tokio::test]
    async fn reports_ok() {
        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, false);
        let request: Request = http::Request::builder()
            .uri("/health")
            .body(Bytes::new())
            .unwrap();

        health_handler(&mut ctx, request).await.unwrap();

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(&writer.body()[..], br#"{"status":"ok"}"#);
    }
}
