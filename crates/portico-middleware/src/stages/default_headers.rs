//! Default response headers middleware.
//!
//! Applies the baseline header set every response carries:
//!
//! - `Correlation-Id` echoed back to the caller
//! - `Build-Version` identifying the running binary
//! - cache suppression (`Cache-Control`, `Expires`, `Pragma`)
//! - browser hardening (`Strict-Transport-Security`,
//!   `X-Content-Type-Options`, `X-Frame-Options`)
//!
//! Headers are inserted before the handler runs, so a handler that needs
//! different values for a specific response can overwrite them.

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{PipelineResult, Request};
use http::header::{
    HeaderName, HeaderValue, CACHE_CONTROL, EXPIRES, PRAGMA, STRICT_TRANSPORT_SECURITY,
    X_CONTENT_TYPE_OPTIONS, X_FRAME_OPTIONS,
};
use portico_core::context::{RequestContext, CORRELATION_ID_HEADER};

/// The response header carrying the build version.
pub const BUILD_VERSION_HEADER: HeaderName = HeaderName::from_static("build-version");

/// Middleware that applies the default response headers.
#[derive(Debug, Clone)]
pub struct DefaultHeadersMiddleware {
    build_version: HeaderValue,
}

impl DefaultHeadersMiddleware {
    /// Creates the middleware with the given build version.
    ///
    /// Versions that are not valid header values fall back to "unknown".
    #[must_use]
    pub fn new(build_version: &str) -> Self {
        Self {
            build_version: HeaderValue::from_str(build_version)
                .unwrap_or_else(|_| HeaderValue::from_static("unknown")),
        }
    }
}

impl Middleware for DefaultHeadersMiddleware {
    fn name(&self) -> &'static str {
        "default_headers"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if let Ok(value) = HeaderValue::from_str(ctx.correlation_id().as_str()) {
                ctx.writer().insert_header(CORRELATION_ID_HEADER, value);
            }
            ctx.writer()
                .insert_header(BUILD_VERSION_HEADER, self.build_version.clone());
            ctx.writer().insert_header(
                CACHE_CONTROL,
                HeaderValue::from_static("no-store, no-cache, must-revalidate, max-age=0"),
            );
            ctx.writer().insert_header(
                EXPIRES,
                HeaderValue::from_static("Thu, 01 Jan 1970 00:00:00 GMT"),
            );
            ctx.writer()
                .insert_header(PRAGMA, HeaderValue::from_static("no-cache"));
            ctx.writer().insert_header(
                STRICT_TRANSPORT_SECURITY,
                HeaderValue::from_static("max-age=15724800; includeSubDomains"),
            );
            ctx.writer().insert_header(
                X_CONTENT_TYPE_OPTIONS,
                HeaderValue::from_static("nosniff"),
            );
            ctx.writer()
                .insert_header(X_FRAME_OPTIONS, HeaderValue::from_static("SAMEORIGIN"));

            next.run(ctx, request).await
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use http::StatusCode;
    use portico_core::context::CorrelationId;
    use portico_core::writer::BufferedWriter;

    fn ok_handler<'a>(
        ctx: &'a mut RequestContext,
        _request: Request,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move { ctx.json_blob(StatusCode::OK, b"{}") })
    }

    fn test_request() -> Request {
        http::Request::builder()
            .uri("/test")
            .body(Bytes::new())
            .unwrap()
    }

    #[tokio::test]
    async fn applies_security_and_version_headers() {
        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, false);
        ctx.set_correlation_id(CorrelationId::from("corr-1"));

        DefaultHeadersMiddleware::new("2.0.1")
            .process(&mut ctx, test_request(), Next::handler(&ok_handler))
            .await
            .unwrap();

        let response = writer.take_response();
        let headers = response.headers();
        assert_eq!(headers.get("Correlation-Id").unwrap(), "corr-1");
        assert_eq!(headers.get("Build-Version").unwrap(), "2.0.1");
        assert_eq!(
            headers.get(CACHE_CONTROL).unwrap(),
            "no-store, no-cache, must-revalidate, max-age=0"
        );
        assert_eq!(headers.get(PRAGMA).unwrap(), "no-cache");
        assert_eq!(
            headers.get(STRICT_TRANSPORT_SECURITY).unwrap(),
            "max-age=15724800; includeSubDomains"
        );
        assert_eq!(headers.get(X_CONTENT_TYPE_OPTIONS).unwrap(), "nosniff");
        assert_eq!(headers.get(X_FRAME_OPTIONS).unwrap(), "SAMEORIGIN");
    }

    #[tokio::test]
    async fn invalid_build_version_falls_back() {
        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, false);

        DefaultHeadersMiddleware::new("bad\nversion")
            .process(&mut ctx, test_request(), Next::handler(&ok_handler))
            .await
            .unwrap();

        let response = writer.take_response();
        assert_eq!(response.headers().get("Build-Version").unwrap(), "unknown");
    }
}
