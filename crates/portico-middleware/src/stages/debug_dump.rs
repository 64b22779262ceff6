//! Debug dump middleware.
//!
//! When the context is in debug mode, dumps the full request (headers and
//! body) before the handler runs and the full response after, both at
//! debug level. Outside debug mode the stage is a pass-through.
//!
//! Bodies are rendered lossily as UTF-8; binary payloads come out mangled
//! but never fail the dump.

use crate::middleware::{BoxFuture, Middleware, Next};
use crate::types::{PipelineResult, Request};
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use portico_core::context::RequestContext;
use portico_core::writer::ResponseWriter;
use std::fmt::Write as _;
use std::io;
use std::sync::{Arc, Mutex, PoisonError};

/// Middleware that dumps requests and responses in debug mode.
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugDumpMiddleware;

impl DebugDumpMiddleware {
    /// Creates the debug dump middleware.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for DebugDumpMiddleware {
    fn name(&self) -> &'static str {
        "debug_dump"
    }

    fn process<'a>(
        &'a self,
        ctx: &'a mut RequestContext,
        request: Request,
        next: Next<'a>,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move {
            if !ctx.debug() {
                return next.run(ctx, request).await;
            }

            tracing::debug!(
                parent: ctx.span(),
                dump = %dump_request(&request),
                "request dump",
            );

            let capture = CaptureState::default();
            let writer_capture = capture.clone();
            ctx.wrap_writer(move |inner| Box::new(CapturingWriter::new(inner, writer_capture)));

            let result = next.run(ctx, request).await;

            tracing::debug!(
                parent: ctx.span(),
                dump = %capture.render(),
                "response dump",
            );

            result
        })
    }
}

fn dump_request(request: &Request) -> String {
    let mut out = format!("{} {}\n", request.method(), request.uri());
    for (name, value) in request.headers() {
        let _ = writeln!(out, "{name}: {}", String::from_utf8_lossy(value.as_bytes()));
    }
    if !request.body().is_empty() {
        let _ = write!(out, "\n{}", String::from_utf8_lossy(request.body()));
    }
    out
}

#[derive(Debug, Clone, Default)]
struct CaptureState {
    inner: Arc<Mutex<Captured>>,
}

#[derive(Debug, Default)]
struct Captured {
    status: Option<StatusCode>,
    content_type: Option<String>,
    body: Vec<u8>,
}

impl CaptureState {
    fn render(&self) -> String {
        let captured = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        let status = captured.status.unwrap_or(StatusCode::OK);
        // HTML pages make for noisy dumps and carry no diagnostic value.
        let html = captured
            .content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("text/html"));
        if html {
            format!("{status}\n<text/html body elided, {} bytes>", captured.body.len())
        } else {
            format!("{status}\n{}", String::from_utf8_lossy(&captured.body))
        }
    }
}

/// Writer decorator that tees the response for the dump.
struct CapturingWriter {
    inner: Box<dyn ResponseWriter>,
    capture: CaptureState,
}

impl CapturingWriter {
    fn new(inner: Box<dyn ResponseWriter>, capture: CaptureState) -> Self {
        Self { inner, capture }
    }
}

impl ResponseWriter for CapturingWriter {
    fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.insert_header(name, value);
    }

    fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.inner.header(name)
    }

    fn write_head(&mut self, status: StatusCode) {
        let content_type = self
            .inner
            .header(&http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok().map(ToString::to_string));
        {
            let mut captured = self
                .capture
                .inner
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            if captured.status.is_none() {
                captured.status = Some(status);
                captured.content_type = content_type;
            }
        }
        self.inner.write_head(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.capture
            .inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .body
            .extend_from_slice(&buf[..written]);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use portico_core::writer::BufferedWriter;

    fn ok_handler<'a>(
        ctx: &'a mut RequestContext,
        _request: Request,
    ) -> BoxFuture<'a, PipelineResult> {
        Box::pin(async move { ctx.json_blob(StatusCode::OK, b"{\"ok\":true}") })
    }

    fn request() -> Request {
        http::Request::builder()
            .method("POST")
            .uri("/things")
            .header("content-type", "application/json")
            .body(Bytes::from_static(b"{\"name\":\"x\"}"))
            .unwrap()
    }

    #[tokio::test]
    async fn passes_through_outside_debug_mode() {
        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, false);

        DebugDumpMiddleware::new()
            .process(&mut ctx, request(), Next::handler(&ok_handler))
            .await
            .unwrap();

        assert_eq!(writer.status(), Some(StatusCode::OK));
    }

    #[tokio::test]
    async fn debug_mode_does_not_alter_response() {
        let writer = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(writer.clone()), None, true);

        DebugDumpMiddleware::new()
            .process(&mut ctx, request(), Next::handler(&ok_handler))
            .await
            .unwrap();

        assert_eq!(writer.status(), Some(StatusCode::OK));
        assert_eq!(&writer.body()[..], b"{\"ok\":true}");
    }

    #[test]
    fn request_dump_includes_headers_and_body() {
        let dump = dump_request(&request());
        assert!(dump.starts_with("POST /things\n"));
        assert!(dump.contains("content-type: application/json"));
        assert!(dump.contains("{\"name\":\"x\"}"));
    }

    #[test]
    fn capture_renders_status_and_body() {
        let capture = CaptureState::default();
        let mut writer =
            CapturingWriter::new(Box::new(BufferedWriter::new()), capture.clone());
        writer.write_head(StatusCode::IM_A_TEAPOT);
        writer.write(b"short and stout").unwrap();

        let rendered = capture.render();
        assert!(rendered.contains("418"));
        assert!(rendered.contains("short and stout"));
    }

    #[test]
    fn html_bodies_are_elided_from_the_dump() {
        let capture = CaptureState::default();
        let mut writer = CapturingWriter::new(Box::new(BufferedWriter::new()), capture.clone());
        writer.insert_header(
            http::header::CONTENT_TYPE,
            HeaderValue::from_static("text/html; charset=utf-8"),
        );
        writer.write_head(StatusCode::OK);
        writer.write(b"<html><body>hello</body></html>").unwrap();

        let rendered = capture.render();
        assert!(rendered.contains("elided"));
        assert!(!rendered.contains("<html>"));
    }
}
