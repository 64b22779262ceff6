//! Per-request context.
//!
//! One [`RequestContext`] exists per request, owned exclusively by that
//! request's task and never shared across requests. It carries the
//! correlation ID, the response-writer chain, the tracing transaction, and
//! the request-scoped span; stages enrich it on the way in and read from it
//! on the way out.

use crate::error::{Failure, ResolvedError};
use crate::trace::Transaction;
use crate::writer::{NullWriter, ResponseWriter};
use http::header::{HeaderName, HeaderValue, CONTENT_TYPE};
use http::StatusCode;
use serde::Serialize;
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::fmt;
use std::net::SocketAddr;
use uuid::Uuid;

/// The inbound header that carries a caller-supplied correlation ID.
pub const CORRELATION_ID_HEADER: HeaderName = HeaderName::from_static("correlation-id");

/// Opaque per-request identifier, propagated across the call chain for
/// log and trace correlation.
///
/// The inbound `Correlation-Id` header value is used verbatim when present
/// and non-empty; otherwise a fresh UUID v7 is generated for this request
/// only.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct CorrelationId(String);

impl CorrelationId {
    /// Generates a fresh identifier (UUID v7, time-ordered).
    #[must_use]
    pub fn generate() -> Self {
        Self(Uuid::now_v7().to_string())
    }

    /// Resolves the correlation ID for a request: header value verbatim if
    /// present and non-empty, generated otherwise.
    #[must_use]
    pub fn from_request<B>(request: &http::Request<B>) -> Self {
        request
            .headers()
            .get(CORRELATION_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .filter(|value| !value.is_empty())
            .map_or_else(Self::generate, |value| Self(value.to_string()))
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for CorrelationId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Resolves the client IP the way reverse-proxy deployments expect:
/// first `X-Forwarded-For` entry, then `X-Real-Ip`, then the socket peer
/// address.
#[must_use]
pub fn client_ip<B>(request: &http::Request<B>, remote_addr: Option<SocketAddr>) -> String {
    let forwarded = request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = forwarded {
        return ip.to_string();
    }

    let real_ip = request
        .headers()
        .get("x-real-ip")
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty());
    if let Some(ip) = real_ip {
        return ip.to_string();
    }

    remote_addr.map(|addr| addr.ip().to_string()).unwrap_or_default()
}

/// Per-request state threaded through the pipeline.
///
/// Created by the host seam with the base writer, enriched by the context
/// stage (correlation ID, span, transaction), decorated by later stages
/// (observer, debug writer), and consulted on the way out by the
/// error-response and request-logger stages.
///
/// The tracing transaction is a scoped resource: it is ended explicitly by
/// the context stage on every normal exit path, and by this context's
/// `Drop` if a panic unwinds past that stage.
pub struct RequestContext {
    correlation_id: CorrelationId,
    writer: Box<dyn ResponseWriter>,
    transaction: Option<Box<dyn Transaction>>,
    span: tracing::Span,
    route: String,
    remote_addr: Option<SocketAddr>,
    debug: bool,
    resolved_error: Option<ResolvedError>,
    extensions: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl RequestContext {
    /// Creates a context around the host's response writer.
    ///
    /// A correlation ID is generated eagerly; the context stage overwrites
    /// it with the header-resolved one.
    #[must_use]
    pub fn new(writer: Box<dyn ResponseWriter>, remote_addr: Option<SocketAddr>, debug: bool) -> Self {
        Self {
            correlation_id: CorrelationId::generate(),
            writer,
            transaction: None,
            span: tracing::Span::none(),
            route: String::new(),
            remote_addr,
            debug,
            resolved_error: None,
            extensions: HashMap::new(),
        }
    }

    /// Returns the correlation ID.
    #[must_use]
    pub fn correlation_id(&self) -> &CorrelationId {
        &self.correlation_id
    }

    /// Sets the correlation ID. Called by the context stage once the
    /// inbound header has been consulted.
    pub fn set_correlation_id(&mut self, correlation_id: CorrelationId) {
        self.correlation_id = correlation_id;
    }

    /// Returns the matched route pattern (the request path when routing
    /// did not match).
    #[must_use]
    pub fn route(&self) -> &str {
        &self.route
    }

    /// Sets the matched route pattern.
    pub fn set_route(&mut self, route: impl Into<String>) {
        self.route = route.into();
    }

    /// Returns the socket peer address, when the host supplied one.
    #[must_use]
    pub fn remote_addr(&self) -> Option<SocketAddr> {
        self.remote_addr
    }

    /// Whether debug mode is on for this request.
    #[must_use]
    pub fn debug(&self) -> bool {
        self.debug
    }

    /// Returns the request-scoped span.
    #[must_use]
    pub fn span(&self) -> &tracing::Span {
        &self.span
    }

    /// Installs the request-scoped span built by the context stage.
    pub fn set_span(&mut self, span: tracing::Span) {
        self.span = span;
    }

    /// Returns the response writer (including any installed decorators).
    pub fn writer(&mut self) -> &mut dyn ResponseWriter {
        self.writer.as_mut()
    }

    /// Replaces the writer with a decorated version of itself.
    ///
    /// Decorator order is fixed by the pipeline: the transaction wrapper
    /// first, the observer second, the debug writer last.
    pub fn wrap_writer(
        &mut self,
        decorate: impl FnOnce(Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter>,
    ) {
        let inner = std::mem::replace(&mut self.writer, Box::new(NullWriter));
        self.writer = decorate(inner);
    }

    /// Serializes `body` as JSON and writes it with the given status.
    pub fn json<T: Serialize>(&mut self, status: StatusCode, body: &T) -> Result<(), Failure> {
        let buf = serde_json::to_vec(body).map_err(Failure::unknown)?;
        self.json_blob(status, &buf)
    }

    /// Writes a pre-serialized JSON body with the given status.
    pub fn json_blob(&mut self, status: StatusCode, body: &[u8]) -> Result<(), Failure> {
        self.writer
            .insert_header(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.writer.write_head(status);
        self.writer.write(body).map_err(Failure::unknown)?;
        Ok(())
    }

    /// Replaces the writer with the transaction's instrumented wrapper.
    ///
    /// No-op when no transaction has been started.
    pub fn wrap_writer_with_transaction(&mut self) {
        if let Some(tx) = self.transaction.as_ref() {
            let inner = std::mem::replace(&mut self.writer, Box::new(NullWriter));
            self.writer = tx.wrap(inner);
        }
    }

    /// Returns the tracing transaction, if one has been started.
    #[must_use]
    pub fn transaction(&self) -> Option<&dyn Transaction> {
        self.transaction.as_deref()
    }

    /// Adopts a started transaction. Called by the context stage.
    pub fn set_transaction(&mut self, transaction: Box<dyn Transaction>) {
        self.transaction = Some(transaction);
    }

    /// Ends and releases the transaction, if one is still held. The drop
    /// backstop then has nothing left to end, so `end` runs exactly once.
    pub fn end_transaction(&mut self) {
        if let Some(tx) = self.transaction.take() {
            tx.end();
        }
    }

    /// Records an attribute on the transaction. Attribute failures are
    /// logged, never propagated.
    pub fn record_attribute(&self, key: &str, value: &str) {
        let Some(tx) = self.transaction.as_deref() else {
            return;
        };
        if let Err(err) = tx.add_attribute(key, value) {
            tracing::error!(parent: &self.span, %err, key, "failed to add attribute to transaction");
        }
    }

    /// Returns the classified outcome of a failed request, if any.
    #[must_use]
    pub fn resolved_error(&self) -> Option<&ResolvedError> {
        self.resolved_error.as_ref()
    }

    /// Stores the classified outcome. Written by the error-response stage,
    /// read by the request logger.
    pub fn set_resolved_error(&mut self, resolved: ResolvedError) {
        self.resolved_error = Some(resolved);
    }

    /// Stores a typed extension value for later stages to retrieve.
    pub fn set_extension<T: Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(TypeId::of::<T>(), Box::new(value));
    }

    /// Retrieves a typed extension value.
    #[must_use]
    pub fn get_extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions
            .get(&TypeId::of::<T>())
            .and_then(|value| value.downcast_ref())
    }

    /// Removes and returns a typed extension value.
    pub fn remove_extension<T: Send + Sync + 'static>(&mut self) -> Option<T> {
        self.extensions
            .remove(&TypeId::of::<T>())
            .and_then(|value| value.downcast().ok())
            .map(|boxed| *boxed)
    }
}

impl Drop for RequestContext {
    fn drop(&mut self) {
        // Release-on-every-exit-path for the transaction, including panics
        // that unwind past the context stage.
        if let Some(tx) = self.transaction.take() {
            tx.end();
        }
    }
}

impl fmt::Debug for RequestContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestContext")
            .field("correlation_id", &self.correlation_id)
            .field("route", &self.route)
            .field("remote_addr", &self.remote_addr)
            .field("debug", &self.debug)
            .field("has_transaction", &self.transaction.is_some())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trace::{NoopTraceApp, TraceApp};
    use crate::writer::BufferedWriter;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn request_with_headers(headers: &[(&str, &str)]) -> http::Request<()> {
        let mut builder = http::Request::builder().uri("/test");
        for (name, value) in headers {
            builder = builder.header(*name, *value);
        }
        builder.body(()).unwrap()
    }

    #[test]
    fn correlation_id_uses_header_verbatim() {
        let request = request_with_headers(&[("Correlation-Id", "abc-123 weird id")]);
        let id = CorrelationId::from_request(&request);
        assert_eq!(id.as_str(), "abc-123 weird id");
    }

    #[test]
    fn correlation_id_generates_when_header_empty() {
        let request = request_with_headers(&[("Correlation-Id", "")]);
        let id = CorrelationId::from_request(&request);
        assert!(!id.as_str().is_empty());
        assert!(Uuid::parse_str(id.as_str()).is_ok());
    }

    #[test]
    fn correlation_id_generates_when_header_missing() {
        let request = request_with_headers(&[]);
        let first = CorrelationId::from_request(&request);
        let second = CorrelationId::from_request(&request);
        assert_ne!(first, second);
    }

    #[test]
    fn client_ip_prefers_forwarded_for() {
        let request = request_with_headers(&[
            ("X-Forwarded-For", "203.0.113.7, 10.0.0.1"),
            ("X-Real-Ip", "198.51.100.2"),
        ]);
        let remote = "192.0.2.1:443".parse().ok();
        assert_eq!(client_ip(&request, remote), "203.0.113.7");
    }

    #[test]
    fn client_ip_falls_back_to_real_ip_then_remote() {
        let request = request_with_headers(&[("X-Real-Ip", "198.51.100.2")]);
        assert_eq!(client_ip(&request, None), "198.51.100.2");

        let bare = request_with_headers(&[]);
        let remote = "192.0.2.1:443".parse().ok();
        assert_eq!(client_ip(&bare, remote), "192.0.2.1");
    }

    #[test]
    fn json_writes_status_content_type_and_body() {
        let base = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(base.clone()), None, false);
        ctx.json(StatusCode::CREATED, &serde_json::json!({"id": 7}))
            .unwrap();

        assert_eq!(base.status(), Some(StatusCode::CREATED));
        assert_eq!(&base.body()[..], br#"{"id":7}"#);
        let response = base.take_response();
        assert_eq!(
            response.headers().get(CONTENT_TYPE).unwrap(),
            "application/json"
        );
    }

    #[test]
    fn wrap_writer_layers_decorators() {
        struct Uppercase(Box<dyn ResponseWriter>);
        impl ResponseWriter for Uppercase {
            fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
                self.0.insert_header(name, value);
            }
            fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
                self.0.header(name)
            }
            fn write_head(&mut self, status: StatusCode) {
                self.0.write_head(status);
            }
            fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
                let upper = buf.to_ascii_uppercase();
                self.0.write(&upper)
            }
        }

        let base = BufferedWriter::new();
        let mut ctx = RequestContext::new(Box::new(base.clone()), None, false);
        ctx.wrap_writer(|inner| Box::new(Uppercase(inner)));
        ctx.writer().write(b"quiet").unwrap();
        assert_eq!(&base.body()[..], b"QUIET");
    }

    #[test]
    fn drop_ends_transaction_exactly_once() {
        struct CountingTx {
            ends: Arc<AtomicUsize>,
        }
        impl Transaction for CountingTx {
            fn add_attribute(&self, _: &str, _: &str) -> Result<(), crate::trace::AttributeError> {
                Ok(())
            }
            fn wrap(&self, inner: Box<dyn ResponseWriter>) -> Box<dyn ResponseWriter> {
                inner
            }
            fn end(&self) {
                self.ends.fetch_add(1, Ordering::SeqCst);
            }
            fn ended(&self) -> bool {
                self.ends.load(Ordering::SeqCst) > 0
            }
        }

        let ends = Arc::new(AtomicUsize::new(0));
        {
            let mut ctx = RequestContext::new(Box::new(BufferedWriter::new()), None, false);
            ctx.set_transaction(Box::new(CountingTx { ends: Arc::clone(&ends) }));
            // Dropped without an explicit end_transaction.
        }
        assert_eq!(ends.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn noop_transaction_survives_attribute_recording() {
        let mut ctx = RequestContext::new(Box::new(BufferedWriter::new()), None, false);
        ctx.set_transaction(NoopTraceApp.start_transaction("/x"));
        ctx.record_attribute("route", "/x");
        assert!(ctx.transaction().is_some());
        ctx.end_transaction();
        // Released on end; the drop backstop has nothing left to do.
        assert!(ctx.transaction().is_none());
    }

    #[test]
    fn extensions_round_trip() {
        #[derive(Debug, PartialEq)]
        struct Marker(u32);

        let mut ctx = RequestContext::new(Box::new(BufferedWriter::new()), None, false);
        assert!(ctx.get_extension::<Marker>().is_none());
        ctx.set_extension(Marker(9));
        assert_eq!(ctx.get_extension::<Marker>(), Some(&Marker(9)));
        assert_eq!(ctx.remove_extension::<Marker>(), Some(Marker(9)));
        assert!(ctx.get_extension::<Marker>().is_none());
    }
}
