//! Response-writer abstraction.
//!
//! The host framework hands the pipeline something it can write a response
//! through, but nothing that can be inspected after the fact. [`ResponseWriter`]
//! is that surface; decorators (the tracing transaction's wrapper, the
//! response observer, the debug writer) layer over it in a fixed order, each
//! narrowing what the next sees.

use bytes::{Bytes, BytesMut};
use http::header::{HeaderName, HeaderValue};
use http::{HeaderMap, StatusCode};
use std::sync::{Arc, Mutex, PoisonError};

/// The HTTP response type produced at the host boundary. The body is
/// fully buffered; the server layer wraps it for the wire.
pub type Response = http::Response<Bytes>;

/// The write surface handed to handlers and decorated by pipeline stages.
pub trait ResponseWriter: Send {
    /// Sets a response header, replacing any previous value.
    fn insert_header(&mut self, name: HeaderName, value: HeaderValue);

    /// Returns the current value of a response header, if set.
    fn header(&self, name: &HeaderName) -> Option<HeaderValue>;

    /// Writes the status line. Standard single-write-wins semantics: the
    /// first call pins the status, later calls are ignored.
    fn write_head(&mut self, status: StatusCode);

    /// Appends body bytes, returning how many were written.
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize>;
}

#[derive(Debug, Default)]
struct Buffered {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
}

/// The base writer: accumulates status, headers, and body in memory.
///
/// Cloning yields another handle to the same buffer, so the host can keep
/// one handle while the pipeline writes through a boxed clone, then collect
/// the finished [`Response`] with [`BufferedWriter::take_response`].
#[derive(Debug, Clone, Default)]
pub struct BufferedWriter {
    inner: Arc<Mutex<Buffered>>,
}

impl BufferedWriter {
    /// Creates an empty writer.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the status written so far, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        self.lock().status
    }

    /// Returns a snapshot of the body written so far.
    #[must_use]
    pub fn body(&self) -> Bytes {
        Bytes::copy_from_slice(&self.lock().body)
    }

    /// Drains the buffer into an HTTP response.
    ///
    /// If no status was ever written the response defaults to 200 OK,
    /// matching the host framework's implicit-success behavior.
    #[must_use]
    pub fn take_response(&self) -> Response {
        let mut inner = self.lock();
        let buffered = std::mem::take(&mut *inner);
        drop(inner);

        let mut response = http::Response::new(buffered.body.freeze());
        *response.status_mut() = buffered.status.unwrap_or(StatusCode::OK);
        *response.headers_mut() = buffered.headers;
        response
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Buffered> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ResponseWriter for BufferedWriter {
    fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.lock().headers.insert(name, value);
    }

    fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.lock().headers.get(name).cloned()
    }

    fn write_head(&mut self, status: StatusCode) {
        let mut inner = self.lock();
        if inner.status.is_none() {
            inner.status = Some(status);
        }
    }

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.lock().body.extend_from_slice(buf);
        Ok(buf.len())
    }
}

/// A writer that discards everything. Used as a placeholder while the
/// context swaps decorators into the writer chain.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullWriter;

impl ResponseWriter for NullWriter {
    fn insert_header(&mut self, _name: HeaderName, _value: HeaderValue) {}

    fn header(&self, _name: &HeaderName) -> Option<HeaderValue> {
        None
    }

    fn write_head(&mut self, _status: StatusCode) {}

    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        Ok(buf.len())
    }
}
