//! Response observation.
//!
//! [`ResponseObserver`] is a [`ResponseWriter`] decorator that records the
//! final response status and the number of body bytes written, without
//! buffering anything itself. The request-logger stage installs it and
//! reads the shared [`ObserverState`] after the chain returns.

use portico_core::writer::ResponseWriter;
use http::header::{HeaderName, HeaderValue};
use http::StatusCode;
use std::io;
use std::sync::atomic::{AtomicU16, AtomicU64, Ordering};
use std::sync::Arc;

/// Shared view of what has been written to the response so far.
///
/// Cheap to clone; all handles observe the same counters.
#[derive(Debug, Clone, Default)]
pub struct ObserverState {
    inner: Arc<ObserverInner>,
}

#[derive(Debug, Default)]
struct ObserverInner {
    /// 0 means "no explicit status recorded yet".
    status: AtomicU16,
    bytes_written: AtomicU64,
}

impl ObserverState {
    /// Creates a fresh state with no status and zero bytes.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// The first explicitly written status, if any.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        let code = self.inner.status.load(Ordering::SeqCst);
        if code == 0 {
            return None;
        }
        StatusCode::from_u16(code).ok()
    }

    /// The status the response will carry: the recorded one, or 200 OK
    /// when the handler wrote a body without an explicit status.
    #[must_use]
    pub fn effective_status(&self) -> StatusCode {
        self.status().unwrap_or(StatusCode::OK)
    }

    /// Total body bytes written through the observer.
    #[must_use]
    pub fn bytes_written(&self) -> u64 {
        self.inner.bytes_written.load(Ordering::SeqCst)
    }

    /// Whether any status has been recorded.
    #[must_use]
    pub fn committed(&self) -> bool {
        self.inner.status.load(Ordering::SeqCst) != 0
    }

    fn record_status(&self, status: StatusCode) {
        // First write wins; later write_head calls are ignored downstream
        // too, so the recorded value matches what is sent.
        let _ = self.inner.status.compare_exchange(
            0,
            status.as_u16(),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    fn record_bytes(&self, count: u64) {
        self.inner.bytes_written.fetch_add(count, Ordering::SeqCst);
    }
}

/// Writer decorator that feeds an [`ObserverState`].
pub struct ResponseObserver {
    inner: Box<dyn ResponseWriter>,
    state: ObserverState,
}

impl ResponseObserver {
    /// Wraps `inner`, recording into `state`.
    #[must_use]
    pub fn new(inner: Box<dyn ResponseWriter>, state: ObserverState) -> Self {
        Self { inner, state }
    }
}

impl ResponseWriter for ResponseObserver {
    fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.inner.insert_header(name, value);
    }

    fn header(&self, name: &HeaderName) -> Option<HeaderValue> {
        self.inner.header(name)
    }

    fn write_head(&mut self, status: StatusCode) {
        self.state.record_status(status);
        self.inner.write_head(status);
    }

    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let written = self.inner.write(buf)?;
        self.state.record_bytes(written as u64);
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use portico_core::writer::BufferedWriter;

    #[test]
    fn records_first_status_only() {
        let state = ObserverState::new();
        let mut observer =
            ResponseObserver::new(Box::new(BufferedWriter::new()), state.clone());

        assert!(!state.committed());
        observer.write_head(StatusCode::NOT_FOUND);
        observer.write_head(StatusCode::OK);

        assert_eq!(state.status(), Some(StatusCode::NOT_FOUND));
        assert!(state.committed());
    }

    #[test]
    fn counts_bytes_across_writes() {
        let state = ObserverState::new();
        let mut observer =
            ResponseObserver::new(Box::new(BufferedWriter::new()), state.clone());

        observer.write(b"hello ").unwrap();
        observer.write(b"world").unwrap();
        assert_eq!(state.bytes_written(), 11);
    }

    #[test]
    fn effective_status_defaults_to_ok() {
        let state = ObserverState::new();
        assert_eq!(state.effective_status(), StatusCode::OK);
        assert_eq!(state.status(), None);
    }

    #[test]
    fn passes_through_to_inner_writer() {
        let buffered = BufferedWriter::new();
        let state = ObserverState::new();
        let mut observer = ResponseObserver::new(Box::new(buffered.clone()), state);

        observer.write_head(StatusCode::ACCEPTED);
        observer.write(b"queued").unwrap();

        assert_eq!(buffered.status(), Some(StatusCode::ACCEPTED));
        assert_eq!(&buffered.body()[..], b"queued");
    }
}
