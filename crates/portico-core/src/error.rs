//! Error taxonomy and failure classification.
//!
//! Every failure that reaches the pipeline, whether raised intentionally by
//! application code, produced by the host framework's routing, or recovered
//! from a panic, is classified into the single canonical [`Error`] shape
//! before anything is sent to the client or written to the request log.
//!
//! # Classification rules
//!
//! [`classify`] is total: it never fails and never panics, whatever the
//! input. In priority order:
//!
//! 1. An already-classified [`Error`] is returned unchanged.
//! 2. A [`PanicError`] yields its wrapped (already classified) [`Error`].
//! 3. A [`FrameworkError`] maps to its own status with code
//!    `FRAMEWORK_HTTP_ERROR`.
//! 4. Anything else maps to the internal-server-error instance, with the
//!    failure's type name and message preserved as diagnostic params.
//!
//! # What clients see
//!
//! Only `code` and `detail` are ever serialized; `status` becomes the HTTP
//! status line and `params` stays in the logs and tracing attributes.

use http::StatusCode;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Upper bound on the stack trace captured for a recovered panic, in bytes.
pub const STACK_CAPTURE_LIMIT: usize = 4 * 1024;

/// The canonical error shape returned to clients.
///
/// `status`, `code`, and `detail` are always present; `params` carries
/// developer diagnostics and is deliberately never serialized.
///
/// # Example
///
/// ```
/// use portico_core::Error;
///
/// let err = Error::not_found().with_param("user_id", "u-123");
/// assert_eq!(err.status, http::StatusCode::NOT_FOUND);
/// assert_eq!(err.code, "NOT_FOUND");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Error {
    /// HTTP status code for the response. Not serialized into the body.
    #[serde(skip)]
    pub status: StatusCode,
    /// Short, stable, machine-readable code.
    pub code: String,
    /// Human-readable description, safe to show to clients.
    pub detail: String,
    /// Diagnostic key-value pairs. Never serialized to the client.
    #[serde(skip)]
    pub params: BTreeMap<String, String>,
}

impl Error {
    /// Creates an error with the given status, code, and detail.
    #[must_use]
    pub fn new(status: StatusCode, code: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            status,
            code: code.into(),
            detail: detail.into(),
            params: BTreeMap::new(),
        }
    }

    /// Adds a diagnostic parameter.
    #[must_use]
    pub fn with_param(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.params.insert(key.into(), value.into());
        self
    }

    /// 400 Bad request.
    #[must_use]
    pub fn bad_request() -> Self {
        Self::new(StatusCode::BAD_REQUEST, "BAD_REQUEST", "Bad request")
    }

    /// 401 Unauthorised.
    #[must_use]
    pub fn unauthorised() -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORISED", "Unauthorised")
    }

    /// 404 Not found.
    #[must_use]
    pub fn not_found() -> Self {
        Self::new(StatusCode::NOT_FOUND, "NOT_FOUND", "Not found")
    }

    /// 405 Method not allowed.
    #[must_use]
    pub fn method_not_allowed() -> Self {
        Self::new(
            StatusCode::METHOD_NOT_ALLOWED,
            "METHOD_NOT_ALLOWED",
            "Method not allowed",
        )
    }

    /// 500 Internal server error.
    #[must_use]
    pub fn internal_server() -> Self {
        Self::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "INTERNAL_SERVER_ERROR",
            "Internal server error",
        )
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Code: {}; Status: {}; Detail: {}",
            self.code,
            self.status.as_u16(),
            self.detail
        )?;
        for (key, value) in &self.params {
            write!(f, "; {key}: {value}")?;
        }
        Ok(())
    }
}

impl std::error::Error for Error {}

/// A failure raised by the host framework's routing layer (404/405).
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("status={status}, message={message}")]
pub struct FrameworkError {
    /// The status the framework assigned (e.g. 404, 405).
    pub status: StatusCode,
    /// The framework's message for the failure.
    pub message: String,
}

impl FrameworkError {
    /// Creates a framework error from a status; the message defaults to the
    /// status's canonical reason.
    #[must_use]
    pub fn from_status(status: StatusCode) -> Self {
        Self {
            message: status.canonical_reason().unwrap_or("Unknown").to_string(),
            status,
        }
    }
}

/// A recovered panic, wrapping its classification and captured stack trace.
///
/// Distinguishes "a handler panicked" from "a handler returned an error" so
/// the request logger can attach the stack trace at error severity. The
/// wrapped [`Error`] is the internal-server-error classification unless the
/// panic payload already carried a classified [`Error`].
#[derive(Debug, Clone)]
pub struct PanicError {
    /// The classification of the panic.
    pub error: Error,
    /// Stack trace captured at panic time, truncated to
    /// [`STACK_CAPTURE_LIMIT`].
    pub stack_trace: String,
}

impl PanicError {
    /// Wraps a classified error with its stack trace, truncating the trace
    /// at the capture limit.
    #[must_use]
    pub fn new(error: Error, stack_trace: String) -> Self {
        Self {
            error,
            stack_trace: truncate_at_boundary(stack_trace, STACK_CAPTURE_LIMIT),
        }
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "panic: {}", self.error)
    }
}

impl std::error::Error for PanicError {}

/// Truncates `s` to at most `limit` bytes without splitting a character.
fn truncate_at_boundary(mut s: String, limit: usize) -> String {
    if s.len() > limit {
        let mut end = limit;
        while !s.is_char_boundary(end) {
            end -= 1;
        }
        s.truncate(end);
    }
    s
}

/// Any failure the pipeline can observe, as a closed sum.
///
/// Matched exhaustively by [`classify`] and the request logger; there are no
/// runtime type assertions anywhere in the error path.
#[derive(Debug)]
pub enum Failure {
    /// A classified [`Error`] raised intentionally by application code.
    Client(Error),
    /// A host-framework routing failure (404/405).
    Framework(FrameworkError),
    /// A recovered panic.
    Panic(PanicError),
    /// Anything else. Defaults to internal-server-error on classification,
    /// with the source's type name and message as diagnostics.
    Unknown {
        /// Type name of the original error value.
        type_name: &'static str,
        /// The original error.
        source: anyhow::Error,
    },
}

impl Failure {
    /// Wraps an arbitrary error, capturing its type name for diagnostics.
    #[must_use]
    pub fn unknown<E>(source: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Unknown {
            type_name: std::any::type_name::<E>(),
            source: anyhow::Error::new(source),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(err) => err.fmt(f),
            Self::Framework(err) => err.fmt(f),
            Self::Panic(err) => err.fmt(f),
            Self::Unknown { source, .. } => source.fmt(f),
        }
    }
}

impl From<Error> for Failure {
    fn from(err: Error) -> Self {
        Self::Client(err)
    }
}

impl From<FrameworkError> for Failure {
    fn from(err: FrameworkError) -> Self {
        Self::Framework(err)
    }
}

impl From<PanicError> for Failure {
    fn from(err: PanicError) -> Self {
        Self::Panic(err)
    }
}

impl From<anyhow::Error> for Failure {
    fn from(source: anyhow::Error) -> Self {
        Self::Unknown {
            type_name: "anyhow::Error",
            source,
        }
    }
}

/// Classifies any failure into the canonical [`Error`] shape.
///
/// Total and panic-free; classifying an already-classified error returns it
/// unchanged, so repeated classification never double-wraps.
#[must_use]
pub fn classify(failure: &Failure) -> Error {
    match failure {
        Failure::Client(err) => err.clone(),
        Failure::Panic(panic) => panic.error.clone(),
        Failure::Framework(fw) => Error::new(fw.status, "FRAMEWORK_HTTP_ERROR", fw.message.clone())
            .with_param("reason", fw.to_string()),
        Failure::Unknown { type_name, source } => Error::internal_server()
            .with_param("type", *type_name)
            .with_param("reason", source.to_string()),
    }
}

/// The final classified outcome of a failed request.
///
/// Written by the error-response stage once the failure has been classified
/// and the response emitted; read by the request-logger stage so the logged
/// error is always the one the client actually received.
#[derive(Debug, Clone)]
pub struct ResolvedError {
    /// The raw failure's message, before classification.
    pub message: String,
    /// The classified error sent to the client.
    pub error: Error,
    /// Stack trace when the failure was a recovered panic.
    pub stack_trace: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_params() {
        let err = Error::internal_server().with_param("reason", "boom");
        let rendered = err.to_string();
        assert!(rendered.starts_with("Code: INTERNAL_SERVER_ERROR; Status: 500; Detail: Internal server error"));
        assert!(rendered.contains("; reason: boom"));
    }

    #[test]
    fn error_serializes_only_code_and_detail() {
        let err = Error::bad_request().with_param("secret", "do-not-leak");
        let json = serde_json::to_value(&err).expect("serializable");
        assert_eq!(
            json,
            serde_json::json!({"code": "BAD_REQUEST", "detail": "Bad request"})
        );
    }

    #[test]
    fn well_known_errors_are_pinned() {
        let cases = [
            (Error::bad_request(), 400, "BAD_REQUEST"),
            (Error::unauthorised(), 401, "UNAUTHORISED"),
            (Error::not_found(), 404, "NOT_FOUND"),
            (Error::method_not_allowed(), 405, "METHOD_NOT_ALLOWED"),
            (Error::internal_server(), 500, "INTERNAL_SERVER_ERROR"),
        ];
        for (err, status, code) in cases {
            assert_eq!(err.status.as_u16(), status);
            assert_eq!(err.code, code);
            assert!(!err.detail.is_empty());
            assert!(err.params.is_empty());
        }
    }

    #[test]
    fn classify_client_error_is_identity() {
        let original = Error::not_found().with_param("id", "42");
        let classified = classify(&Failure::Client(original.clone()));
        assert_eq!(classified, original);

        // No double-wrapping on repeated classification.
        let again = classify(&Failure::Client(classified.clone()));
        assert_eq!(again, original);
    }

    #[test]
    fn classify_panic_returns_wrapped_error() {
        let inner = Error::internal_server().with_param("reason", "exploded");
        let panic = PanicError::new(inner.clone(), "stack".to_string());
        assert_eq!(classify(&Failure::Panic(panic)), inner);
    }

    #[test]
    fn classify_framework_error_maps_status_and_reason() {
        let fw = FrameworkError::from_status(StatusCode::NOT_FOUND);
        let classified = classify(&Failure::Framework(fw.clone()));
        assert_eq!(classified.status, StatusCode::NOT_FOUND);
        assert_eq!(classified.code, "FRAMEWORK_HTTP_ERROR");
        assert_eq!(classified.detail, "Not Found");
        assert_eq!(classified.params.get("reason"), Some(&fw.to_string()));
    }

    #[test]
    fn classify_unknown_error_defaults_to_internal() {
        let source = std::io::Error::new(std::io::ErrorKind::Other, "disk on fire");
        let classified = classify(&Failure::unknown(source));
        assert_eq!(classified.status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(classified.code, "INTERNAL_SERVER_ERROR");
        assert_eq!(classified.detail, "Internal server error");
        assert_eq!(
            classified.params.get("reason").map(String::as_str),
            Some("disk on fire")
        );
        assert_eq!(
            classified.params.get("type").map(String::as_str),
            Some("std::io::error::Error")
        );
    }

    #[test]
    fn classify_always_yields_valid_status() {
        let failures = [
            Failure::Client(Error::bad_request()),
            Failure::Framework(FrameworkError::from_status(StatusCode::METHOD_NOT_ALLOWED)),
            Failure::Panic(PanicError::new(Error::internal_server(), String::new())),
            Failure::from(anyhow::anyhow!("mystery")),
        ];
        for failure in &failures {
            let status = classify(failure).status.as_u16();
            assert!((100..=599).contains(&status), "status {status} out of range");
        }
    }

    #[test]
    fn panic_error_truncates_stack_trace() {
        let long = "x".repeat(STACK_CAPTURE_LIMIT * 2);
        let panic = PanicError::new(Error::internal_server(), long);
        assert_eq!(panic.stack_trace.len(), STACK_CAPTURE_LIMIT);
    }

    #[test]
    fn panic_error_truncates_on_char_boundary() {
        // Multi-byte characters straddling the limit must not split.
        let long = "é".repeat(STACK_CAPTURE_LIMIT);
        let panic = PanicError::new(Error::internal_server(), long);
        assert!(panic.stack_trace.len() <= STACK_CAPTURE_LIMIT);
        assert!(panic.stack_trace.is_char_boundary(panic.stack_trace.len()));
    }
}
