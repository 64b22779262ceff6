//! Core middleware stages.
//!
//! Implementations of the six mandatory stages, outermost first:
//!
//! 1. [`context`] - correlation ID, span, transaction lifecycle
//! 2. [`default_headers`] - baseline response headers
//! 3. [`request_logger`] - one structured record per request
//! 4. [`debug_dump`] - request/response dump in debug mode
//! 5. [`error_response`] - failure classification and error bodies
//! 6. [`recovery`] - panic capture

pub mod context;
pub mod debug_dump;
pub mod default_headers;
pub mod error_response;
pub mod recovery;
pub mod request_logger;

// Re-export main types
pub use context::{ContextMiddleware, ServiceIdentity};
pub use debug_dump::DebugDumpMiddleware;
pub use default_headers::{DefaultHeadersMiddleware, BUILD_VERSION_HEADER};
pub use error_response::{default_error_writer, ErrorResponseMiddleware, ErrorWriter};
pub use recovery::RecoveryMiddleware;
pub use request_logger::{LoggedError, RequestLogRecord, RequestLoggerMiddleware, TimeSource};
