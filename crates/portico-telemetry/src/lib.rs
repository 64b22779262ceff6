//! Observability support for portico services.
//!
//! This crate covers the two telemetry concerns the pipeline needs:
//!
//! - **Logging**: structured JSON output via the tracing-subscriber
//!   ecosystem, consumed by the request-logger stage which emits exactly
//!   one record per request.
//! - **Trace recording**: an in-memory [`RecordingTraceApp`] implementing
//!   the tracing collaborator seams from `portico-core`, used by tests and
//!   local development in place of an external tracing agent.
//!
//! # Example
//!
//! ```rust,ignore
//! use portico_telemetry::{LogConfig, init_logging};
//!
//! let config = LogConfig::production();
//! init_logging(&config)?;
//! ```

pub mod error;
pub mod logging;
pub mod recording;

pub use error::TelemetryError;
pub use logging::{create_env_filter, init_logging, LogConfig};
pub use recording::{RecordedTransaction, RecordingTraceApp};

/// Result type for telemetry operations.
pub type TelemetryResult<T> = Result<T, TelemetryError>;
