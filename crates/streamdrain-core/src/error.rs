//! Error types for the streamdrain consumer.
//!
//! One enum covers every failure the consumer can see: opening a source,
//! reading from it mid-drain, generating the workload, and tearing down.
//!
//! ## Fatality
//!
//! - **Fatal**: everything except `Teardown`. The current run stops.
//! - **Non-fatal**: `Teardown`. Logged as a warning and never escalated.

use thiserror::Error;

/// Errors that can occur while opening, draining, or closing a stream.
#[derive(Debug, Error)]
pub enum StreamError {
    /// Invalid or missing configuration (including a malformed record count).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The backing store could not be reached when opening the source.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The cursor is malformed or points at history the source no longer retains.
    #[error("Invalid cursor: {0}")]
    InvalidCursor(String),

    /// The handle failed mid-drain (e.g. upstream disconnect).
    #[error("Read error: {0}")]
    Read(String),

    /// A read returned more records than were requested.
    #[error("Batch contract violated: requested at most {requested} records, source returned {returned}")]
    BatchOverflow { requested: usize, returned: usize },

    /// The external workload process failed or its output could not be read.
    #[error("Workload generation failed: {reason}\nOutput:\n{output}")]
    WorkloadGenerationFailed { reason: String, output: String },

    /// The bootstrap read finished without delivering a record.
    #[error("No cursor confirmed: {0}")]
    NoConfirmedCursor(String),

    /// Closing a handle failed. Never fatal.
    #[error("Teardown error: {0}")]
    Teardown(String),

    /// The run was interrupted by the operator.
    #[error("Run aborted: {0}")]
    Aborted(String),

    /// I/O error (process spawn, file access).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization failure.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StreamError {
    /// Whether this error must stop the current run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, StreamError::Teardown(_))
    }
}

/// Result type alias for streamdrain operations.
pub type Result<T> = std::result::Result<T, StreamError>;

impl From<serde_json::Error> for StreamError {
    fn from(e: serde_json::Error) -> Self {
        StreamError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for StreamError {
    fn from(e: toml::de::Error) -> Self {
        StreamError::Serialization(e.to_string())
    }
}
