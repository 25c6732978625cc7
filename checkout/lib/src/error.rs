//! Error types for the checkout library.

use thiserror::Error;

/// Errors raised while recording a completed checkout.
#[derive(Debug, Error)]
pub enum CheckoutError {
    /// A start or end timestamp could not be parsed.
    #[error("invalid {field} '{value}': {reason}")]
    InvalidTimestamp {
        /// Which field was malformed (`startTime` or `endTime`).
        field: &'static str,
        /// The raw value as received.
        value: String,
        /// Why parsing failed.
        reason: String,
    },

    /// The transaction log lock was poisoned by a panicking writer.
    #[error("failed to acquire transaction log lock")]
    Lock,
}

/// Errors that can occur when writing a row to a sink.
#[derive(Debug, Error)]
pub enum SinkError {
    /// Failed to write to the sink file.
    #[error("failed to write row: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to serialize the row.
    #[error("failed to serialize row: {0}")]
    Serialize(#[from] serde_json::Error),

    /// Failed to acquire a file lock.
    #[error("failed to acquire file lock")]
    FileLock,

    /// The webhook request could not be sent.
    #[error("webhook request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The webhook answered with a non-success status.
    #[error("webhook rejected row with status {0}")]
    Rejected(u16),
}
