//! Error taxonomy shared by every Courier crate.

use thiserror::Error;

/// Everything that can go wrong while syncing, dispatching or recording a job.
#[derive(Debug, Error)]
pub enum CourierError {
    /// Malformed record from the Queue Source. Dropped, never enqueued.
    #[error("Invalid job record: {0}")]
    Validation(String),

    /// Network error, timeout or 5xx while sending. Retried up to the bound.
    #[error("Transient send failure: {0}")]
    TransientSend(String),

    /// Client-side rejection of the message itself. Terminal.
    #[error("Send rejected with status {status}: {message}")]
    PermanentSend { status: u16, message: String },

    /// Retry bound reached. Terminal.
    #[error("Retries exhausted after {attempts} attempts: {last_error}")]
    RetryExhausted { attempts: u32, last_error: String },

    /// Queue Source or Channel Directory could not be fetched.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// Ledger could not be loaded or persisted.
    #[error("Ledger error: {0}")]
    Ledger(String),

    /// Delivery Sink rejected or did not receive a confirmation.
    #[error("Delivery sink error: {0}")]
    Sink(String),

    #[error("Config error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CourierError>;
