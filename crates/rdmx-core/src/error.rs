//! Error types for rdmx.
//!
//! All fallible operations across the library return [`Result<T>`], which
//! uses [`Error`] as the error type. Note that RDM transaction outcomes
//! (NACK, timeout, checksum failure) are *not* errors: they are reported
//! as a [`TransactionResult`](crate::types::TransactionResult) status.
//! Only failures that stop the session from talking to the channel at all
//! end up here.

/// The error type for all rdmx operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A transport-level error (adapter missing, open failed, write failed).
    #[error("transport error: {0}")]
    Transport(String),

    /// A protocol-level error (malformed catalog entry, bad UID string).
    #[error("protocol error: {0}")]
    Protocol(String),

    /// An invalid parameter was passed to a session operation.
    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    /// No adapter is open.
    #[error("not connected")]
    NotConnected,

    /// Another caller-initiated operation is still running.
    ///
    /// Single queries, batch queries, discovery and stress runs all hold
    /// the session's busy flag for their full duration.
    #[error("session busy: {0}")]
    Busy(String),

    /// The operation was cancelled before it produced a result.
    #[error("operation cancelled")]
    Cancelled,

    /// An underlying I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// A convenience `Result` alias using [`Error`] as the error type.
pub type Result<T> = std::result::Result<T, Error>;
