//! Error types for conductor.

use thiserror::Error;

/// Result type alias using conductor's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for conductor operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Ledger entry not found for a content hash
    #[error("Ledger entry not found: {0}")]
    EntryNotFound(String),

    /// Compare-and-swap update rejected because the entry moved on
    #[error("Stale write rejected for {hash}: expected state {expected}")]
    StaleWrite { hash: String, expected: String },

    /// Illegal ledger state transition
    #[error("Illegal state transition for {hash}: {from} -> {to}")]
    IllegalTransition {
        hash: String,
        from: String,
        to: String,
    },

    /// Extraction capability failed
    #[error("Extraction error: {0}")]
    Extraction(String),

    /// Capability call exceeded its timeout
    #[error("Capability timed out after {0}s")]
    CapabilityTimeout(u64),

    /// Content is unreadable or corrupt (permanent, never retried)
    #[error("Corrupt content: {0}")]
    CorruptContent(String),

    /// Queue broker error
    #[error("Queue error: {0}")]
    Queue(String),

    /// Search operation failed
    #[error("Search error: {0}")]
    Search(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Unsafe environment state detected before any mutation
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// HTTP/network request failed
    #[error("Request error: {0}")]
    Request(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Whether this failure is transient: the next chain position (or a
    /// later attempt) may still succeed. Permanent content failures and
    /// precondition failures are never retried.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Error::CapabilityTimeout(_)
                | Error::Extraction(_)
                | Error::Request(_)
                | Error::Queue(_)
        )
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<reqwest::Error> for Error {
    fn from(e: reqwest::Error) -> Self {
        Error::Request(e.to_string())
    }
}
