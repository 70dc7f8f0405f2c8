//! Error types for ringmend

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    // === I/O Errors ===
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // === Progress store errors ===
    #[error("Store error: {0}")]
    Store(#[from] sled::Error),

    #[error("Corrupted track record at {scope}/{key}: {reason}")]
    CorruptedRecord {
        scope: String,
        key: String,
        reason: String,
    },

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    // === Topology errors ===
    #[error("Empty token ring for {cluster}/{keyspace}")]
    EmptyRing { cluster: String, keyspace: String },

    #[error("Invalid slice count: {0}")]
    InvalidSliceCount(u64),

    #[error("Inverted token range [{start}, {end})")]
    InvertedTokenRange { start: i64, end: i64 },

    #[error("Topology fetch failed: {0}")]
    Topology(String),

    // === Dispatch errors ===
    #[error("Repair executor rejected job {id} for {cluster}/{keyspace}/{table}: {reason}")]
    ExecutorRejected {
        id: u32,
        cluster: String,
        keyspace: String,
        table: String,
        reason: String,
    },

    // === Network errors ===
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    // === Config errors ===
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // === Generic ===
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Is this a retryable error?
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::ConnectionFailed(_)
                | Error::Http(_)
                | Error::Topology(_)
                | Error::ExecutorRejected { .. }
        )
    }

    /// Convert to HTTP status code for receiver responses
    pub fn to_http_status(&self) -> axum::http::StatusCode {
        use axum::http::StatusCode;
        match self {
            Error::InvalidConfig(_) | Error::InvalidSliceCount(_) => StatusCode::BAD_REQUEST,
            Error::EmptyRing { .. } | Error::ConnectionFailed(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

// Implement From for common error types
impl From<&str> for Error {
    fn from(s: &str) -> Self {
        Error::Other(s.to_string())
    }
}

impl From<String> for Error {
    fn from(s: String) -> Self {
        Error::Other(s)
    }
}
