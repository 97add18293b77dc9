//! Error types for bucketeer

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Configuration invalid: {0}")]
    ConfigurationInvalid(String),

    #[error("Unavailable: {0}")]
    Unavailable(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("{operation} failed with status {status}: {message}")]
    Service {
        operation: &'static str,
        status: u16,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed input: {0}")]
    MalformedInput(String),

    #[error("File {0} already has a remote locator")]
    AlreadySynced(i64),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("State error: {0}")]
    State(String),

    #[error("Other error: {0}")]
    Other(#[from] anyhow::Error),
}

impl From<reqwest::Error> for SyncError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            SyncError::Transport(format!("timed out: {}", e))
        } else if e.is_connect() {
            SyncError::Transport(format!("connection failed: {}", e))
        } else if e.is_builder() {
            SyncError::Unavailable(e.to_string())
        } else {
            SyncError::Transport(e.to_string())
        }
    }
}

impl SyncError {
    /// Errors that may clear up on a later run without anyone intervening.
    pub fn is_transient(&self) -> bool {
        match self {
            SyncError::Transport(_) => true,
            SyncError::Service { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

pub type Result<T> = std::result::Result<T, SyncError>;
