//! Error types for Ferry core

use ferry_types::FailureKind;
use thiserror::Error;

/// Errors that can occur while downloading
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Bad status: server responded with {status}")]
    BadStatus { status: u16 },

    #[error("Empty body: server declared a content length of zero")]
    EmptyBody,

    #[error("Hash mismatch: expected {expected}, got {actual}")]
    HashMismatch { expected: String, actual: String },

    #[error("Download failed after {attempts} attempt(s): {last}")]
    RetriesExhausted {
        attempts: u32,
        #[source]
        last: Box<DownloadError>,
    },

    #[error("Download was cancelled")]
    Cancelled,

    #[error("Engine is shut down")]
    EngineShutdown,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DownloadError {
    /// Category of this error
    pub fn kind(&self) -> FailureKind {
        match self {
            DownloadError::Network(_) | DownloadError::Io(_) | DownloadError::InvalidUrl(_) => {
                FailureKind::Io
            }
            DownloadError::BadStatus { .. } => FailureKind::BadStatus,
            DownloadError::EmptyBody => FailureKind::EmptyBody,
            DownloadError::HashMismatch { .. } => FailureKind::HashMismatch,
            DownloadError::RetriesExhausted { .. } => FailureKind::RetriesExhausted,
            DownloadError::Cancelled => FailureKind::Cancelled,
            DownloadError::EngineShutdown => FailureKind::EngineShutdown,
            DownloadError::InvalidConfig(_) => FailureKind::InvalidConfig,
        }
    }

    /// The failure of the final attempt, unwrapping `RetriesExhausted`
    pub fn last_failure(&self) -> &DownloadError {
        match self {
            DownloadError::RetriesExhausted { last, .. } => last.last_failure(),
            other => other,
        }
    }

    /// Check if another attempt may be made after this error
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            DownloadError::Cancelled
                | DownloadError::EngineShutdown
                | DownloadError::InvalidConfig(_)
        )
    }
}
