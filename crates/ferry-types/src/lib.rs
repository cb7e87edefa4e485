//! Shared types for Ferry
//!
//! This crate contains the plain data structures shared between
//! the download engine and the CLI.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

// ============================================================================
// Request Types
// ============================================================================

/// Description of a single download.
///
/// Requests are compared by value: two requests with the same URL,
/// destination and digest are the same request as far as listeners
/// are concerned, even if they were submitted separately.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DownloadRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Expected SHA-256 of the file content, hex encoded
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_digest: Option<String>,
}

impl DownloadRequest {
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            expected_digest: None,
        }
    }

    pub fn with_expected_digest(self, digest: impl Into<String>) -> Self {
        Self {
            expected_digest: Some(digest.into()),
            ..self
        }
    }

    pub fn url(&self) -> &str {
        self.url.as_str()
    }
}

// ============================================================================
// Progress Types
// ============================================================================

/// A throttled progress report for one transfer attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferProgress {
    /// Completion percentage in `0..=100`, or `None` when the
    /// source did not declare a content length
    pub percent: Option<u8>,
    /// Average throughput since the attempt started
    pub bytes_per_second: u64,
    pub bytes_written: u64,
    pub content_length: Option<u64>,
}

impl TransferProgress {
    /// Estimated seconds remaining, when both length and speed are known
    pub fn eta_secs(&self) -> Option<u64> {
        let total = self.content_length?;
        if self.bytes_per_second == 0 {
            return None;
        }
        Some(total.saturating_sub(self.bytes_written) / self.bytes_per_second)
    }
}

// ============================================================================
// Settings Types
// ============================================================================

/// Engine behaviour settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Number of retries after the first failed attempt
    pub retry_limit: u32,
    /// Minimum spacing between progress reports, in milliseconds
    pub progress_report_interval_ms: u64,
    /// Verify `expected_digest` after each successful transfer
    pub integrity_check_enabled: bool,
    /// Delay before the first retry, in milliseconds. Doubles per attempt.
    pub retry_delay_ms: u64,
    /// Upper bound for the retry delay, in milliseconds
    pub max_retry_delay_ms: u64,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            retry_limit: 0,
            progress_report_interval_ms: 1000,
            integrity_check_enabled: false,
            retry_delay_ms: 0,
            max_retry_delay_ms: 30_000,
        }
    }
}

/// Settings for the default HTTP transport
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransportSettings {
    pub user_agent: String,
    pub connect_timeout_secs: u64,
    /// Longest silence allowed between two reads of a response. Slow but
    /// steady transfers are never cut off.
    pub read_timeout_secs: u64,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            user_agent: concat!("ferry/", env!("CARGO_PKG_VERSION")).to_string(),
            connect_timeout_secs: 30,
            read_timeout_secs: 60,
        }
    }
}

/// Complete settings file
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub engine: EngineSettings,
    pub transport: TransportSettings,
}

// ============================================================================
// Event Types
// ============================================================================

/// Category of a download failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    BadStatus,
    EmptyBody,
    Io,
    HashMismatch,
    RetriesExhausted,
    Cancelled,
    EngineShutdown,
    InvalidConfig,
}

/// Lifecycle events emitted by the engine, in serializable form
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum DownloadEvent {
    Queued {
        request: DownloadRequest,
    },
    Started {
        request: DownloadRequest,
        attempt: u32,
    },
    Progress {
        request: DownloadRequest,
        progress: TransferProgress,
    },
    Completed {
        request: DownloadRequest,
        path: PathBuf,
    },
    Failed {
        request: DownloadRequest,
        kind: FailureKind,
        /// Kind of the underlying failure when `kind` is `RetriesExhausted`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cause: Option<FailureKind>,
        message: String,
    },
}

impl DownloadEvent {
    pub fn request(&self) -> &DownloadRequest {
        match self {
            DownloadEvent::Queued { request }
            | DownloadEvent::Started { request, .. }
            | DownloadEvent::Progress { request, .. }
            | DownloadEvent::Completed { request, .. }
            | DownloadEvent::Failed { request, .. } => request,
        }
    }

    /// Whether this event ends the lifecycle of its submission
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadEvent::Completed { .. } | DownloadEvent::Failed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_compare_by_value() {
        let a = DownloadRequest::new("http://example.com/a", "/tmp/a");
        let b = DownloadRequest::new("http://example.com/a", "/tmp/a");
        assert_eq!(a, b);
        assert_ne!(a, b.with_expected_digest("abc123"));
    }

    #[test]
    fn partial_settings_fill_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "engine": { "retry_limit": 3 } }"#).unwrap();
        assert_eq!(settings.engine.retry_limit, 3);
        assert_eq!(settings.engine.progress_report_interval_ms, 1000);
        assert!(!settings.engine.integrity_check_enabled);
        assert_eq!(settings.transport, TransportSettings::default());
    }

    #[test]
    fn events_are_tagged() {
        let event = DownloadEvent::Started {
            request: DownloadRequest::new("http://example.com/a", "/tmp/a"),
            attempt: 1,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], "Started");
        assert_eq!(json["payload"]["attempt"], 1);
        assert!(!event.is_terminal());
    }

    #[test]
    fn eta_needs_length_and_speed() {
        let mut progress = TransferProgress {
            percent: Some(50),
            bytes_per_second: 100,
            bytes_written: 500,
            content_length: Some(1000),
        };
        assert_eq!(progress.eta_secs(), Some(5));
        progress.bytes_per_second = 0;
        assert_eq!(progress.eta_secs(), None);
        progress.bytes_per_second = 100;
        progress.content_length = None;
        assert_eq!(progress.eta_secs(), None);
    }
}
