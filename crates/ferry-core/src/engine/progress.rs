//! Progress throttling and throughput math.
//!
//! Progress is reported at most once per interval of wall-clock time,
//! never once per chunk.

use ferry_types::TransferProgress;
use std::time::Duration;
use tokio::time::Instant;

/// Rate-limiter for progress reports.
///
/// The first report is due one full interval after the throttle is created,
/// so transfers that finish within one interval report nothing.
pub struct ProgressThrottle {
    last_emit: Instant,
    min_interval: Duration,
}

impl ProgressThrottle {
    pub fn new(min_interval: Duration) -> Self {
        Self {
            last_emit: Instant::now(),
            min_interval,
        }
    }

    /// Check if enough time has passed to emit another progress report.
    pub fn should_emit(&mut self) -> bool {
        let now = Instant::now();
        if now.duration_since(self.last_emit) < self.min_interval {
            return false;
        }
        self.last_emit = now;
        true
    }
}

/// Tracks bytes written during one transfer attempt
pub struct ProgressMeter {
    started: Instant,
    content_length: Option<u64>,
    bytes_written: u64,
}

impl ProgressMeter {
    pub fn new(content_length: Option<u64>) -> Self {
        Self {
            started: Instant::now(),
            content_length,
            bytes_written: 0,
        }
    }

    pub fn record(&mut self, bytes: u64) {
        self.bytes_written = self.bytes_written.saturating_add(bytes);
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn snapshot(&self) -> TransferProgress {
        let elapsed_ms = self.started.elapsed().as_millis() as u64;
        TransferProgress {
            percent: percent_of(self.bytes_written, self.content_length),
            bytes_per_second: bytes_per_second(self.bytes_written, elapsed_ms),
            bytes_written: self.bytes_written,
            content_length: self.content_length,
        }
    }
}

/// Completion percentage, clamped to 100 when the server under-reports its length.
/// `None` if the length is unknown.
pub fn percent_of(bytes_written: u64, content_length: Option<u64>) -> Option<u8> {
    let total = content_length.filter(|len| *len > 0)?;
    let percent = (bytes_written as u128 * 100) / total as u128;
    Some(percent.min(100) as u8)
}

/// Average throughput; elapsed time is floored at 1 ms.
pub fn bytes_per_second(bytes_written: u64, elapsed_ms: u64) -> u64 {
    let rate = (bytes_written as u128 * 1000) / elapsed_ms.max(1) as u128;
    rate.min(u64::MAX as u128) as u64
}
