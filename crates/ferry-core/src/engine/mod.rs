//! Download Engine - the heart of Ferry
//!
//! This module implements the download lifecycle:
//! - Per-submission retry state machine
//! - Streaming transfer with throttled progress reports
//! - SHA-256 integrity verification
//! - Cancellation and engine-wide shutdown

mod download_task;
mod integrity;
mod manager;
mod progress;
mod transfer;

pub use integrity::*;
pub use manager::*;
pub use progress::*;
pub use transfer::*;
