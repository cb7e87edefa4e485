//! Ferry Core - Download Engine
//!
//! This crate provides the core download functionality for Ferry.
//! It fetches a URL to a file in the background, retries failed attempts,
//! reports throttled progress and optionally verifies a SHA-256 digest.
//!
//! ```no_run
//! use ferry_core::{DownloadEngine, DownloadRequest, EngineConfig, FnListener};
//! use std::sync::Arc;
//!
//! # async fn run() -> Result<(), ferry_core::DownloadError> {
//! let config = EngineConfig::builder()
//!     .retry_limit(3)
//!     .integrity_check_enabled(true)
//!     .build()?;
//! let engine = DownloadEngine::new(config);
//!
//! engine.add_listener(Arc::new(
//!     FnListener::new().on_error(|request, error| eprintln!("{}: {}", request.url, error)),
//! ));
//!
//! let handle = engine.submit(DownloadRequest::new(
//!     "https://example.com/archive.tar.gz",
//!     "/tmp/archive.tar.gz",
//! ));
//! handle.wait().await?;
//! # Ok(())
//! # }
//! ```

mod config;
mod engine;
mod error;
mod events;
mod listener;
mod transport;

pub use config::*;
pub use engine::*;
pub use error::*;
pub use events::*;
pub use listener::*;
pub use transport::*;

pub use ferry_types::{
    DownloadEvent, DownloadRequest, EngineSettings, FailureKind, Settings, TransferProgress,
    TransportSettings,
};
