//! Download task - drives one submitted request to its terminal event
//!
//! This is the retry state machine for a single submission:
//! queued, then one or more attempts of transfer + optional integrity check,
//! then exactly one of completed or error.

use crate::config::EngineConfig;
use crate::engine::integrity::verify_file;
use crate::engine::transfer::transfer;
use crate::error::DownloadError;
use crate::listener::ListenerRegistry;
use ferry_types::DownloadRequest;
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

/// A single submission's worth of work
pub(crate) struct DownloadTask {
    request: DownloadRequest,
    config: EngineConfig,
    listeners: Arc<ListenerRegistry>,
    cancel: CancellationToken,
}

impl DownloadTask {
    pub(crate) fn new(
        request: DownloadRequest,
        config: EngineConfig,
        listeners: Arc<ListenerRegistry>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            request,
            config,
            listeners,
            cancel,
        }
    }

    /// Run the task to completion, delivering exactly one terminal event
    pub(crate) async fn run(self) -> Result<PathBuf, DownloadError> {
        info!("Queued download of {}", self.request.url);
        self.listeners
            .broadcast("queued", |l| l.on_queued(&self.request));

        let result = self.run_attempts().await;
        self.finish(result)
    }

    /// Reject a submission made after the engine stopped accepting work
    pub(crate) async fn reject(self) -> Result<PathBuf, DownloadError> {
        warn!("Rejected download of {}: engine is shut down", self.request.url);
        self.listeners
            .broadcast("queued", |l| l.on_queued(&self.request));
        self.finish(Err(DownloadError::EngineShutdown))
    }

    async fn run_attempts(&self) -> Result<PathBuf, DownloadError> {
        let max_attempts = self.config.max_attempts();
        let mut failed_attempts: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                return Err(DownloadError::Cancelled);
            }

            let attempt = failed_attempts + 1;
            info!("Starting attempt {}/{}", attempt, max_attempts);
            self.listeners
                .broadcast("started", |l| l.on_started(&self.request, attempt));

            let error = match self.attempt().await {
                Ok(path) => return Ok(path),
                Err(e) if !e.is_retryable() => return Err(e),
                Err(e) => e,
            };

            failed_attempts += 1;
            if failed_attempts > self.config.retry_limit() {
                return Err(DownloadError::RetriesExhausted {
                    attempts: failed_attempts,
                    last: Box::new(error),
                });
            }

            let delay = self.config.retry_delay_after(failed_attempts);
            warn!(
                "Attempt {}/{} failed: {}. Retrying in {:?}.",
                attempt, max_attempts, error, delay
            );

            if !delay.is_zero() {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return Err(DownloadError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
            }
        }
    }

    /// One transfer, followed by the integrity check when it applies
    async fn attempt(&self) -> Result<PathBuf, DownloadError> {
        let path = transfer(
            &self.request,
            self.config.transport().as_ref(),
            self.config.progress_report_interval(),
            &self.cancel,
            |progress| {
                self.listeners
                    .broadcast("progress", |l| l.on_progress(&self.request, progress))
            },
        )
        .await?;

        if self.config.integrity_check_enabled() {
            if let Some(expected) = self.request.expected_digest.as_deref() {
                verify_file(&path, expected).await?;
                info!("Verified SHA-256 of {}", path.display());
            }
        }

        Ok(path)
    }

    fn finish(&self, result: Result<PathBuf, DownloadError>) -> Result<PathBuf, DownloadError> {
        match &result {
            Ok(path) => {
                info!("Download completed: {}", path.display());
                self.listeners
                    .broadcast("completed", |l| l.on_completed(&self.request, path));
            }
            Err(e) => {
                error!("Download failed: {} - {}", self.request.url, e);
                self.listeners
                    .broadcast("error", |l| l.on_error(&self.request, e));
            }
        }
        result
    }
}
