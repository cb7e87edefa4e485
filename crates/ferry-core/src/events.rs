//! Adapter from listener callbacks to a broadcast channel of events

use crate::error::DownloadError;
use crate::listener::DownloadListener;
use ferry_types::{DownloadEvent, DownloadRequest, FailureKind, TransferProgress};
use std::path::Path;
use tokio::sync::broadcast;

/// Listener that republishes every callback as a [`DownloadEvent`]
#[derive(Debug, Clone)]
pub struct BroadcastListener {
    tx: broadcast::Sender<DownloadEvent>,
}

impl BroadcastListener {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        self.tx.subscribe()
    }

    fn emit(&self, event: DownloadEvent) {
        // No receivers is fine
        let _ = self.tx.send(event);
    }
}

impl DownloadListener for BroadcastListener {
    fn on_queued(&self, request: &DownloadRequest) {
        self.emit(DownloadEvent::Queued {
            request: request.clone(),
        });
    }

    fn on_started(&self, request: &DownloadRequest, attempt: u32) {
        self.emit(DownloadEvent::Started {
            request: request.clone(),
            attempt,
        });
    }

    fn on_progress(&self, request: &DownloadRequest, progress: &TransferProgress) {
        self.emit(DownloadEvent::Progress {
            request: request.clone(),
            progress: *progress,
        });
    }

    fn on_completed(&self, request: &DownloadRequest, path: &Path) {
        self.emit(DownloadEvent::Completed {
            request: request.clone(),
            path: path.to_path_buf(),
        });
    }

    fn on_error(&self, request: &DownloadRequest, error: &DownloadError) {
        self.emit(failed_event(request, error));
    }
}

/// Serializable form of a terminal error
pub fn failed_event(request: &DownloadRequest, error: &DownloadError) -> DownloadEvent {
    let kind = error.kind();
    let cause = match kind {
        FailureKind::RetriesExhausted => Some(error.last_failure().kind()),
        _ => None,
    };
    DownloadEvent::Failed {
        request: request.clone(),
        kind,
        cause,
        message: error.to_string(),
    }
}
