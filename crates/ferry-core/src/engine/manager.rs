//! Download Engine - the public entry point
//!
//! The engine owns the listener registry and a task tracker. Every
//! submission runs on its own task; shutting the engine down cancels
//! and awaits only the tasks this engine spawned.

use crate::config::EngineConfig;
use crate::engine::download_task::DownloadTask;
use crate::error::DownloadError;
use crate::events::BroadcastListener;
use crate::listener::{DownloadListener, ListenerId, ListenerRegistry};
use ferry_types::{DownloadEvent, DownloadRequest};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

const EVENT_CHANNEL_CAPACITY: usize = 1000;

/// Asynchronous download engine
///
/// Cloning is cheap; clones share listeners, tasks and configuration.
#[derive(Clone)]
pub struct DownloadEngine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    listeners: Arc<ListenerRegistry>,
    tracker: TaskTracker,
    /// Parent of every submission's cancellation token
    shutdown: CancellationToken,
    events: Mutex<Option<BroadcastListener>>,
}

impl DownloadEngine {
    /// Create an engine with the given configuration
    pub fn new(config: EngineConfig) -> Self {
        Self {
            inner: Arc::new(EngineInner {
                config,
                listeners: Arc::new(ListenerRegistry::new()),
                tracker: TaskTracker::new(),
                shutdown: CancellationToken::new(),
                events: Mutex::new(None),
            }),
        }
    }

    /// Create an engine with default configuration and the reqwest transport
    pub fn with_defaults() -> Result<Self, DownloadError> {
        Ok(Self::new(EngineConfig::builder().build()?))
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Register a listener for all subsequent events
    pub fn add_listener(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        self.inner.listeners.add(listener)
    }

    /// Unregister a listener. Removing an unknown id is a no-op.
    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.inner.listeners.remove(id)
    }

    /// Receive every event of this engine as a [`DownloadEvent`]
    pub fn subscribe(&self) -> broadcast::Receiver<DownloadEvent> {
        let mut events = self.inner.events.lock();
        if let Some(listener) = events.as_ref() {
            return listener.subscribe();
        }

        let listener = BroadcastListener::new(EVENT_CHANNEL_CAPACITY);
        let rx = listener.subscribe();
        self.inner.listeners.add(Arc::new(listener.clone()));
        *events = Some(listener);
        rx
    }

    /// Submit a request for background processing.
    ///
    /// Returns immediately. All outcomes, including rejection after shutdown,
    /// are delivered through listeners and through [`DownloadHandle::wait`].
    /// Must be called from within a tokio runtime.
    pub fn submit(&self, request: DownloadRequest) -> DownloadHandle {
        let id = Uuid::new_v4();
        let cancel = self.inner.shutdown.child_token();
        let task = DownloadTask::new(
            request.clone(),
            self.inner.config.clone(),
            Arc::clone(&self.inner.listeners),
            cancel.clone(),
        );

        let span = info_span!("download", %id, url = %request.url);
        let join = if self.inner.tracker.is_closed() {
            self.inner.tracker.spawn(task.reject().instrument(span))
        } else {
            info!(%id, "Submitting download of {}", request.url);
            self.inner.tracker.spawn(task.run().instrument(span))
        };

        DownloadHandle {
            id,
            request,
            cancel,
            join,
        }
    }

    /// Number of submissions that have not reached their terminal event yet
    pub fn active_count(&self) -> usize {
        self.inner.tracker.len()
    }

    pub fn is_accepting(&self) -> bool {
        !self.inner.tracker.is_closed()
    }

    /// Stop accepting submissions and wait for in-flight ones to finish
    pub async fn drain(&self) {
        info!("Draining {} download(s)", self.active_count());
        self.inner.tracker.close();
        self.inner.tracker.wait().await;
    }

    /// Stop accepting submissions, cancel everything in flight and wait
    /// for each cancelled submission to deliver its terminal event
    pub async fn shutdown(&self) {
        info!("Shutting down; cancelling {} download(s)", self.active_count());
        self.inner.tracker.close();
        self.inner.shutdown.cancel();
        self.inner.tracker.wait().await;
    }
}

/// Handle to one submission
///
/// Dropping the handle does not cancel the download.
#[derive(Debug)]
pub struct DownloadHandle {
    id: Uuid,
    request: DownloadRequest,
    cancel: CancellationToken,
    join: JoinHandle<Result<PathBuf, DownloadError>>,
}

impl DownloadHandle {
    /// Unique id of this submission, also recorded on its tracing span
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn request(&self) -> &DownloadRequest {
        &self.request
    }

    /// Cancel this submission. Its terminal event will be a cancellation error.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_finished(&self) -> bool {
        self.join.is_finished()
    }

    /// Wait for the terminal outcome, the same one listeners receive
    pub async fn wait(self) -> Result<PathBuf, DownloadError> {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                warn!(id = %self.id, "Download task did not complete: {}", e);
                Err(DownloadError::Cancelled)
            }
        }
    }
}
