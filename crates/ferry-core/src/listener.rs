//! Download listeners and the registry that broadcasts to them
//!
//! Listeners observe the lifecycle of every submitted request. All methods
//! have empty default bodies, so a listener only implements what it needs.

use crate::error::DownloadError;
use ferry_types::{DownloadRequest, TransferProgress};
use parking_lot::RwLock;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::error;

/// Observer of download lifecycle events.
///
/// Callbacks run on the engine's background tasks. Events for one submission
/// arrive in order; events for different submissions may interleave.
pub trait DownloadListener: Send + Sync {
    /// The request was accepted by the engine
    fn on_queued(&self, _request: &DownloadRequest) {}

    /// An attempt is starting. `attempt` counts from 1.
    fn on_started(&self, _request: &DownloadRequest, _attempt: u32) {}

    fn on_progress(&self, _request: &DownloadRequest, _progress: &TransferProgress) {}

    /// Terminal: the file is complete (and verified, if requested)
    fn on_completed(&self, _request: &DownloadRequest, _path: &Path) {}

    /// Terminal: the request failed for good
    fn on_error(&self, _request: &DownloadRequest, _error: &DownloadError) {}
}

type RequestFn = Box<dyn Fn(&DownloadRequest) + Send + Sync>;
type StartedFn = Box<dyn Fn(&DownloadRequest, u32) + Send + Sync>;
type ProgressFn = Box<dyn Fn(&DownloadRequest, &TransferProgress) + Send + Sync>;
type CompletedFn = Box<dyn Fn(&DownloadRequest, &Path) + Send + Sync>;
type ErrorFn = Box<dyn Fn(&DownloadRequest, &DownloadError) + Send + Sync>;

/// A listener assembled from closures
///
/// ```
/// use ferry_core::FnListener;
///
/// let listener = FnListener::new()
///     .on_completed(|request, path| println!("{} -> {}", request.url, path.display()));
/// ```
#[derive(Default)]
pub struct FnListener {
    queued: Option<RequestFn>,
    started: Option<StartedFn>,
    progress: Option<ProgressFn>,
    completed: Option<CompletedFn>,
    error: Option<ErrorFn>,
}

impl FnListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_queued(mut self, f: impl Fn(&DownloadRequest) + Send + Sync + 'static) -> Self {
        self.queued = Some(Box::new(f));
        self
    }

    pub fn on_started(mut self, f: impl Fn(&DownloadRequest, u32) + Send + Sync + 'static) -> Self {
        self.started = Some(Box::new(f));
        self
    }

    pub fn on_progress(
        mut self,
        f: impl Fn(&DownloadRequest, &TransferProgress) + Send + Sync + 'static,
    ) -> Self {
        self.progress = Some(Box::new(f));
        self
    }

    pub fn on_completed(
        mut self,
        f: impl Fn(&DownloadRequest, &Path) + Send + Sync + 'static,
    ) -> Self {
        self.completed = Some(Box::new(f));
        self
    }

    pub fn on_error(
        mut self,
        f: impl Fn(&DownloadRequest, &DownloadError) + Send + Sync + 'static,
    ) -> Self {
        self.error = Some(Box::new(f));
        self
    }
}

impl DownloadListener for FnListener {
    fn on_queued(&self, request: &DownloadRequest) {
        if let Some(f) = &self.queued {
            f(request)
        }
    }

    fn on_started(&self, request: &DownloadRequest, attempt: u32) {
        if let Some(f) = &self.started {
            f(request, attempt)
        }
    }

    fn on_progress(&self, request: &DownloadRequest, progress: &TransferProgress) {
        if let Some(f) = &self.progress {
            f(request, progress)
        }
    }

    fn on_completed(&self, request: &DownloadRequest, path: &Path) {
        if let Some(f) = &self.completed {
            f(request, path)
        }
    }

    fn on_error(&self, request: &DownloadRequest, error: &DownloadError) {
        if let Some(f) = &self.error {
            f(request, error)
        }
    }
}

/// Handle returned by `add_listener`, used to remove the listener again
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Concurrency-safe set of registered listeners
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: RwLock<Vec<(ListenerId, Arc<dyn DownloadListener>)>>,
    next_id: AtomicU64,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn DownloadListener>) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().push((id, listener));
        id
    }

    /// Remove a listener. Returns false if it was not registered.
    pub fn remove(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        let before = listeners.len();
        listeners.retain(|(existing, _)| *existing != id);
        listeners.len() != before
    }

    pub fn len(&self) -> usize {
        self.listeners.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.read().is_empty()
    }

    /// Deliver an event to every listener registered right now.
    ///
    /// The lock is only held while copying the listener list. A listener
    /// that panics is logged and skipped; the others still get the event.
    pub fn broadcast(&self, event: &str, deliver: impl Fn(&dyn DownloadListener)) {
        let snapshot: Vec<Arc<dyn DownloadListener>> = self
            .listeners
            .read()
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();

        for listener in snapshot {
            if catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref()))).is_err() {
                error!("Listener panicked while handling {} event", event);
            }
        }
    }
}
