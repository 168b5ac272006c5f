//! File change detection for the mutable layers.
//!
//! The [`ChangeWatcher`] sits on top of a [`FileWatchPort`], which reports
//! raw filesystem events. Per watched path it runs a small state machine:
//!
//! ```text
//!            create/modify                 window elapsed
//!   Idle ─────────────────▶ PendingDebounce ─────────────▶ Idle
//!                              │      ▲                   (reload, compare,
//!                              └──────┘                    notify if changed)
//!                           further events
//!                           are coalesced
//! ```
//!
//! The window starts at the first event and is not extended by later ones,
//! so a burst of writes produces at most one reload per window. After the
//! reload the canonical digest of the layer is compared with the one taken
//! before; callbacks run only when the contents actually changed.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, sleep_until};
use tracing::{debug, error, info, trace, warn};
use voxconf_core::{LayerStack, LoadStatus};

use crate::error::{RuntimeError, RuntimeResult};

// =============================================================================
// Watch Port
// =============================================================================

/// Kind of a filesystem event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FsEventKind {
    Created,
    Modified,
    Removed,
    Other,
}

/// A filesystem event reported by a [`FileWatchPort`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsEvent {
    pub path: PathBuf,
    pub kind: FsEventKind,
    pub is_dir: bool,
}

impl FsEvent {
    /// A modification of the file at `path`.
    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FsEventKind::Modified,
            is_dir: false,
        }
    }

    /// A creation of the file at `path`.
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: FsEventKind::Created,
            is_dir: false,
        }
    }

    fn is_write(&self) -> bool {
        matches!(self.kind, FsEventKind::Created | FsEventKind::Modified)
    }
}

/// Where a [`FileWatchPort`] delivers events.
pub type EventSink = mpsc::UnboundedSender<FsEvent>;

/// Source of filesystem events.
///
/// A port may report events for paths other than the ones asked for, such
/// as siblings in the same directory; the watcher filters them.
pub trait FileWatchPort: Send {
    /// Starts reporting events for `path` into `sink`.
    fn watch(&mut self, path: &Path, sink: EventSink) -> RuntimeResult<()>;

    /// Stops reporting events for `path`.
    fn unwatch(&mut self, path: &Path) -> RuntimeResult<()>;
}

/// [`FileWatchPort`] backed by the `notify` crate.
///
/// Files are watched through their parent directory, which keeps the watch
/// alive across editors that replace a file instead of writing it in place.
#[derive(Default)]
pub struct NotifyWatchPort {
    watcher: Option<RecommendedWatcher>,
    directories: HashMap<PathBuf, usize>,
}

impl NotifyWatchPort {
    /// Creates a port; the OS watcher is created on the first `watch`.
    pub fn new() -> Self {
        Self::default()
    }

    fn watcher(&mut self, sink: EventSink) -> RuntimeResult<&mut RecommendedWatcher> {
        if self.watcher.is_none() {
            let watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
                match res {
                    Ok(event) => forward(&sink, event),
                    Err(e) => warn!(error = %e, "Filesystem watch error"),
                }
            })
            .map_err(|e| RuntimeError::watch("<watcher>", e))?;
            self.watcher = Some(watcher);
        }
        self.watcher
            .as_mut()
            .ok_or_else(|| RuntimeError::watch("<watcher>", "watcher unavailable"))
    }
}

fn forward(sink: &EventSink, event: notify::Event) {
    let kind = match event.kind {
        EventKind::Create(_) => FsEventKind::Created,
        EventKind::Modify(_) => FsEventKind::Modified,
        EventKind::Remove(_) => FsEventKind::Removed,
        _ => FsEventKind::Other,
    };
    for path in event.paths {
        let is_dir = path.is_dir();
        if sink.send(FsEvent { path, kind, is_dir }).is_err() {
            trace!("Event receiver dropped");
            return;
        }
    }
}

fn parent_dir(path: &Path) -> PathBuf {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    }
}

impl FileWatchPort for NotifyWatchPort {
    fn watch(&mut self, path: &Path, sink: EventSink) -> RuntimeResult<()> {
        let dir = parent_dir(path);
        if let Some(count) = self.directories.get_mut(&dir) {
            *count += 1;
            return Ok(());
        }
        self.watcher(sink)?
            .watch(&dir, RecursiveMode::NonRecursive)
            .map_err(|e| RuntimeError::watch(&dir, e))?;
        self.directories.insert(dir, 1);
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> RuntimeResult<()> {
        let dir = parent_dir(path);
        let Some(count) = self.directories.get_mut(&dir) else {
            return Ok(());
        };
        *count -= 1;
        if *count > 0 {
            return Ok(());
        }
        self.directories.remove(&dir);
        if let Some(watcher) = self.watcher.as_mut() {
            watcher
                .unwatch(&dir)
                .map_err(|e| RuntimeError::watch(&dir, e))?;
        }
        Ok(())
    }
}

// =============================================================================
// Debounce
// =============================================================================

/// Pending paths and the instant their debounce window opened.
#[derive(Debug)]
pub struct DebounceTable {
    window: Duration,
    pending: HashMap<PathBuf, Instant>,
}

impl DebounceTable {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            pending: HashMap::new(),
        }
    }

    /// Records an event. Returns `true` when `path` moved from idle to
    /// pending, `false` when the event was coalesced into an open window.
    pub fn observe(&mut self, path: PathBuf, now: Instant) -> bool {
        if self.pending.contains_key(&path) {
            return false;
        }
        self.pending.insert(path, now);
        true
    }

    /// When the earliest open window closes.
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().min().map(|opened| *opened + self.window)
    }

    /// Removes and returns every path whose window has closed.
    pub fn take_due(&mut self, now: Instant) -> Vec<PathBuf> {
        let window = self.window;
        let mut due: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, opened)| **opened + window <= now)
            .map(|(path, _)| path.clone())
            .collect();
        due.sort();
        for path in &due {
            self.pending.remove(path);
        }
        due
    }

    pub fn is_pending(&self, path: &Path) -> bool {
        self.pending.contains_key(path)
    }
}

// =============================================================================
// Callbacks
// =============================================================================

/// Function invoked after a watched layer changed.
pub type ChangeCallback = Arc<dyn Fn() -> anyhow::Result<()> + Send + Sync>;

/// Registered change callbacks, shared between a context and its watcher.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    callbacks: Arc<Mutex<Vec<ChangeCallback>>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `callback` unless the same callback is already registered.
    pub fn register(&self, callback: ChangeCallback) -> bool {
        let mut callbacks = self.callbacks.lock();
        if callbacks.iter().any(|known| Arc::ptr_eq(known, &callback)) {
            return false;
        }
        callbacks.push(callback);
        true
    }

    /// Removes `callback`. Returns `false` if it was not registered.
    pub fn unregister(&self, callback: &ChangeCallback) -> bool {
        let mut callbacks = self.callbacks.lock();
        let before = callbacks.len();
        callbacks.retain(|known| !Arc::ptr_eq(known, callback));
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.callbacks.lock().is_empty()
    }

    /// Runs every callback once. Errors and panics are logged per callback.
    /// Returns the number of callbacks that failed.
    pub fn notify_all(&self) -> usize {
        let callbacks: Vec<ChangeCallback> = self.callbacks.lock().clone();
        let mut failures = 0;
        for callback in callbacks {
            match catch_unwind(AssertUnwindSafe(|| callback())) {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    failures += 1;
                    error!(error = %e, "Configuration change callback failed");
                }
                Err(_) => {
                    failures += 1;
                    error!("Configuration change callback panicked");
                }
            }
        }
        failures
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("callbacks", &self.len())
            .finish()
    }
}

// =============================================================================
// Change Watcher
// =============================================================================

/// Hook run after callbacks when a change was applied, used to announce the
/// change on the bus.
pub type ChangeHook = Arc<dyn Fn() + Send + Sync>;

/// Watches the backing files of the mutable layers of a [`LayerStack`].
pub struct ChangeWatcher {
    port: Box<dyn FileWatchPort>,
    watched: Vec<PathBuf>,
    callbacks: CallbackRegistry,
    shutdown: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ChangeWatcher {
    /// Watches every file-backed mutable layer of `stack` and spawns the
    /// event loop on the current tokio runtime.
    ///
    /// A layer whose directory cannot be watched is skipped with a warning.
    pub fn spawn(
        stack: Arc<LayerStack>,
        mut port: Box<dyn FileWatchPort>,
        callbacks: CallbackRegistry,
        debounce: Duration,
        on_change: Option<ChangeHook>,
    ) -> RuntimeResult<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| RuntimeError::NoRuntime(e.to_string()))?;

        let (sink, events) = mpsc::unbounded_channel();
        let mut watched = Vec::new();
        for layer in stack.watchable_layers() {
            let Some(path) = layer.origin() else {
                continue;
            };
            match port.watch(path, sink.clone()) {
                Ok(()) => watched.push(path.to_path_buf()),
                Err(e) => warn!(path = %path.display(), error = %e, "Cannot watch configuration"),
            }
        }
        // the port holds the only senders from here on
        drop(sink);

        let (shutdown, shutdown_rx) = oneshot::channel();
        let event_loop = EventLoop {
            stack,
            callbacks: callbacks.clone(),
            table: DebounceTable::new(debounce),
            on_change,
        };
        let task = runtime.spawn(event_loop.run(events, shutdown_rx));

        info!(
            paths = watched.len(),
            debounce_ms = debounce.as_millis() as u64,
            "Started configuration watcher"
        );

        Ok(Self {
            port,
            watched,
            callbacks,
            shutdown: Some(shutdown),
            task: Some(task),
        })
    }

    /// Paths currently watched.
    pub fn watched(&self) -> &[PathBuf] {
        &self.watched
    }

    /// Adds `callback`; registering the same callback twice is a no-op.
    pub fn register(&self, callback: ChangeCallback) -> bool {
        self.callbacks.register(callback)
    }

    /// Stops watching `path`.
    pub fn unwatch(&mut self, path: &Path) -> RuntimeResult<()> {
        self.watched.retain(|p| p != path);
        self.port.unwatch(path)
    }

    /// Stops the event loop and releases every watch.
    pub async fn shutdown(mut self) {
        self.stop();
        if let Some(task) = self.task.take() {
            let _ = task.await;
        }
    }

    fn stop(&mut self) {
        for path in std::mem::take(&mut self.watched) {
            if let Err(e) = self.port.unwatch(&path) {
                debug!(path = %path.display(), error = %e, "Failed to release watch");
            }
        }
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}

impl Drop for ChangeWatcher {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for ChangeWatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeWatcher")
            .field("watched", &self.watched)
            .field("callbacks", &self.callbacks)
            .finish()
    }
}

struct EventLoop {
    stack: Arc<LayerStack>,
    callbacks: CallbackRegistry,
    table: DebounceTable,
    on_change: Option<ChangeHook>,
}

impl EventLoop {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<FsEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        loop {
            let deadline = self.table.next_deadline();
            tokio::select! {
                _ = &mut shutdown => break,
                event = events.recv() => match event {
                    Some(event) => self.on_event(event),
                    None => break,
                },
                _ = sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    for path in self.table.take_due(Instant::now()) {
                        self.fire(path).await;
                    }
                }
            }
        }
        debug!("Configuration watcher stopped");
    }

    fn on_event(&mut self, event: FsEvent) {
        if event.is_dir {
            trace!(path = %event.path.display(), "Ignoring directory event");
            return;
        }
        if !event.is_write() {
            trace!(path = %event.path.display(), kind = ?event.kind, "Ignoring event");
            return;
        }
        if self.stack.find_by_origin(&event.path).is_none() {
            debug!(path = %event.path.display(), "Ignoring change to unwatched path");
            return;
        }

        if self.table.observe(event.path.clone(), Instant::now()) {
            debug!(path = %event.path.display(), "Configuration change pending");
        } else {
            trace!(path = %event.path.display(), "Change coalesced");
        }
    }

    /// Reloads the layer behind `path` on the blocking pool. The loop waits
    /// for it, so reloads never overlap.
    async fn fire(&self, path: PathBuf) {
        let stack = self.stack.clone();
        let callbacks = self.callbacks.clone();
        let on_change = self.on_change.clone();
        let task = tokio::task::spawn_blocking(move || {
            apply_change(&stack, &callbacks, on_change.as_ref(), &path)
        });
        if let Err(e) = task.await {
            error!(error = %e, "Configuration reload task failed");
        }
    }
}

/// Reloads the layer backed by `path` and notifies if its contents changed.
///
/// Only the file is read; a Remote cache change never contacts the backend.
fn apply_change(
    stack: &LayerStack,
    callbacks: &CallbackRegistry,
    on_change: Option<&ChangeHook>,
    path: &Path,
) {
    let Some(layer) = stack.find_by_origin(path) else {
        return;
    };

    let before = layer.content_digest().ok();
    if let LoadStatus::Failed(reason) = layer.reload() {
        error!(path = %path.display(), reason = %reason, "Failed to reload changed configuration");
        return;
    }
    let after = layer.content_digest().ok();

    if before == after {
        info!(path = %path.display(), "Configuration file unchanged");
        return;
    }

    info!(path = %path.display(), layer = %layer.kind(), "Configuration changed");
    callbacks.notify_all();
    if let Some(hook) = on_change {
        hook();
    }
}
