//! File watching and debounced change queue
//!
//! Provides a [`FileWatcher`] that wraps the `notify` crate to monitor the sync
//! root, converting raw OS notifications into [`FsChange`] records.
//!
//! The watcher callback runs on the `notify` thread. It never touches the
//! metadata store: it only forwards raw records over an unbounded channel to
//! the [`ChangeScheduler`](super::scheduler::ChangeScheduler), which coalesces
//! them in a [`DebouncedChangeQueue`] before they reach the event queue.
//!
//! ## Architecture
//!
//! ```text
//! inotify / kqueue
//!       │
//!       ▼
//!  FileWatcher ──→ mpsc::unbounded ──→ ChangeScheduler ──→ EventQueue (QueueEvent::Fs)
//!                                            │
//!                                   DebouncedChangeQueue
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use cmisync_core::domain::{FsChange, FsChangeKind};
use notify::event::{CreateKind, ModifyKind, RemoveKind, RenameMode};
use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

// ============================================================================
// FileWatcher
// ============================================================================

/// Watches the sync root for changes using the OS-native mechanism
///
/// ## Usage
///
/// ```ignore
/// let (tx, rx) = tokio::sync::mpsc::unbounded_channel();
/// let mut watcher = FileWatcher::new(tx)?;
/// let handle = watcher.watch(Path::new("/home/user/CmisSync"))?;
/// ```
pub struct FileWatcher {
    watcher: RecommendedWatcher,
}

impl FileWatcher {
    /// Creates a watcher that forwards raw changes to `change_tx`
    ///
    /// # Errors
    /// Returns an error if the underlying OS watcher cannot be created
    pub fn new(change_tx: mpsc::UnboundedSender<FsChange>) -> Result<Self> {
        info!("Initializing file watcher");

        let watcher = RecommendedWatcher::new(
            move |res: std::result::Result<notify::Event, notify::Error>| match res {
                Ok(event) => {
                    if let Some(change) = map_notify_event(&event) {
                        if change_tx.send(change).is_err() {
                            warn!("Failed to forward change (scheduler dropped)");
                        }
                    }
                }
                Err(err) => {
                    error!(error = %err, "File watcher error");
                }
            },
            notify::Config::default(),
        )
        .context("Failed to create file watcher")?;

        Ok(Self { watcher })
    }

    /// Starts watching a directory recursively
    ///
    /// # Errors
    /// Returns an error if the path cannot be watched (missing path,
    /// insufficient permissions, or the inotify watch limit was reached)
    pub fn watch(&mut self, path: &Path) -> Result<WatchHandle> {
        info!(path = %path.display(), "Starting recursive watch");

        self.watcher
            .watch(path, RecursiveMode::Recursive)
            .with_context(|| format!("Failed to watch path: {}", path.display()))?;

        Ok(WatchHandle {
            path: path.to_path_buf(),
        })
    }

    /// Stops watching a directory
    ///
    /// # Errors
    /// Returns an error if the path was not being watched
    pub fn unwatch(&mut self, handle: WatchHandle) -> Result<()> {
        info!(path = %handle.path.display(), "Stopping watch");

        self.watcher
            .unwatch(&handle.path)
            .with_context(|| format!("Failed to unwatch path: {}", handle.path.display()))?;

        Ok(())
    }
}

/// Token for an active recursive watch
#[derive(Debug)]
pub struct WatchHandle {
    path: PathBuf,
}

impl WatchHandle {
    pub fn path(&self) -> &Path {
        &self.path
    }
}

// ============================================================================
// Event mapping - notify::Event → FsChange
// ============================================================================

/// Converts a `notify::Event` into a raw [`FsChange`]
///
/// - `Create(*)` → created
/// - `Modify(Name(Both))` with two paths → renamed
/// - `Modify(Name(From))` → deleted (the other half may never arrive)
/// - `Modify(Name(To))` → created
/// - other `Modify(*)` → changed
/// - `Remove(*)` → deleted
///
/// The directory flag is only known here for folder create/remove kinds; the
/// scheduler stats the path again once the change settles.
fn map_notify_event(event: &notify::Event) -> Option<FsChange> {
    let paths = &event.paths;

    match &event.kind {
        EventKind::Create(kind) => {
            let path = paths.first()?;
            debug!(path = %path.display(), "Mapped Create event");
            Some(FsChange::created(path, matches!(kind, CreateKind::Folder)))
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
            if paths.len() >= 2 {
                let old = &paths[0];
                let new = &paths[1];
                debug!(old = %old.display(), new = %new.display(), "Mapped Rename event");
                Some(FsChange::renamed(old, new, false))
            } else {
                let path = paths.first()?;
                debug!(path = %path.display(), "Rename with single path, treating as changed");
                Some(FsChange::changed(path, false))
            }
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            let path = paths.first()?;
            Some(FsChange::deleted(path))
        }

        EventKind::Modify(ModifyKind::Name(RenameMode::To)) => {
            let path = paths.first()?;
            Some(FsChange::created(path, false))
        }

        EventKind::Modify(_) => {
            let path = paths.first()?;
            debug!(path = %path.display(), kind = ?event.kind, "Mapped Modify event");
            Some(FsChange::changed(path, false))
        }

        EventKind::Remove(kind) => {
            let path = paths.first()?;
            debug!(path = %path.display(), "Mapped Remove event");
            let mut change = FsChange::deleted(path);
            change.is_dir = matches!(kind, RemoveKind::Folder);
            Some(change)
        }

        _ => {
            debug!(kind = ?event.kind, "Ignoring event kind");
            None
        }
    }
}

// ============================================================================
// DebouncedChangeQueue
// ============================================================================

/// Queue that coalesces rapid filesystem changes per path
///
/// Changes are only emitted by [`poll`](DebouncedChangeQueue::poll) once a
/// path has been quiet for the debounce delay. A later `Changed` never
/// downgrades a pending `Created` or `Renamed`: editors typically write right
/// after creating or renaming, and the richer record must survive.
pub struct DebouncedChangeQueue {
    pending: HashMap<PathBuf, (FsChange, Instant)>,
    debounce_delay: Duration,
}

impl DebouncedChangeQueue {
    pub fn new(debounce_delay: Duration) -> Self {
        Self {
            pending: HashMap::new(),
            debounce_delay,
        }
    }

    /// Inserts or updates the pending change for the record's path
    ///
    /// Every push resets the path's debounce window.
    pub fn push(&mut self, change: FsChange) {
        debug!(path = %change.path.display(), kind = ?change.kind, "Enqueuing raw change");
        let now = Instant::now();

        if let Some((existing, timestamp)) = self.pending.get_mut(&change.path) {
            let keep_existing = change.kind == FsChangeKind::Changed
                && matches!(existing.kind, FsChangeKind::Created | FsChangeKind::Renamed);
            if !keep_existing {
                *existing = change;
            }
            *timestamp = now;
            return;
        }

        self.pending.insert(change.path.clone(), (change, now));
    }

    /// Removes and returns every change older than the debounce delay
    pub fn poll(&mut self) -> Vec<FsChange> {
        let now = Instant::now();
        let settled_paths: Vec<PathBuf> = self
            .pending
            .iter()
            .filter(|(_, (_, timestamp))| now.duration_since(*timestamp) >= self.debounce_delay)
            .map(|(path, _)| path.clone())
            .collect();

        let mut settled: Vec<FsChange> = settled_paths
            .iter()
            .filter_map(|path| self.pending.remove(path).map(|(change, _)| change))
            .collect();
        // Parents before children keeps folder creation ahead of its content
        settled.sort_by(|a, b| a.path.cmp(&b.path));

        if !settled.is_empty() {
            debug!(count = settled.len(), "Polled settled changes");
        }
        settled
    }

    /// Removes and returns everything, settled or not
    pub fn drain(&mut self) -> Vec<FsChange> {
        let mut all: Vec<FsChange> = self.pending.drain().map(|(_, (change, _))| change).collect();
        all.sort_by(|a, b| a.path.cmp(&b.path));
        all
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}
