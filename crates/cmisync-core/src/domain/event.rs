//! Canonical change events and queue records
//!
//! Every change that reaches the decision engine is expressed as a
//! [`SyncEvent`]: a folder or file event carrying one change tag per side,
//! plus a content tag per side for files. Both the local watcher path and the
//! remote change-log path normalize into this shape.
//!
//! ## Design Notes
//!
//! - Events are validated at construction: an event with no change on any
//!   side is rejected with [`DomainError::EmptyEvent`].
//! - The local reference is either a simple path or a moved pair, which gives
//!   the `{Folder, File} x {Simple, Moved}` variant space.
//! - [`QueueEvent::Sync`] boxes the event so a retried event is the very same
//!   allocation that was dequeued.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::errors::DomainError;
use super::interaction::InteractionDetail;
use super::remote_object::{ObjectKind, RemoteObject};

// ============================================================================
// Change tags
// ============================================================================

/// Structural change observed on one side of an object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetaDataChangeType {
    /// No structural change
    #[default]
    None,
    /// The object appeared
    Created,
    /// Metadata of the object changed
    Changed,
    /// The object disappeared
    Deleted,
    /// The object was renamed or moved
    Moved,
}

impl MetaDataChangeType {
    /// Returns true for every tag except `None`
    pub fn is_change(self) -> bool {
        !matches!(self, MetaDataChangeType::None)
    }
}

/// Content stream change observed on one side of a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentChangeType {
    /// Content untouched
    #[default]
    None,
    /// Content written for the first time
    Created,
    /// Content rewritten
    Changed,
    /// Content removed together with the file
    Deleted,
}

impl ContentChangeType {
    /// Returns true for every tag except `None`
    pub fn is_change(self) -> bool {
        !matches!(self, ContentChangeType::None)
    }
}

// ============================================================================
// Local object reference
// ============================================================================

/// Reference to the local filesystem object of an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LocalObjectRef {
    /// The object at a single path
    Simple { path: PathBuf },
    /// The object moved from `old_path` to `new_path`
    Moved { old_path: PathBuf, new_path: PathBuf },
}

impl LocalObjectRef {
    /// Creates a simple reference
    pub fn simple(path: impl Into<PathBuf>) -> Self {
        LocalObjectRef::Simple { path: path.into() }
    }

    /// Creates a moved reference
    pub fn moved(old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>) -> Self {
        LocalObjectRef::Moved {
            old_path: old_path.into(),
            new_path: new_path.into(),
        }
    }

    /// Current path of the object (the new path for moves)
    pub fn path(&self) -> &Path {
        match self {
            LocalObjectRef::Simple { path } => path,
            LocalObjectRef::Moved { new_path, .. } => new_path,
        }
    }

    /// Previous path, only for moved references
    pub fn old_path(&self) -> Option<&Path> {
        match self {
            LocalObjectRef::Simple { .. } => None,
            LocalObjectRef::Moved { old_path, .. } => Some(old_path),
        }
    }

    /// Returns true for moved references
    pub fn is_moved(&self) -> bool {
        matches!(self, LocalObjectRef::Moved { .. })
    }
}

// ============================================================================
// Folder and file events
// ============================================================================

/// Canonical change record for a folder
#[derive(Debug, Clone, PartialEq)]
pub struct FolderEvent {
    local: MetaDataChangeType,
    remote: MetaDataChangeType,
    local_object: Option<LocalObjectRef>,
    remote_object: Option<RemoteObject>,
    retry_count: u32,
}

impl FolderEvent {
    /// Creates a folder event
    ///
    /// # Errors
    /// Returns [`DomainError::EmptyEvent`] when both tags are `None`
    pub fn new(local: MetaDataChangeType, remote: MetaDataChangeType) -> Result<Self, DomainError> {
        if !local.is_change() && !remote.is_change() {
            return Err(DomainError::EmptyEvent(
                "folder event without local or remote change".to_string(),
            ));
        }
        Ok(Self {
            local,
            remote,
            local_object: None,
            remote_object: None,
            retry_count: 0,
        })
    }

    /// Attaches the local object reference
    pub fn with_local(mut self, local: LocalObjectRef) -> Self {
        self.local_object = Some(local);
        self
    }

    /// Attaches the remote object snapshot
    pub fn with_remote(mut self, remote: RemoteObject) -> Self {
        self.remote_object = Some(remote);
        self
    }
}

/// Canonical change record for a file
#[derive(Debug, Clone, PartialEq)]
pub struct FileEvent {
    local: MetaDataChangeType,
    remote: MetaDataChangeType,
    local_content: ContentChangeType,
    remote_content: ContentChangeType,
    local_object: Option<LocalObjectRef>,
    remote_object: Option<RemoteObject>,
    retry_count: u32,
}

impl FileEvent {
    /// Creates a file event
    ///
    /// # Errors
    /// Returns [`DomainError::EmptyEvent`] when all four tags are `None`
    pub fn new(
        local: MetaDataChangeType,
        remote: MetaDataChangeType,
        local_content: ContentChangeType,
        remote_content: ContentChangeType,
    ) -> Result<Self, DomainError> {
        if !local.is_change()
            && !remote.is_change()
            && !local_content.is_change()
            && !remote_content.is_change()
        {
            return Err(DomainError::EmptyEvent(
                "file event without metadata or content change".to_string(),
            ));
        }
        Ok(Self {
            local,
            remote,
            local_content,
            remote_content,
            local_object: None,
            remote_object: None,
            retry_count: 0,
        })
    }

    /// Attaches the local object reference
    pub fn with_local(mut self, local: LocalObjectRef) -> Self {
        self.local_object = Some(local);
        self
    }

    /// Attaches the remote object snapshot
    pub fn with_remote(mut self, remote: RemoteObject) -> Self {
        self.remote_object = Some(remote);
        self
    }
}

/// A canonical change record, folder or file
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEvent {
    Folder(FolderEvent),
    File(FileEvent),
}

impl From<FolderEvent> for SyncEvent {
    fn from(event: FolderEvent) -> Self {
        SyncEvent::Folder(event)
    }
}

impl From<FileEvent> for SyncEvent {
    fn from(event: FileEvent) -> Self {
        SyncEvent::File(event)
    }
}

impl SyncEvent {
    pub fn kind(&self) -> ObjectKind {
        match self {
            SyncEvent::Folder(_) => ObjectKind::Folder,
            SyncEvent::File(_) => ObjectKind::File,
        }
    }

    pub fn is_folder(&self) -> bool {
        matches!(self, SyncEvent::Folder(_))
    }

    /// Local side change tag
    pub fn local_change(&self) -> MetaDataChangeType {
        match self {
            SyncEvent::Folder(e) => e.local,
            SyncEvent::File(e) => e.local,
        }
    }

    /// Remote side change tag
    pub fn remote_change(&self) -> MetaDataChangeType {
        match self {
            SyncEvent::Folder(e) => e.remote,
            SyncEvent::File(e) => e.remote,
        }
    }

    /// Local content tag (always `None` for folders)
    pub fn local_content(&self) -> ContentChangeType {
        match self {
            SyncEvent::Folder(_) => ContentChangeType::None,
            SyncEvent::File(e) => e.local_content,
        }
    }

    /// Remote content tag (always `None` for folders)
    pub fn remote_content(&self) -> ContentChangeType {
        match self {
            SyncEvent::Folder(_) => ContentChangeType::None,
            SyncEvent::File(e) => e.remote_content,
        }
    }

    pub fn local_object(&self) -> Option<&LocalObjectRef> {
        match self {
            SyncEvent::Folder(e) => e.local_object.as_ref(),
            SyncEvent::File(e) => e.local_object.as_ref(),
        }
    }

    pub fn remote_object(&self) -> Option<&RemoteObject> {
        match self {
            SyncEvent::Folder(e) => e.remote_object.as_ref(),
            SyncEvent::File(e) => e.remote_object.as_ref(),
        }
    }

    /// Current local path, if the event references a local object
    pub fn local_path(&self) -> Option<&Path> {
        self.local_object().map(LocalObjectRef::path)
    }

    /// Number of times this event was re-enqueued after a transient failure
    pub fn retry_count(&self) -> u32 {
        match self {
            SyncEvent::Folder(e) => e.retry_count,
            SyncEvent::File(e) => e.retry_count,
        }
    }

    /// Increments the retry counter and returns the new value
    pub fn increment_retry(&mut self) -> u32 {
        let counter = match self {
            SyncEvent::Folder(e) => &mut e.retry_count,
            SyncEvent::File(e) => &mut e.retry_count,
        };
        *counter = counter.saturating_add(1);
        *counter
    }

    /// Short human description used in log fields
    pub fn describe(&self) -> String {
        let target = self
            .local_path()
            .map(|p| p.display().to_string())
            .or_else(|| self.remote_object().map(|o| o.id.to_string()))
            .unwrap_or_else(|| "<unknown>".to_string());
        format!(
            "{} {} local={:?} remote={:?}",
            self.kind(),
            target,
            self.local_change(),
            self.remote_change()
        )
    }
}

// ============================================================================
// Raw filesystem changes
// ============================================================================

/// Raw notification kind delivered by the OS watcher
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FsChangeKind {
    Created,
    Changed,
    Deleted,
    Renamed,
}

/// Raw filesystem change before normalization
///
/// `old_path` is only set for renames. `is_dir` is only trustworthy for
/// paths that still exist; deletions resolve the kind from the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FsChange {
    pub kind: FsChangeKind,
    pub path: PathBuf,
    pub old_path: Option<PathBuf>,
    pub is_dir: bool,
}

impl FsChange {
    pub fn created(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            kind: FsChangeKind::Created,
            path: path.into(),
            old_path: None,
            is_dir,
        }
    }

    pub fn changed(path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            kind: FsChangeKind::Changed,
            path: path.into(),
            old_path: None,
            is_dir,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: FsChangeKind::Deleted,
            path: path.into(),
            old_path: None,
            is_dir: false,
        }
    }

    pub fn renamed(old_path: impl Into<PathBuf>, new_path: impl Into<PathBuf>, is_dir: bool) -> Self {
        Self {
            kind: FsChangeKind::Renamed,
            path: new_path.into(),
            old_path: Some(old_path.into()),
            is_dir,
        }
    }
}

// ============================================================================
// Queue records
// ============================================================================

/// A user-actionable problem raised by a resolution strategy
#[derive(Debug, Clone, PartialEq)]
pub struct InteractionNeeded {
    pub detail: InteractionDetail,
}

impl InteractionNeeded {
    pub fn new(detail: InteractionDetail) -> Self {
        Self { detail }
    }
}

/// Every record that travels through the per-tree event queue
#[derive(Debug)]
pub enum QueueEvent {
    /// A canonical change, boxed so retries keep the same instance
    Sync(Box<SyncEvent>),
    /// A raw OS notification awaiting normalization
    Fs(FsChange),
    /// A conflict that needs the user
    InteractionNeeded(InteractionNeeded),
    /// Request to poll the remote change log, or to crawl both trees
    StartNextSync { full_sync: bool },
}

impl QueueEvent {
    /// Wraps a canonical event
    pub fn sync(event: impl Into<SyncEvent>) -> Self {
        QueueEvent::Sync(Box::new(event.into()))
    }

    /// Stable name of the record kind, used in logs
    pub fn name(&self) -> &'static str {
        match self {
            QueueEvent::Sync(event) if event.is_folder() => "folder_event",
            QueueEvent::Sync(_) => "file_event",
            QueueEvent::Fs(_) => "fs_change",
            QueueEvent::InteractionNeeded(_) => "interaction_needed",
            QueueEvent::StartNextSync { .. } => "start_next_sync",
        }
    }
}
