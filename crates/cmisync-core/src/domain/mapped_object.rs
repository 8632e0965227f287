//! Mapped object: the persisted link between a local and a remote object
//!
//! One row of the metadata store. It records what both sides looked like the
//! last time they were known to agree, which is what the situation detectors
//! compare fresh observations against.
//!
//! ## Lifecycle
//!
//! ```text
//!   Added (either side) ──► created
//!   Changed / Renamed / Moved ──► updated in place
//!   Removed ──► deleted together with its subtree
//! ```
//!
//! ## Invariants
//!
//! - `remote_id` is unique across the store.
//! - `name` is unique among siblings sharing `parent_id`.
//! - `local_identity` never changes across a rename or move of the same
//!   underlying object.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ChangeToken, Checksum, LocalIdentity, RemoteId};
use super::remote_object::{ObjectKind, RemoteObject};

// ============================================================================
// RetryCounters
// ============================================================================

/// Operation kinds that keep their own retry counter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RetryOperation {
    Upload,
    Download,
    Delete,
}

/// Per-operation retry counters persisted with a mapped object
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounters {
    pub upload: u32,
    pub download: u32,
    pub delete: u32,
}

impl RetryCounters {
    pub fn get(&self, op: RetryOperation) -> u32 {
        match op {
            RetryOperation::Upload => self.upload,
            RetryOperation::Download => self.download,
            RetryOperation::Delete => self.delete,
        }
    }

    /// Increments the counter for `op`, returning the new value
    pub fn record(&mut self, op: RetryOperation) -> u32 {
        let counter = match op {
            RetryOperation::Upload => &mut self.upload,
            RetryOperation::Download => &mut self.download,
            RetryOperation::Delete => &mut self.delete,
        };
        *counter = counter.saturating_add(1);
        *counter
    }

    pub fn reset(&mut self, op: RetryOperation) {
        match op {
            RetryOperation::Upload => self.upload = 0,
            RetryOperation::Download => self.download = 0,
            RetryOperation::Delete => self.delete = 0,
        }
    }
}

// ============================================================================
// MappedObject
// ============================================================================

/// Persisted metadata for one synchronized object
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappedObject {
    /// Remote identifier (unique)
    pub remote_id: RemoteId,
    /// Remote identifier of the parent folder (None for the sync root)
    pub parent_id: Option<RemoteId>,
    /// Display name, shared by both sides
    pub name: String,
    pub kind: ObjectKind,
    /// Change token observed after the last successful sync
    pub change_token: Option<ChangeToken>,
    /// Checksum of the last synchronized content (files only)
    pub checksum: Option<Checksum>,
    /// Content size in bytes at the last sync (files only)
    pub content_size: Option<u64>,
    /// Stable identity of the local object
    pub local_identity: Option<LocalIdentity>,
    pub last_remote_write: Option<DateTime<Utc>>,
    pub last_local_write: Option<DateTime<Utc>>,
    /// Excluded from synchronization, together with its subtree
    pub ignored: bool,
    pub read_only: bool,
    pub retries: RetryCounters,
}

impl MappedObject {
    /// Creates a mapped object with only structural fields set
    pub fn new(
        remote_id: RemoteId,
        parent_id: Option<RemoteId>,
        name: impl Into<String>,
        kind: ObjectKind,
    ) -> Self {
        Self {
            remote_id,
            parent_id,
            name: name.into(),
            kind,
            change_token: None,
            checksum: None,
            content_size: None,
            local_identity: None,
            last_remote_write: None,
            last_local_write: None,
            ignored: false,
            read_only: false,
            retries: RetryCounters::default(),
        }
    }

    /// Creates a mapped object mirroring a remote snapshot
    ///
    /// The checksum is seeded from the remote hash; callers that just wrote
    /// the content locally replace it with the local checksum.
    pub fn from_remote(remote: &RemoteObject) -> Self {
        let mut mapped = Self::new(
            remote.id.clone(),
            remote.parent_id.clone(),
            remote.name.clone(),
            remote.kind,
        );
        mapped.checksum = remote.content_hash.clone();
        mapped.apply_remote(remote);
        mapped
    }

    /// Copies name, parent, token and size from a remote snapshot
    ///
    /// The stored checksum always describes the last synchronized local
    /// content, so it is left untouched here.
    pub fn apply_remote(&mut self, remote: &RemoteObject) {
        self.parent_id = remote.parent_id.clone();
        self.name = remote.name.clone();
        self.change_token = remote.change_token.clone();
        if remote.content_size.is_some() {
            self.content_size = remote.content_size;
        }
        self.read_only = remote.read_only;
        self.last_remote_write = remote.last_modified.or(Some(Utc::now()));
    }

    pub fn with_identity(mut self, identity: LocalIdentity) -> Self {
        self.local_identity = Some(identity);
        self
    }

    pub fn with_checksum(mut self, checksum: Checksum) -> Self {
        self.checksum = Some(checksum);
        self
    }

    pub fn with_change_token(mut self, token: ChangeToken) -> Self {
        self.change_token = Some(token);
        self
    }

    pub fn is_folder(&self) -> bool {
        self.kind.is_folder()
    }

    /// Records a local write of `checksum` at the current time
    pub fn record_local_write(&mut self, checksum: Option<Checksum>, size: Option<u64>) {
        if checksum.is_some() {
            self.checksum = checksum;
        }
        if size.is_some() {
            self.content_size = size;
        }
        self.last_local_write = Some(Utc::now());
    }

    /// Returns true when `other` is known to match the stored checksum
    ///
    /// Unknown (missing or incomparable) checksums never match.
    pub fn content_matches(&self, other: &Checksum) -> bool {
        self.checksum
            .as_ref()
            .and_then(|stored| stored.same_content(other))
            .unwrap_or(false)
    }
}
