//! Remote object snapshot
//!
//! A port-level view of one object in the remote repository, as returned by
//! the remote session when an object is fetched. Canonical events carry it
//! so the detectors can compare it against the stored mapping.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::{ChangeToken, Checksum, RemoteId};

/// Kind of a synchronized object
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectKind {
    /// A regular file (a document in the remote repository)
    File,
    /// A folder
    Folder,
}

impl ObjectKind {
    /// Returns true for folders
    pub fn is_folder(self) -> bool {
        matches!(self, ObjectKind::Folder)
    }

    /// Stable lowercase name
    pub fn name(self) -> &'static str {
        match self {
            ObjectKind::File => "file",
            ObjectKind::Folder => "folder",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Snapshot of a remote object's properties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteObject {
    /// Object identifier
    pub id: RemoteId,
    /// Identifier of the parent folder (None for the repository root)
    pub parent_id: Option<RemoteId>,
    /// Object name
    pub name: String,
    /// File or folder
    pub kind: ObjectKind,
    /// Current change token, if the server exposes one
    pub change_token: Option<ChangeToken>,
    /// Content stream hash (documents only)
    pub content_hash: Option<Checksum>,
    /// Content stream length in bytes (documents only)
    pub content_size: Option<u64>,
    /// Last modification date on the server
    pub last_modified: Option<DateTime<Utc>>,
    /// Whether the current user may not modify the object
    pub read_only: bool,
}

impl RemoteObject {
    /// Creates a folder snapshot with only the structural fields set
    pub fn folder(id: RemoteId, parent_id: Option<RemoteId>, name: impl Into<String>) -> Self {
        Self {
            id,
            parent_id,
            name: name.into(),
            kind: ObjectKind::Folder,
            change_token: None,
            content_hash: None,
            content_size: None,
            last_modified: None,
            read_only: false,
        }
    }

    /// Creates a document snapshot with only the structural fields set
    pub fn document(id: RemoteId, parent_id: Option<RemoteId>, name: impl Into<String>) -> Self {
        Self {
            kind: ObjectKind::File,
            ..Self::folder(id, parent_id, name)
        }
    }

    /// Sets the change token
    pub fn with_change_token(mut self, token: ChangeToken) -> Self {
        self.change_token = Some(token);
        self
    }

    /// Sets the content hash and size
    pub fn with_content(mut self, hash: Checksum, size: u64) -> Self {
        self.content_hash = Some(hash);
        self.content_size = Some(size);
        self
    }
}
