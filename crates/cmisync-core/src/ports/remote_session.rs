//! Remote session port (driven/secondary port)
//!
//! The engine talks to the remote document repository exclusively through
//! [`IRemoteSession`]. The wire protocol client lives outside this
//! workspace; tests provide an in-memory fake.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` like every other port. Adapters that can tell
//!   failure classes apart return a [`RemoteError`] inside the `anyhow`
//!   chain, which the resolution strategies downcast to decide between
//!   retrying, asking the user, or forcing a full resync.
//! - [`ChangeLogEntry`] and [`ChangeLogPage`] are port-level DTOs for the
//!   repository change log.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::domain::{ChangeLogToken, ChangeToken, RemoteId, RemoteObject};

// ============================================================================
// Change log DTOs
// ============================================================================

/// Raw change type reported by the repository change log
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RemoteChangeType {
    Created,
    Updated,
    Deleted,
    /// Permissions (ACL) changed; treated like an update
    Security,
}

/// One entry of the repository change log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeLogEntry {
    pub change_type: RemoteChangeType,
    pub object_id: RemoteId,
    pub change_time: Option<DateTime<Utc>>,
}

impl ChangeLogEntry {
    pub fn new(change_type: RemoteChangeType, object_id: RemoteId) -> Self {
        Self {
            change_type,
            object_id,
            change_time: None,
        }
    }

    /// Returns true when both entries describe the same change of the same object
    ///
    /// Used to drop the overlap between consecutive change log pages.
    pub fn same_change(&self, other: &ChangeLogEntry) -> bool {
        self.change_type == other.change_type && self.object_id == other.object_id
    }
}

/// One page of the change log
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeLogPage {
    pub entries: Vec<ChangeLogEntry>,
    /// Whether more pages follow
    pub has_more: bool,
    /// Token to resume after this page
    pub latest_token: Option<ChangeLogToken>,
}

// ============================================================================
// RemoteError
// ============================================================================

/// Classified remote failures
///
/// Adapters should wrap these in `anyhow::Error` so context can be added
/// without losing the class.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RemoteError {
    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    /// The server refused the write because the storage quota is exhausted
    #[error("Quota exceeded: {0}")]
    QuotaExceeded(String),

    /// The server's content scanner rejected the upload
    #[error("Virus detected: {0}")]
    VirusDetected(String),

    /// The change token passed with an update did not match
    #[error("Update conflict: {0}")]
    Conflict(String),

    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Remote error: {0}")]
    Other(String),
}

impl RemoteError {
    /// Returns true for failures that go away by themselves
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RemoteError::Connection(_)
                | RemoteError::Timeout(_)
                | RemoteError::ServiceUnavailable(_)
                | RemoteError::Conflict(_)
        )
    }

    /// Returns true for failures the user has to act upon
    pub fn needs_interaction(&self) -> bool {
        matches!(self, RemoteError::QuotaExceeded(_) | RemoteError::VirusDetected(_))
    }
}

// ============================================================================
// IRemoteSession trait
// ============================================================================

/// Port trait for the remote document repository
#[async_trait::async_trait]
pub trait IRemoteSession: Send + Sync {
    /// Fetches one page of the change log
    ///
    /// # Arguments
    /// * `token` - Resume token from a previous page (None reads from the start)
    /// * `page_size` - Maximum number of entries to return
    async fn get_content_changes(
        &self,
        token: Option<&ChangeLogToken>,
        page_size: u32,
    ) -> anyhow::Result<ChangeLogPage>;

    /// Returns the repository's most recent change log token
    async fn latest_change_log_token(&self) -> anyhow::Result<Option<ChangeLogToken>>;

    /// Fetches an object's properties
    ///
    /// Returns `None` when the object no longer exists.
    async fn get_object(&self, id: &RemoteId) -> anyhow::Result<Option<RemoteObject>>;

    /// Creates a folder under `parent_id`
    async fn create_folder(&self, parent_id: &RemoteId, name: &str) -> anyhow::Result<RemoteObject>;

    /// Creates a document with content under `parent_id`
    async fn create_document(
        &self,
        parent_id: &RemoteId,
        name: &str,
        content: &[u8],
    ) -> anyhow::Result<RemoteObject>;

    /// Downloads the content stream of a document
    async fn get_content(&self, id: &RemoteId) -> anyhow::Result<Vec<u8>>;

    /// Replaces the content stream of a document
    ///
    /// # Arguments
    /// * `expected_token` - When set, the update only succeeds if the object's
    ///   current change token matches; otherwise [`RemoteError::Conflict`]
    async fn set_content(
        &self,
        id: &RemoteId,
        content: &[u8],
        expected_token: Option<&ChangeToken>,
    ) -> anyhow::Result<RemoteObject>;

    /// Renames an object in place
    async fn rename(&self, id: &RemoteId, new_name: &str) -> anyhow::Result<RemoteObject>;

    /// Moves an object to another folder
    async fn move_object(
        &self,
        id: &RemoteId,
        source_parent: &RemoteId,
        target_parent: &RemoteId,
    ) -> anyhow::Result<RemoteObject>;

    /// Deletes an object (folders recursively)
    async fn delete(&self, id: &RemoteId) -> anyhow::Result<()>;
}
