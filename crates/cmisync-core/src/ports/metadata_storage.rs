//! Metadata storage port (driven/secondary port)
//!
//! Persists the mapping between local objects and remote objects, plus the
//! resume token of the remote change log.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because storage errors are adapter-specific
//!   (SQLite, in-memory, ...) and don't need domain-level classification.
//! - Local paths are never stored. The store knows the sync root and walks
//!   mapped names from the root mapping (the object without a parent), so a
//!   folder rename only touches a single row.
//! - Only the drain loop of the owning tree writes; readers tolerate
//!   eventually-consistent results.

use std::path::{Path, PathBuf};

use crate::domain::{ChangeLogToken, LocalIdentity, MappedObject, RemoteId};

/// Port trait for persistent synchronization metadata
#[async_trait::async_trait]
pub trait IMetaDataStorage: Send + Sync {
    /// Absolute path of the synchronized tree's root
    fn sync_root(&self) -> &Path;

    /// Looks up the mapped object at an absolute local path
    ///
    /// Returns `None` when the path is outside the root or not mapped.
    async fn get_by_path(&self, path: &Path) -> anyhow::Result<Option<MappedObject>>;

    /// Looks up the mapped object with a stable local identity
    async fn get_by_identity(
        &self,
        identity: &LocalIdentity,
    ) -> anyhow::Result<Option<MappedObject>>;

    /// Looks up the mapped object with a remote identifier
    async fn get_by_remote_id(&self, remote_id: &RemoteId)
        -> anyhow::Result<Option<MappedObject>>;

    /// Inserts or updates a mapped object (keyed by remote id)
    ///
    /// # Errors
    /// Returns an error when the object would violate sibling-name or
    /// identity uniqueness
    async fn save(&self, object: &MappedObject) -> anyhow::Result<()>;

    /// Removes a mapped object and every mapped descendant
    ///
    /// # Returns
    /// The number of rows removed
    async fn remove_subtree(&self, remote_id: &RemoteId) -> anyhow::Result<u64>;

    /// Computes the absolute local path of a mapped object
    ///
    /// Returns `None` when the chain of parents does not reach the root.
    async fn local_path_of(&self, object: &MappedObject) -> anyhow::Result<Option<PathBuf>>;

    /// Lists the direct children of a mapped folder
    async fn children(&self, parent_id: &RemoteId) -> anyhow::Result<Vec<MappedObject>>;

    /// Returns the persisted change log resume token
    async fn change_log_token(&self) -> anyhow::Result<Option<ChangeLogToken>>;

    /// Persists the change log resume token
    async fn set_change_log_token(&self, token: &ChangeLogToken) -> anyhow::Result<()>;
}
