//! Local filesystem port (driven/secondary port)
//!
//! The narrow set of filesystem operations the resolution strategies and the
//! local event transformer need: stat, read, atomic write, directory
//! creation, rename, delete, checksum and stable identity.
//!
//! ## Design Notes
//!
//! - Uses `anyhow::Result` because filesystem errors are adapter-specific.
//!   Adapters keep the underlying `std::io::Error` in the chain so callers
//!   can classify transient failures by downcasting.
//! - Watching is not part of this port; the OS watcher lives next to the
//!   event queue it feeds.

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::domain::newtypes::{Checksum, LocalIdentity};

// ============================================================================
// FileSystemState
// ============================================================================

/// Snapshot of a path on the local filesystem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileSystemState {
    /// Whether anything exists at the path
    pub exists: bool,
    /// Whether the path is a directory
    pub is_dir: bool,
    /// Size in bytes (0 for directories or missing paths)
    pub size: u64,
    /// Last modification time
    pub modified: Option<DateTime<Utc>>,
    /// Whether the file is read-only for the current user
    pub read_only: bool,
}

impl FileSystemState {
    /// Returns a state representing a non-existent path
    pub fn not_found() -> Self {
        Self {
            exists: false,
            is_dir: false,
            size: 0,
            modified: None,
            read_only: false,
        }
    }

    /// Returns true if the path exists and is a regular file
    pub fn is_file(&self) -> bool {
        self.exists && !self.is_dir
    }

    /// Returns true if the path exists and is a directory
    pub fn is_directory(&self) -> bool {
        self.exists && self.is_dir
    }
}

// ============================================================================
// ILocalFileSystem trait
// ============================================================================

/// Port trait for local filesystem operations
///
/// All paths are absolute paths inside the synchronized tree.
#[async_trait::async_trait]
pub trait ILocalFileSystem: Send + Sync {
    /// Gets the current state of a file or directory
    ///
    /// Returns [`FileSystemState::not_found`] for missing paths rather than
    /// an error.
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState>;

    /// Reads the entire contents of a file
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be read
    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>>;

    /// Replaces the contents of a file atomically
    ///
    /// The data is written to a temporary sibling and renamed over the
    /// target, so readers never observe a partial file. Parent directories
    /// are created when missing.
    async fn write_file(&self, path: &Path, data: &[u8]) -> anyhow::Result<()>;

    /// Creates a directory and all missing parents
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()>;

    /// Renames or moves a file or directory
    ///
    /// # Arguments
    /// * `from` - Current path
    /// * `to` - Target path (its parent must exist)
    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()>;

    /// Deletes a file, or a directory recursively
    ///
    /// Deleting a missing path succeeds.
    async fn delete(&self, path: &Path) -> anyhow::Result<()>;

    /// Computes the content checksum of a file
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be read
    async fn compute_checksum(&self, path: &Path) -> anyhow::Result<Checksum>;

    /// Returns the stable identity of the object at `path`
    ///
    /// The identity survives renames and moves within the same filesystem.
    /// Returns `None` when nothing exists at the path.
    async fn identity(&self, path: &Path) -> anyhow::Result<Option<LocalIdentity>>;
}
