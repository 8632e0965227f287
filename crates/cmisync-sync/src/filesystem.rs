//! Local filesystem adapter (secondary/driven adapter)
//!
//! Implements [`ILocalFileSystem`] using `tokio::fs` for async file operations.
//!
//! ## Design Decisions
//!
//! - **Atomic writes**: write-to-temp + rename, so a crash never leaves a
//!   half-downloaded file at the target path.
//! - **SHA-256**: content checksums are streamed through `sha2` and reported
//!   as lowercase hex under the `sha-256` algorithm name.
//! - **Identity**: on Unix the identity token is `dev:ino`, which survives
//!   renames and moves within one filesystem.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use anyhow::Context;
use chrono::DateTime;
use cmisync_core::domain::{Checksum, LocalIdentity};
use cmisync_core::ports::{FileSystemState, ILocalFileSystem};
use sha2::{Digest, Sha256};
use tokio::io::AsyncReadExt;
use tracing::{debug, instrument};

/// Read buffer used while hashing
const HASH_CHUNK_SIZE: usize = 64 * 1024;

/// Adapter that bridges the [`ILocalFileSystem`] port to the real filesystem.
///
/// This is a zero-sized struct: every operation receives absolute paths
/// resolved by the metadata store.
#[derive(Debug, Clone, Default)]
pub struct LocalFileSystemAdapter;

impl LocalFileSystemAdapter {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn temp_path_for(target: &Path) -> PathBuf {
    let mut p = target.as_os_str().to_owned();
    p.push(".tmp");
    PathBuf::from(p)
}

#[async_trait::async_trait]
impl ILocalFileSystem for LocalFileSystemAdapter {
    #[instrument(skip(self), fields(path = %path.display()))]
    async fn get_state(&self, path: &Path) -> anyhow::Result<FileSystemState> {
        let metadata = match tokio::fs::metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("path not found");
                return Ok(FileSystemState::not_found());
            }
            Err(e) => return Err(e.into()),
        };

        let modified = metadata.modified().ok().and_then(|st| {
            st.duration_since(std::time::UNIX_EPOCH)
                .ok()
                .and_then(|dur| DateTime::from_timestamp(dur.as_secs() as i64, dur.subsec_nanos()))
        });

        let state = FileSystemState {
            exists: true,
            is_dir: metadata.is_dir(),
            size: metadata.len(),
            modified,
            read_only: metadata.permissions().readonly(),
        };
        debug!(is_dir = state.is_dir, size = state.size, "state retrieved");
        Ok(state)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn read_file(&self, path: &Path) -> anyhow::Result<Vec<u8>> {
        let data = tokio::fs::read(path).await?;
        debug!(bytes = data.len(), "file read complete");
        Ok(data)
    }

    #[instrument(skip(self, data), fields(path = %path.display(), bytes = data.len()))]
    async fn write_file(&self, path: &Path, data: &[u8]) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        // Same directory, so the rename stays on one filesystem
        let tmp_path = temp_path_for(path);
        debug!(tmp_path = %tmp_path.display(), "writing to temporary file");
        tokio::fs::write(&tmp_path, data).await?;

        if let Err(e) = tokio::fs::rename(&tmp_path, path).await {
            let _ = tokio::fs::remove_file(&tmp_path).await;
            return Err(e.into());
        }

        debug!("write complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn create_directory(&self, path: &Path) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(path).await?;
        debug!("directory created");
        Ok(())
    }

    #[instrument(skip(self), fields(from = %from.display(), to = %to.display()))]
    async fn rename(&self, from: &Path, to: &Path) -> anyhow::Result<()> {
        if let Some(parent) = to.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::rename(from, to)
            .await
            .with_context(|| format!("Failed to move {} to {}", from.display(), to.display()))?;
        debug!("rename complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn delete(&self, path: &Path) -> anyhow::Result<()> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                debug!("already gone");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        if metadata.is_dir() {
            debug!("removing directory recursively");
            tokio::fs::remove_dir_all(path).await?;
        } else {
            tokio::fs::remove_file(path).await?;
        }
        debug!("delete complete");
        Ok(())
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn compute_checksum(&self, path: &Path) -> anyhow::Result<Checksum> {
        let mut file = tokio::fs::File::open(path).await?;
        let mut hasher = Sha256::new();
        let mut buffer = vec![0u8; HASH_CHUNK_SIZE];

        loop {
            let read = file.read(&mut buffer).await?;
            if read == 0 {
                break;
            }
            hasher.update(&buffer[..read]);
        }

        let hex = format!("{:x}", hasher.finalize());
        debug!(checksum = %hex, "checksum computed");
        Ok(Checksum::sha256(hex)?)
    }

    #[instrument(skip(self), fields(path = %path.display()))]
    async fn identity(&self, path: &Path) -> anyhow::Result<Option<LocalIdentity>> {
        let metadata = match tokio::fs::symlink_metadata(path).await {
            Ok(m) => m,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        identity_of(&metadata)
    }
}

#[cfg(unix)]
fn identity_of(metadata: &std::fs::Metadata) -> anyhow::Result<Option<LocalIdentity>> {
    use std::os::unix::fs::MetadataExt;
    let token = format!("{}:{}", metadata.dev(), metadata.ino());
    Ok(Some(LocalIdentity::new(token)?))
}

#[cfg(not(unix))]
fn identity_of(_metadata: &std::fs::Metadata) -> anyhow::Result<Option<LocalIdentity>> {
    Ok(None)
}
