//! Conflict-copy naming
//!
//! When both sides changed a file's content, the local version is moved
//! aside as `name (conflicted copy YYYY-MM-DD xxxxxxxx).ext` and the remote
//! version takes the original path.

use std::path::{Path, PathBuf};

use chrono::{NaiveDate, Utc};
use cmisync_core::ports::ILocalFileSystem;
use uuid::Uuid;

use super::StrategyError;

/// Builds a conflict-copy file name
///
/// Leading dots (hidden files) are part of the stem, not an extension.
pub fn conflict_copy_name(original_name: &str, date: NaiveDate, suffix: &str) -> String {
    let date = date.format("%Y-%m-%d");
    match original_name.rfind('.') {
        Some(dot_pos) if dot_pos > 0 => {
            let stem = &original_name[..dot_pos];
            let ext = &original_name[dot_pos..];
            format!("{stem} (conflicted copy {date} {suffix}){ext}")
        }
        _ => format!("{original_name} (conflicted copy {date} {suffix})"),
    }
}

/// Generates conflict-copy paths that do not exist yet
pub struct ConflictNamer;

impl ConflictNamer {
    /// Returns a sibling path of `original` suitable for the conflict copy
    ///
    /// # Errors
    /// Returns an error if `original` has no file name or the filesystem
    /// cannot be queried.
    pub async fn unique_path(
        fs: &dyn ILocalFileSystem,
        original: &Path,
    ) -> anyhow::Result<PathBuf> {
        let name = original
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| StrategyError::UnusableName(original.to_path_buf()))?;
        let today = Utc::now().date_naive();

        for _ in 0..8 {
            let suffix = Uuid::new_v4().simple().to_string();
            let candidate = original.with_file_name(conflict_copy_name(name, today, &suffix[..8]));
            if !fs.get_state(&candidate).await?.exists {
                return Ok(candidate);
            }
        }

        // Eight 32-bit collisions in a row; fall back to the full UUID
        let full = Uuid::new_v4().simple().to_string();
        Ok(original.with_file_name(conflict_copy_name(name, today, &full)))
    }
}
