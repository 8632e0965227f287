//! SQLite implementation of IMetaDataStorage
//!
//! Local paths are never stored. A path is resolved by walking names down
//! from the root mapping (the row without a parent), and a mapped object's
//! path is rebuilt by walking parents up to it. Renaming a folder therefore
//! rewrites a single row.
//!
//! ## Type Mapping
//!
//! | Domain Type        | SQL Type | Strategy |
//! |--------------------|----------|----------|
//! | RemoteId, ChangeToken, LocalIdentity | TEXT | `.as_str()` / `::new()` |
//! | ObjectKind         | TEXT     | `"file"` / `"folder"` |
//! | Checksum           | 2 × TEXT | algorithm and value columns |
//! | DateTime<Utc>      | TEXT     | `to_rfc3339()` / `parse_from_rfc3339()` |
//! | bool, u32, u64     | INTEGER  | widened to `i64` |

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use chrono::{DateTime, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

use cmisync_core::domain::{
    ChangeLogToken, ChangeToken, Checksum, LocalIdentity, MappedObject, ObjectKind, RemoteId,
    RetryCounters,
};
use cmisync_core::ports::IMetaDataStorage;

use crate::CacheError;

const CHANGE_LOG_TOKEN_KEY: &str = "change_log_token";

/// SQLite-based implementation of the metadata storage port
pub struct SqliteMetaDataStorage {
    pool: SqlitePool,
    sync_root: PathBuf,
}

impl SqliteMetaDataStorage {
    pub fn new(pool: SqlitePool, sync_root: impl Into<PathBuf>) -> Self {
        Self {
            pool,
            sync_root: sync_root.into(),
        }
    }

    /// Returns the root mapping (the object without a parent)
    pub async fn root(&self) -> Result<Option<MappedObject>, CacheError> {
        let row = sqlx::query("SELECT * FROM mapped_objects WHERE parent_id IS NULL LIMIT 1")
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mapped_object_from_row).transpose()
    }

    /// Maps the sync root to a remote folder, keeping an existing root row
    ///
    /// # Errors
    /// Returns an error when a different remote folder is already the root
    pub async fn init_root(
        &self,
        remote_id: RemoteId,
        identity: Option<LocalIdentity>,
    ) -> anyhow::Result<MappedObject> {
        if let Some(existing) = self.root().await? {
            if existing.remote_id != remote_id {
                anyhow::bail!(
                    "sync root already mapped to {}, refusing to remap to {}",
                    existing.remote_id,
                    remote_id
                );
            }
            return Ok(existing);
        }

        let name = self
            .sync_root
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "/".to_string());
        let mut root = MappedObject::new(remote_id, None, name, ObjectKind::Folder);
        root.local_identity = identity;
        self.save(&root).await?;
        tracing::info!(root = %self.sync_root.display(), remote_id = %root.remote_id, "Mapped sync root");
        Ok(root)
    }

    /// Counts mapped objects, the root included
    pub async fn count(&self) -> Result<u64, CacheError> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM mapped_objects")
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn child_named(
        &self,
        parent_id: &RemoteId,
        name: &str,
    ) -> Result<Option<MappedObject>, CacheError> {
        let row = sqlx::query("SELECT * FROM mapped_objects WHERE parent_id = ? AND name = ?")
            .bind(parent_id.as_str())
            .bind(name)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(mapped_object_from_row).transpose()
    }
}

// ============================================================================
// Helper functions for type conversion
// ============================================================================

fn kind_to_str(kind: ObjectKind) -> &'static str {
    kind.name()
}

fn kind_from_str(s: &str) -> Result<ObjectKind, CacheError> {
    match s {
        "file" => Ok(ObjectKind::File),
        "folder" => Ok(ObjectKind::Folder),
        other => Err(CacheError::CorruptRow(format!("Unknown object kind: {}", other))),
    }
}

fn parse_optional_datetime(s: Option<String>) -> Result<Option<DateTime<Utc>>, CacheError> {
    match s {
        Some(ref val) if !val.is_empty() => DateTime::parse_from_rfc3339(val)
            .map(|dt| Some(dt.with_timezone(&Utc)))
            .map_err(|e| CacheError::CorruptRow(format!("Failed to parse datetime '{}': {}", val, e))),
        _ => Ok(None),
    }
}

fn counter(row: &SqliteRow, column: &str) -> u32 {
    let value: i64 = row.get(column);
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn mapped_object_from_row(row: &SqliteRow) -> Result<MappedObject, CacheError> {
    let remote_id: String = row.get("remote_id");
    let parent_id: Option<String> = row.get("parent_id");
    let kind: String = row.get("kind");
    let change_token: Option<String> = row.get("change_token");
    let checksum_algorithm: Option<String> = row.get("checksum_algorithm");
    let checksum_value: Option<String> = row.get("checksum_value");
    let content_size: Option<i64> = row.get("content_size");
    let local_identity: Option<String> = row.get("local_identity");

    let checksum = match (checksum_algorithm, checksum_value) {
        (Some(alg), Some(val)) => Some(Checksum::new(alg, val)?),
        _ => None,
    };

    Ok(MappedObject {
        remote_id: RemoteId::new(remote_id)?,
        parent_id: parent_id.map(RemoteId::new).transpose()?,
        name: row.get("name"),
        kind: kind_from_str(&kind)?,
        change_token: change_token.map(ChangeToken::new).transpose()?,
        checksum,
        content_size: content_size.map(|s| s.max(0) as u64),
        local_identity: local_identity.map(LocalIdentity::new).transpose()?,
        last_remote_write: parse_optional_datetime(row.get("last_remote_write"))?,
        last_local_write: parse_optional_datetime(row.get("last_local_write"))?,
        ignored: row.get::<i64, _>("ignored") != 0,
        read_only: row.get::<i64, _>("read_only") != 0,
        retries: RetryCounters {
            upload: counter(row, "upload_retries"),
            download: counter(row, "download_retries"),
            delete: counter(row, "delete_retries"),
        },
    })
}

// ============================================================================
// IMetaDataStorage implementation
// ============================================================================

#[async_trait::async_trait]
impl IMetaDataStorage for SqliteMetaDataStorage {
    fn sync_root(&self) -> &Path {
        &self.sync_root
    }

    async fn get_by_path(&self, path: &Path) -> anyhow::Result<Option<MappedObject>> {
        let Ok(relative) = path.strip_prefix(&self.sync_root) else {
            return Ok(None);
        };
        let Some(mut current) = self.root().await? else {
            return Ok(None);
        };

        for component in relative.components() {
            let Component::Normal(name) = component else {
                return Ok(None);
            };
            let Some(name) = name.to_str() else {
                return Ok(None);
            };
            match self.child_named(&current.remote_id, name).await? {
                Some(child) => current = child,
                None => return Ok(None),
            }
        }
        Ok(Some(current))
    }

    async fn get_by_identity(
        &self,
        identity: &LocalIdentity,
    ) -> anyhow::Result<Option<MappedObject>> {
        let row = sqlx::query("SELECT * FROM mapped_objects WHERE local_identity = ?")
            .bind(identity.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(mapped_object_from_row).transpose()?)
    }

    async fn get_by_remote_id(
        &self,
        remote_id: &RemoteId,
    ) -> anyhow::Result<Option<MappedObject>> {
        let row = sqlx::query("SELECT * FROM mapped_objects WHERE remote_id = ?")
            .bind(remote_id.as_str())
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.as_ref().map(mapped_object_from_row).transpose()?)
    }

    async fn save(&self, object: &MappedObject) -> anyhow::Result<()> {
        // Upsert on the primary key only: sibling-name and identity
        // collisions must surface as errors, not silently replace rows.
        sqlx::query(
            "INSERT INTO mapped_objects \
             (remote_id, parent_id, name, kind, change_token, checksum_algorithm, \
              checksum_value, content_size, local_identity, last_remote_write, \
              last_local_write, ignored, read_only, upload_retries, download_retries, \
              delete_retries) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?) \
             ON CONFLICT(remote_id) DO UPDATE SET \
              parent_id = excluded.parent_id, name = excluded.name, kind = excluded.kind, \
              change_token = excluded.change_token, \
              checksum_algorithm = excluded.checksum_algorithm, \
              checksum_value = excluded.checksum_value, \
              content_size = excluded.content_size, \
              local_identity = excluded.local_identity, \
              last_remote_write = excluded.last_remote_write, \
              last_local_write = excluded.last_local_write, \
              ignored = excluded.ignored, read_only = excluded.read_only, \
              upload_retries = excluded.upload_retries, \
              download_retries = excluded.download_retries, \
              delete_retries = excluded.delete_retries",
        )
        .bind(object.remote_id.as_str())
        .bind(object.parent_id.as_ref().map(|p| p.as_str().to_string()))
        .bind(&object.name)
        .bind(kind_to_str(object.kind))
        .bind(object.change_token.as_ref().map(|t| t.as_str().to_string()))
        .bind(object.checksum.as_ref().map(|c| c.algorithm().to_string()))
        .bind(object.checksum.as_ref().map(|c| c.value().to_string()))
        .bind(object.content_size.map(|s| s as i64))
        .bind(object.local_identity.as_ref().map(|i| i.as_str().to_string()))
        .bind(object.last_remote_write.map(|dt| dt.to_rfc3339()))
        .bind(object.last_local_write.map(|dt| dt.to_rfc3339()))
        .bind(object.ignored as i64)
        .bind(object.read_only as i64)
        .bind(i64::from(object.retries.upload))
        .bind(i64::from(object.retries.download))
        .bind(i64::from(object.retries.delete))
        .execute(&self.pool)
        .await?;

        tracing::trace!(remote_id = %object.remote_id, name = %object.name, "Saved mapped object");
        Ok(())
    }

    async fn remove_subtree(&self, remote_id: &RemoteId) -> anyhow::Result<u64> {
        let result = sqlx::query(
            "WITH RECURSIVE subtree(id) AS ( \
                SELECT remote_id FROM mapped_objects WHERE remote_id = ? \
                UNION \
                SELECT m.remote_id FROM mapped_objects m JOIN subtree s ON m.parent_id = s.id \
             ) \
             DELETE FROM mapped_objects WHERE remote_id IN (SELECT id FROM subtree)",
        )
        .bind(remote_id.as_str())
        .execute(&self.pool)
        .await?;

        let removed = result.rows_affected();
        tracing::debug!(remote_id = %remote_id, removed, "Removed mapped subtree");
        Ok(removed)
    }

    async fn local_path_of(&self, object: &MappedObject) -> anyhow::Result<Option<PathBuf>> {
        let mut names = Vec::new();
        let mut visited = HashSet::new();
        let mut current = object.clone();

        while let Some(parent_id) = current.parent_id.clone() {
            if !visited.insert(current.remote_id.clone()) {
                tracing::warn!(remote_id = %object.remote_id, "Parent cycle in metadata store");
                return Ok(None);
            }
            names.push(current.name.clone());
            match self.get_by_remote_id(&parent_id).await? {
                Some(parent) => current = parent,
                None => return Ok(None),
            }
        }

        let mut path = self.sync_root.clone();
        for name in names.iter().rev() {
            path.push(name);
        }
        Ok(Some(path))
    }

    async fn children(&self, parent_id: &RemoteId) -> anyhow::Result<Vec<MappedObject>> {
        let rows = sqlx::query("SELECT * FROM mapped_objects WHERE parent_id = ? ORDER BY name")
            .bind(parent_id.as_str())
            .fetch_all(&self.pool)
            .await?;

        let children = rows
            .iter()
            .map(mapped_object_from_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(children)
    }

    async fn change_log_token(&self) -> anyhow::Result<Option<ChangeLogToken>> {
        let value: Option<String> = sqlx::query_scalar("SELECT value FROM kv WHERE key = ?")
            .bind(CHANGE_LOG_TOKEN_KEY)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value.map(ChangeLogToken::new).transpose()?)
    }

    async fn set_change_log_token(&self, token: &ChangeLogToken) -> anyhow::Result<()> {
        sqlx::query(
            "INSERT INTO kv (key, value) VALUES (?, ?) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(CHANGE_LOG_TOKEN_KEY)
        .bind(token.as_str())
        .execute(&self.pool)
        .await?;

        tracing::debug!(token = %token, "Persisted change log token");
        Ok(())
    }
}
