pub mod completions;
pub mod config;
pub mod inspect;
pub mod matrix;
pub mod token;

use anyhow::{Context, Result};
use cmisync_cache::{DatabasePool, SqliteMetaDataStorage};
use cmisync_core::config::Config;

/// Opens the configured metadata database read-only
///
/// Returns `Ok(None)` when no database exists yet.
pub async fn open_store(config: &Config) -> Result<Option<SqliteMetaDataStorage>> {
    let db_path = &config.sync.database;
    if !db_path.exists() {
        return Ok(None);
    }
    let pool = DatabasePool::open_existing(db_path)
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    Ok(Some(SqliteMetaDataStorage::new(
        pool.pool().clone(),
        config.sync.root.clone(),
    )))
}
