//! SQLite connection pool for the metadata store
//!
//! File databases run in WAL mode so the CLI can read while the engine
//! writes. The schema is versioned through `PRAGMA user_version`: each entry
//! of [`MIGRATIONS`] runs once, in order, inside its own transaction.

use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions};

use crate::CacheError;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Ordered schema migrations; the schema version is the number applied
const MIGRATIONS: &[&str] = &[include_str!("migrations/0001_initial.sql")];

/// Schema version this build reads and writes
pub const SCHEMA_VERSION: i64 = MIGRATIONS.len() as i64;

pub struct DatabasePool {
    pool: SqlitePool,
}

impl DatabasePool {
    /// Opens (creating if needed) the database at `db_path` and migrates it
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` when the file or its directory cannot
    /// be created or opened, `CacheError::MigrationFailed` when the schema
    /// cannot be brought to [`SCHEMA_VERSION`].
    pub async fn new(db_path: &Path) -> Result<Self, CacheError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                CacheError::ConnectionFailed(format!(
                    "Failed to create database directory {}: {e}",
                    parent.display()
                ))
            })?;
        }

        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = connect(options, 5, db_path).await?;

        let applied = migrate(&pool).await?;
        tracing::info!(path = %db_path.display(), applied, version = SCHEMA_VERSION, "Metadata database ready");

        Ok(Self { pool })
    }

    /// Creates a private in-memory database, used by tests
    ///
    /// Limited to one connection: every SQLite in-memory connection is its
    /// own database.
    pub async fn in_memory() -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
            CacheError::ConnectionFailed(format!("Failed to create in-memory database: {e}"))
        })?;
        let pool = connect(options, 1, Path::new(":memory:")).await?;
        migrate(&pool).await?;
        Ok(Self { pool })
    }

    /// Opens an existing database read-only, without creating or migrating it
    ///
    /// # Errors
    ///
    /// `CacheError::ConnectionFailed` if the file is missing or unreadable,
    /// `CacheError::MigrationFailed` if its schema version differs from
    /// [`SCHEMA_VERSION`].
    pub async fn open_existing(db_path: &Path) -> Result<Self, CacheError> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(false)
            .read_only(true)
            .busy_timeout(BUSY_TIMEOUT);
        let pool = connect(options, 1, db_path).await?;

        let version = user_version(&pool).await?;
        if version != SCHEMA_VERSION {
            return Err(CacheError::MigrationFailed(format!(
                "{} has schema version {version}, expected {SCHEMA_VERSION}",
                db_path.display()
            )));
        }
        Ok(Self { pool })
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Schema version recorded in the database
    pub async fn schema_version(&self) -> Result<i64, CacheError> {
        user_version(&self.pool).await
    }
}

async fn connect(
    options: SqliteConnectOptions,
    max_connections: u32,
    db_path: &Path,
) -> Result<SqlitePool, CacheError> {
    SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect_with(options)
        .await
        .map_err(|e| {
            CacheError::ConnectionFailed(format!(
                "Failed to open database at {}: {e}",
                db_path.display()
            ))
        })
}

async fn user_version(pool: &SqlitePool) -> Result<i64, CacheError> {
    Ok(sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await?)
}

/// Applies pending migrations and returns how many ran
async fn migrate(pool: &SqlitePool) -> Result<usize, CacheError> {
    let current = user_version(pool).await?;
    if current > SCHEMA_VERSION {
        return Err(CacheError::MigrationFailed(format!(
            "database schema version {current} is newer than supported {SCHEMA_VERSION}"
        )));
    }

    let pending = MIGRATIONS.iter().enumerate().skip(current as usize);
    let mut applied = 0;
    for (index, sql) in pending {
        let version = index as i64 + 1;
        let fail = |e: sqlx::Error| {
            CacheError::MigrationFailed(format!("Migration {version} failed: {e}"))
        };

        let mut tx = pool.begin().await.map_err(fail)?;
        sqlx::raw_sql(sql).execute(&mut *tx).await.map_err(fail)?;
        // PRAGMA does not take bind parameters
        sqlx::raw_sql(&format!("PRAGMA user_version = {version}"))
            .execute(&mut *tx)
            .await
            .map_err(fail)?;
        tx.commit().await.map_err(fail)?;

        tracing::debug!(version, "Applied schema migration");
        applied += 1;
    }
    Ok(applied)
}
