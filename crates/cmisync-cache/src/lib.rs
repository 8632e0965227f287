//! CmisSync Cache - Metadata persistence
//!
//! SQLite-backed storage for:
//! - Mapped objects (the link between local and remote objects)
//! - The remote change log resume token
//!
//! ## Architecture
//!
//! This crate implements the `IMetaDataStorage` port from `cmisync-core`
//! using SQLite as the storage backend. It is a driven (secondary) adapter
//! in the hexagonal architecture.
//!
//! ## Key Components
//!
//! - [`DatabasePool`] - Connection pool with migration support
//! - [`SqliteMetaDataStorage`] - `IMetaDataStorage` implementation
//! - [`CacheError`] - Error types for cache operations
//!
//! ## Usage
//!
//! ```no_run
//! use std::path::Path;
//! use cmisync_cache::{DatabasePool, SqliteMetaDataStorage};
//!
//! # async fn example() -> anyhow::Result<()> {
//! let pool = DatabasePool::new(Path::new("/home/user/.local/share/cmisync/metadata.db")).await?;
//! let store = SqliteMetaDataStorage::new(pool.pool().clone(), "/home/user/CmisSync");
//! // Use store as IMetaDataStorage...
//! # Ok(())
//! # }
//! ```

pub mod pool;
pub mod storage;

pub use pool::DatabasePool;
pub use storage::SqliteMetaDataStorage;

/// Errors that can occur during cache operations
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    /// Failed to establish a database connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// A database query failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Schema migration failed
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A stored value does not convert back into a domain type
    #[error("Corrupt row: {0}")]
    CorruptRow(String),
}

impl From<sqlx::Error> for CacheError {
    fn from(e: sqlx::Error) -> Self {
        CacheError::QueryFailed(e.to_string())
    }
}

impl From<cmisync_core::domain::DomainError> for CacheError {
    fn from(e: cmisync_core::domain::DomainError) -> Self {
        CacheError::CorruptRow(e.to_string())
    }
}
