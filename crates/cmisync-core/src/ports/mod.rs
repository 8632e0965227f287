//! Port definitions (hexagonal architecture interfaces)
//!
//! Ports are the interfaces the decision engine depends on; their
//! implementations live in adapter crates or in tests.
//!
//! ## Ports Overview
//!
//! - [`IMetaDataStorage`] - Persisted local/remote mapping and resume token
//! - [`IRemoteSession`] - Remote repository change log and object operations
//! - [`ILocalFileSystem`] - Local filesystem operations
//! - [`INotificationService`] - Surfacing user-actionable problems

pub mod local_filesystem;
pub mod metadata_storage;
pub mod notification;
pub mod remote_session;

pub use local_filesystem::{FileSystemState, ILocalFileSystem};
pub use metadata_storage::IMetaDataStorage;
pub use notification::{INotificationService, Notification, NotificationPriority};
pub use remote_session::{
    ChangeLogEntry, ChangeLogPage, IRemoteSession, RemoteChangeType, RemoteError,
};
