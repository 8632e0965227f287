//! Domain types for the synchronization engine
//!
//! - Validated newtypes for identifiers, tokens and checksums
//! - The canonical event model and queue records
//! - Situation classification
//! - Mapped objects (persisted metadata rows)
//! - Remote object snapshots
//! - User-actionable interaction details
//! - Domain-specific error types

pub mod errors;
pub mod event;
pub mod interaction;
pub mod mapped_object;
pub mod newtypes;
pub mod remote_object;
pub mod situation;

pub use errors::DomainError;
pub use event::{
    ContentChangeType, FileEvent, FolderEvent, FsChange, FsChangeKind, InteractionNeeded,
    LocalObjectRef, MetaDataChangeType, QueueEvent, SyncEvent,
};
pub use interaction::{InteractionDetail, InteractionKind, Severity};
pub use mapped_object::{MappedObject, RetryCounters, RetryOperation};
pub use newtypes::*;
pub use remote_object::{ObjectKind, RemoteObject};
pub use situation::SituationType;
