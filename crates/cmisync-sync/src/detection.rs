//! Situation detectors
//!
//! Each detector classifies one side of a canonical event into a
//! [`SituationType`] by comparing the event with the metadata store. The two
//! results index the solver matrix.
//!
//! ## Design Notes
//!
//! - Detection never fails. Lookup errors degrade to the classification
//!   that cannot lose data, and are logged at `warn`.
//! - The local detector separates rename from move by comparing the
//!   identity of the object's current parent directory with the identity
//!   stored for its mapped parent.
//! - The remote detector separates real content changes from metadata
//!   touches by comparing change tokens and content hashes.

use std::sync::Arc;

use anyhow::anyhow;
use cmisync_core::domain::{
    ContentChangeType, MappedObject, MetaDataChangeType, RemoteObject, SituationType, SyncEvent,
};
use cmisync_core::ports::{IMetaDataStorage, ILocalFileSystem};
use tracing::{debug, instrument, warn};

// ============================================================================
// LocalSituationDetector
// ============================================================================

/// Classifies the local side of an event
pub struct LocalSituationDetector {
    fs: Arc<dyn ILocalFileSystem>,
}

impl LocalSituationDetector {
    pub fn new(fs: Arc<dyn ILocalFileSystem>) -> Self {
        Self { fs }
    }

    #[instrument(skip(self, store, event), fields(tag = ?event.local_change()))]
    pub async fn analyse(&self, store: &dyn IMetaDataStorage, event: &SyncEvent) -> SituationType {
        let situation = match event.local_change() {
            MetaDataChangeType::Created => SituationType::Added,
            MetaDataChangeType::Deleted => SituationType::Removed,
            MetaDataChangeType::Moved => match self.classify_move(store, event).await {
                Ok(situation) => situation,
                Err(err) => {
                    warn!(error = %format!("{err:#}"), "Move classification failed, assuming moved");
                    SituationType::Moved
                }
            },
            MetaDataChangeType::Changed => self.classify_change(store, event).await,
            MetaDataChangeType::None => {
                if !event.is_folder() && event.local_content() != ContentChangeType::None {
                    SituationType::Changed
                } else {
                    SituationType::NoChange
                }
            }
        };
        debug!(%situation, "Local situation");
        situation
    }

    /// Renamed when the current parent directory is the mapped parent
    async fn classify_move(
        &self,
        store: &dyn IMetaDataStorage,
        event: &SyncEvent,
    ) -> anyhow::Result<SituationType> {
        let local = event
            .local_object()
            .ok_or_else(|| anyhow!("moved event without local object"))?;
        let path = local.path();

        let by_identity = match self.fs.identity(path).await? {
            Some(identity) => store.get_by_identity(&identity).await?,
            None => None,
        };
        let mapped = match (by_identity, local.old_path()) {
            (Some(m), _) => m,
            (None, Some(old)) => store
                .get_by_path(old)
                .await?
                .ok_or_else(|| anyhow!("no mapping for {}", old.display()))?,
            (None, None) => return Err(anyhow!("no mapping for {}", path.display())),
        };

        let parent_id = mapped
            .parent_id
            .as_ref()
            .ok_or_else(|| anyhow!("mapped object {} has no parent", mapped.remote_id))?;
        let mapped_parent = store
            .get_by_remote_id(parent_id)
            .await?
            .ok_or_else(|| anyhow!("parent {} is not mapped", parent_id))?;

        let fs_parent = path
            .parent()
            .ok_or_else(|| anyhow!("{} has no parent", path.display()))?;
        let parent_identity = self.fs.identity(fs_parent).await?;

        match (parent_identity, mapped_parent.local_identity) {
            (Some(current), Some(stored)) if current == stored => Ok(SituationType::Renamed),
            _ => Ok(SituationType::Moved),
        }
    }

    /// Renamed when the path is unknown but the identity is mapped
    async fn classify_change(&self, store: &dyn IMetaDataStorage, event: &SyncEvent) -> SituationType {
        let Some(path) = event.local_path() else {
            return SituationType::Changed;
        };

        match self.renamed_without_notification(store, path).await {
            Ok(true) => SituationType::Renamed,
            Ok(false) => SituationType::Changed,
            Err(err) => {
                warn!(path = %path.display(), error = %format!("{err:#}"), "Lookup failed, assuming changed");
                SituationType::Changed
            }
        }
    }

    async fn renamed_without_notification(
        &self,
        store: &dyn IMetaDataStorage,
        path: &std::path::Path,
    ) -> anyhow::Result<bool> {
        if store.get_by_path(path).await?.is_some() {
            return Ok(false);
        }
        match self.fs.identity(path).await? {
            Some(identity) => Ok(store.get_by_identity(&identity).await?.is_some()),
            None => Ok(false),
        }
    }
}

// ============================================================================
// RemoteSituationDetector
// ============================================================================

/// Classifies the remote side of an event
#[derive(Debug, Default, Clone, Copy)]
pub struct RemoteSituationDetector;

impl RemoteSituationDetector {
    pub fn new() -> Self {
        Self
    }

    #[instrument(skip(self, store, event), fields(tag = ?event.remote_change()))]
    pub async fn analyse(&self, store: &dyn IMetaDataStorage, event: &SyncEvent) -> SituationType {
        let situation = match event.remote_change() {
            MetaDataChangeType::None => SituationType::NoChange,
            MetaDataChangeType::Created => SituationType::Added,
            MetaDataChangeType::Deleted => SituationType::Removed,
            MetaDataChangeType::Changed | MetaDataChangeType::Moved => {
                match event.remote_object() {
                    None => SituationType::NoChange,
                    Some(remote) => match store.get_by_remote_id(&remote.id).await {
                        Ok(Some(mapped)) => classify_remote_change(&mapped, remote),
                        Ok(None) => SituationType::Added,
                        Err(err) => {
                            warn!(remote_id = %remote.id, error = %format!("{err:#}"), "Lookup failed, assuming changed");
                            SituationType::Changed
                        }
                    },
                }
            }
        };
        debug!(%situation, "Remote situation");
        situation
    }
}

/// Compares a fresh remote snapshot against the stored mapping
///
/// An unchanged token means nothing happened. Otherwise a new parent means
/// moved, a new name means renamed, and a file whose hash still matches the
/// stored checksum (or a folder) was only touched.
pub fn classify_remote_change(mapped: &MappedObject, remote: &RemoteObject) -> SituationType {
    if remote.change_token.is_some() && remote.change_token == mapped.change_token {
        return SituationType::NoChange;
    }
    if remote.parent_id != mapped.parent_id {
        return SituationType::Moved;
    }
    if remote.name != mapped.name {
        return SituationType::Renamed;
    }
    if remote.kind.is_folder() {
        return SituationType::NoChange;
    }
    match &remote.content_hash {
        Some(hash) if mapped.content_matches(hash) => SituationType::NoChange,
        _ => SituationType::Changed,
    }
}
