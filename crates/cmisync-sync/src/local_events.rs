//! Normalization of raw filesystem changes into canonical events
//!
//! Runs on the drain loop because it reads the metadata store. The watcher
//! side only ever produces [`FsChange`] records.
//!
//! | Raw change | Canonical event |
//! |------------|-----------------|
//! | Created    | local `Created` (+ content `Created` for files) |
//! | Changed    | content `Changed`; local `Changed` when only the identity is mapped; `Created` when nothing is mapped |
//! | Deleted    | local `Deleted` (+ content `Deleted`), kind from the mapping |
//! | Renamed    | moved variant with both paths, degraded when an endpoint is outside the root |

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use cmisync_core::domain::{
    ContentChangeType, FileEvent, FolderEvent, FsChange, FsChangeKind, LocalObjectRef,
    MetaDataChangeType, QueueEvent, SyncEvent,
};
use cmisync_core::ports::{ILocalFileSystem, IMetaDataStorage};
use tracing::{debug, instrument, warn};

use crate::queue::{priority, Dispatch, EventQueue, SyncEventHandler};
use crate::SyncError;

pub struct LocalEventTransformer {
    store: Arc<dyn IMetaDataStorage>,
    fs: Arc<dyn ILocalFileSystem>,
    queue: EventQueue,
}

impl LocalEventTransformer {
    pub fn new(
        store: Arc<dyn IMetaDataStorage>,
        fs: Arc<dyn ILocalFileSystem>,
        queue: EventQueue,
    ) -> Self {
        Self { store, fs, queue }
    }

    /// Converts one raw change; `None` means the change carries nothing to sync
    #[instrument(skip(self), fields(kind = ?change.kind, path = %change.path.display()))]
    pub async fn transform(&self, change: &FsChange) -> anyhow::Result<Option<SyncEvent>> {
        match change.kind {
            FsChangeKind::Created => {
                if !self.inside_root(&change.path) {
                    return Ok(None);
                }
                Ok(Some(created_event(&change.path, change.is_dir)?))
            }
            FsChangeKind::Changed => self.changed(&change.path, change.is_dir).await,
            FsChangeKind::Deleted => self.deleted(&change.path).await,
            FsChangeKind::Renamed => {
                let Some(old_path) = change.old_path.as_deref() else {
                    return self.changed(&change.path, change.is_dir).await;
                };
                self.renamed(old_path, &change.path, change.is_dir).await
            }
        }
    }

    fn inside_root(&self, path: &Path) -> bool {
        let root = self.store.sync_root();
        path != root && path.starts_with(root)
    }

    async fn changed(&self, path: &Path, is_dir: bool) -> anyhow::Result<Option<SyncEvent>> {
        if is_dir || !self.inside_root(path) {
            return Ok(None);
        }

        if let Some(mapped) = self.store.get_by_path(path).await? {
            if mapped.is_folder() {
                return Ok(None);
            }
            let event = FileEvent::new(
                MetaDataChangeType::None,
                MetaDataChangeType::None,
                ContentChangeType::Changed,
                ContentChangeType::None,
            )?
            .with_local(LocalObjectRef::simple(path));
            return Ok(Some(event.into()));
        }

        if !self.fs.get_state(path).await?.exists {
            debug!("Changed path vanished, waiting for its delete");
            return Ok(None);
        }

        let identity_mapped = match self.fs.identity(path).await? {
            Some(identity) => self.store.get_by_identity(&identity).await?.is_some(),
            None => false,
        };
        if identity_mapped {
            let event = FileEvent::new(
                MetaDataChangeType::Changed,
                MetaDataChangeType::None,
                ContentChangeType::Changed,
                ContentChangeType::None,
            )?
            .with_local(LocalObjectRef::simple(path));
            return Ok(Some(event.into()));
        }

        Ok(Some(created_event(path, false)?))
    }

    async fn deleted(&self, path: &Path) -> anyhow::Result<Option<SyncEvent>> {
        if !self.inside_root(path) {
            return Ok(None);
        }
        let Some(mapped) = self.store.get_by_path(path).await? else {
            debug!("Deleted path was never mapped");
            return Ok(None);
        };

        let local = LocalObjectRef::simple(path);
        let event: SyncEvent = if mapped.is_folder() {
            FolderEvent::new(MetaDataChangeType::Deleted, MetaDataChangeType::None)?
                .with_local(local)
                .into()
        } else {
            FileEvent::new(
                MetaDataChangeType::Deleted,
                MetaDataChangeType::None,
                ContentChangeType::Deleted,
                ContentChangeType::None,
            )?
            .with_local(local)
            .into()
        };
        Ok(Some(event))
    }

    async fn renamed(
        &self,
        old_path: &Path,
        new_path: &Path,
        is_dir: bool,
    ) -> anyhow::Result<Option<SyncEvent>> {
        match (self.inside_root(old_path), self.inside_root(new_path)) {
            (false, false) => return Ok(None),
            (false, true) => return Ok(Some(created_event(new_path, is_dir)?)),
            (true, false) => return self.deleted(old_path).await,
            (true, true) => {}
        }

        let Some(mapped) = self.store.get_by_path(old_path).await? else {
            if is_dir {
                return Ok(Some(created_event(new_path, true)?));
            }
            return self.changed(new_path, false).await;
        };

        if let (Some(stored), Some(current)) =
            (&mapped.local_identity, self.fs.identity(new_path).await?)
        {
            if *stored != current {
                debug!(remote_id = %mapped.remote_id, "Rename target is a different object");
                return Ok(Some(created_event(new_path, is_dir)?));
            }
        }

        let local = LocalObjectRef::moved(old_path, new_path);
        let event: SyncEvent = if mapped.is_folder() {
            FolderEvent::new(MetaDataChangeType::Moved, MetaDataChangeType::None)?
                .with_local(local)
                .into()
        } else {
            FileEvent::new(
                MetaDataChangeType::Moved,
                MetaDataChangeType::None,
                ContentChangeType::None,
                ContentChangeType::None,
            )?
            .with_local(local)
            .into()
        };
        Ok(Some(event))
    }
}

fn created_event(path: &Path, is_dir: bool) -> anyhow::Result<SyncEvent> {
    let local = LocalObjectRef::simple(path);
    let event: SyncEvent = if is_dir {
        FolderEvent::new(MetaDataChangeType::Created, MetaDataChangeType::None)?
            .with_local(local)
            .into()
    } else {
        FileEvent::new(
            MetaDataChangeType::Created,
            MetaDataChangeType::None,
            ContentChangeType::Created,
            ContentChangeType::None,
        )?
        .with_local(local)
        .into()
    };
    Ok(event)
}

#[async_trait]
impl SyncEventHandler for LocalEventTransformer {
    fn name(&self) -> &'static str {
        "local_event_transformer"
    }

    fn priority(&self) -> i32 {
        priority::LOCAL_TRANSFORMER
    }

    async fn handle(&self, event: QueueEvent) -> Result<Dispatch, SyncError> {
        let QueueEvent::Fs(change) = event else {
            return Ok(Dispatch::NotHandled(event));
        };

        match self.transform(&change).await {
            Ok(Some(event)) => self.queue.push(QueueEvent::sync(event)),
            Ok(None) => {}
            Err(err) => {
                warn!(path = %change.path.display(), error = %format!("{err:#}"), "Failed to normalize local change");
            }
        }
        Ok(Dispatch::Handled)
    }
}
