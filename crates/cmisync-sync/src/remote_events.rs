//! Remote change log polling
//!
//! [`RemoteChangePoller`] reacts to `StartNextSync { full_sync: false }`,
//! pages through the repository change log from the persisted resume token
//! and queues one canonical event per relevant entry.
//!
//! ## Paging
//!
//! ```text
//! token ──► page 1 [A, B, X] ──► persist token₁
//!          page 2 [X, C]    ──► X duplicates the seam, dropped ──► persist token₂
//! ```
//!
//! The token is persisted after every page, so an interrupted poll resumes
//! at the last page seam. Delivery is at-least-once across runs.
//!
//! An entry that cannot be converted (its local copy is unreadable, a lookup
//! fails) is skipped and a full crawl is requested once the poll ends, so a
//! single bad entry never pins the token.
//!
//! Without a stored token the poller records the current server token as
//! the anchor and requests a full crawl instead.

use std::sync::Arc;

use async_trait::async_trait;
use cmisync_core::domain::{
    ContentChangeType, FileEvent, FolderEvent, LocalObjectRef, MappedObject, MetaDataChangeType,
    QueueEvent, RemoteObject, SyncEvent,
};
use cmisync_core::ports::{
    ChangeLogEntry, ILocalFileSystem, IMetaDataStorage, IRemoteSession, RemoteChangeType,
};
use tracing::{debug, info, instrument, warn};

use crate::queue::{priority, Dispatch, EventQueue, SyncEventHandler};
use crate::SyncError;

/// Default number of change log entries requested per page
pub const DEFAULT_PAGE_SIZE: u32 = 100;

pub struct RemoteChangePoller {
    session: Arc<dyn IRemoteSession>,
    store: Arc<dyn IMetaDataStorage>,
    fs: Arc<dyn ILocalFileSystem>,
    queue: EventQueue,
    page_size: u32,
}

/// Local side of a mapped object as seen while polling
struct LocalTags {
    change: MetaDataChangeType,
    content: ContentChangeType,
    object: Option<LocalObjectRef>,
}

impl RemoteChangePoller {
    pub fn new(
        session: Arc<dyn IRemoteSession>,
        store: Arc<dyn IMetaDataStorage>,
        fs: Arc<dyn ILocalFileSystem>,
        queue: EventQueue,
    ) -> Self {
        Self {
            session,
            store,
            fs,
            queue,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    pub fn with_page_size(mut self, page_size: u32) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// Runs one polling pass
    ///
    /// # Returns
    /// The number of canonical events queued
    #[instrument(skip(self), fields(page_size = self.page_size))]
    pub async fn poll(&self) -> anyhow::Result<usize> {
        let Some(mut token) = self.store.change_log_token().await? else {
            if let Some(latest) = self.session.latest_change_log_token().await? {
                self.store.set_change_log_token(&latest).await?;
            }
            info!("No change log token yet, requesting full sync");
            self.queue.push(QueueEvent::StartNextSync { full_sync: true });
            return Ok(0);
        };

        if self.session.latest_change_log_token().await?.as_ref() == Some(&token) {
            debug!(token = %token, "Remote unchanged since last poll");
            return Ok(0);
        }

        let mut last_delivered: Option<ChangeLogEntry> = None;
        let mut queued = 0;
        let mut skipped = 0;
        let mut pages = 0;

        loop {
            let page = self
                .session
                .get_content_changes(Some(&token), self.page_size)
                .await?;
            pages += 1;

            let mut entries = page.entries.into_iter().peekable();
            if let (Some(previous), Some(first)) = (&last_delivered, entries.peek()) {
                if first.same_change(previous) {
                    debug!(object_id = %first.object_id, "Dropping duplicate at page seam");
                    entries.next();
                }
            }

            for entry in entries {
                match self.transform(&entry).await {
                    Ok(Some(event)) => {
                        self.queue.push(QueueEvent::sync(event));
                        queued += 1;
                    }
                    Ok(None) => {}
                    Err(err) => {
                        warn!(
                            object_id = %entry.object_id,
                            change = ?entry.change_type,
                            error = %format!("{err:#}"),
                            "Skipping change log entry"
                        );
                        skipped += 1;
                    }
                }
                last_delivered = Some(entry);
            }

            let advanced = page.latest_token.as_ref().is_some_and(|next| *next != token);
            if let Some(next) = page.latest_token {
                self.store.set_change_log_token(&next).await?;
                token = next;
            }

            if !page.has_more {
                break;
            }
            if !advanced {
                warn!(token = %token, "Change log reports more pages but the token did not advance");
                break;
            }
        }

        if skipped > 0 {
            warn!(skipped, "Change log entries skipped, requesting full sync");
            self.queue.push(QueueEvent::StartNextSync { full_sync: true });
        }
        info!(pages, queued, skipped, "Change log polled");
        Ok(queued)
    }

    /// Converts one change log entry into a canonical event
    ///
    /// Returns `None` for deletes of unknown objects and for objects that
    /// disappeared before they could be fetched.
    pub async fn transform(&self, entry: &ChangeLogEntry) -> anyhow::Result<Option<SyncEvent>> {
        let mapped = self.store.get_by_remote_id(&entry.object_id).await?;

        if entry.change_type == RemoteChangeType::Deleted {
            let Some(mapped) = mapped else {
                debug!(object_id = %entry.object_id, "Delete of unmapped object");
                return Ok(None);
            };
            let tombstone = tombstone(&mapped);
            let local = self.local_tags(&mapped).await?;
            return Ok(Some(build_event(
                &tombstone,
                local,
                MetaDataChangeType::Deleted,
                ContentChangeType::Deleted,
            )?));
        }

        let Some(remote) = self.session.get_object(&entry.object_id).await? else {
            debug!(object_id = %entry.object_id, "Changed object no longer exists");
            return Ok(None);
        };

        let event = match mapped {
            None => build_event(
                &remote,
                LocalTags::none(),
                MetaDataChangeType::Created,
                ContentChangeType::Created,
            )?,
            Some(mapped) => {
                let content = remote_content_change(&mapped, &remote);
                let local = self.local_tags(&mapped).await?;
                build_event(&remote, local, MetaDataChangeType::Changed, content)?
            }
        };
        Ok(Some(event))
    }

    /// Inspects the local copy of a mapped object
    async fn local_tags(&self, mapped: &MappedObject) -> anyhow::Result<LocalTags> {
        let Some(path) = self.store.local_path_of(mapped).await? else {
            return Ok(LocalTags::none());
        };

        let state = self.fs.get_state(&path).await?;
        let mut tags = LocalTags {
            change: MetaDataChangeType::None,
            content: ContentChangeType::None,
            object: Some(LocalObjectRef::simple(&path)),
        };

        if !state.exists {
            tags.change = MetaDataChangeType::Deleted;
            if !mapped.is_folder() {
                tags.content = ContentChangeType::Deleted;
            }
        } else if state.is_file() && !mapped.is_folder() {
            let checksum = self.fs.compute_checksum(&path).await?;
            if !mapped.content_matches(&checksum) {
                tags.change = MetaDataChangeType::Changed;
                tags.content = ContentChangeType::Changed;
            }
        }
        Ok(tags)
    }
}

impl LocalTags {
    fn none() -> Self {
        Self {
            change: MetaDataChangeType::None,
            content: ContentChangeType::None,
            object: None,
        }
    }
}

/// Snapshot standing in for an object the server no longer has
fn tombstone(mapped: &MappedObject) -> RemoteObject {
    let mut remote = if mapped.is_folder() {
        RemoteObject::folder(mapped.remote_id.clone(), mapped.parent_id.clone(), &mapped.name)
    } else {
        RemoteObject::document(mapped.remote_id.clone(), mapped.parent_id.clone(), &mapped.name)
    };
    remote.change_token = mapped.change_token.clone();
    remote
}

/// Content tag of a fetched snapshot against the stored mapping
///
/// A metadata-only touch (same hash, or same token without a hash) carries
/// no content change.
fn remote_content_change(mapped: &MappedObject, remote: &RemoteObject) -> ContentChangeType {
    if remote.kind.is_folder() {
        return ContentChangeType::None;
    }
    match &remote.content_hash {
        Some(hash) if mapped.content_matches(hash) => ContentChangeType::None,
        Some(_) => ContentChangeType::Changed,
        None if remote.change_token.is_some() && remote.change_token != mapped.change_token => {
            ContentChangeType::Changed
        }
        None => ContentChangeType::None,
    }
}

fn build_event(
    remote: &RemoteObject,
    local: LocalTags,
    remote_change: MetaDataChangeType,
    remote_content: ContentChangeType,
) -> anyhow::Result<SyncEvent> {
    let event: SyncEvent = if remote.kind.is_folder() {
        let mut event = FolderEvent::new(local.change, remote_change)?.with_remote(remote.clone());
        if let Some(object) = local.object {
            event = event.with_local(object);
        }
        event.into()
    } else {
        let mut event = FileEvent::new(local.change, remote_change, local.content, remote_content)?
            .with_remote(remote.clone());
        if let Some(object) = local.object {
            event = event.with_local(object);
        }
        event.into()
    };
    Ok(event)
}

#[async_trait]
impl SyncEventHandler for RemoteChangePoller {
    fn name(&self) -> &'static str {
        "remote_change_poller"
    }

    fn priority(&self) -> i32 {
        priority::REMOTE_POLLER
    }

    async fn handle(&self, event: QueueEvent) -> Result<Dispatch, SyncError> {
        match event {
            QueueEvent::StartNextSync { full_sync: false } => {
                if let Err(err) = self.poll().await {
                    warn!(error = %format!("{err:#}"), "Change log poll failed");
                }
                Ok(Dispatch::Handled)
            }
            other => Ok(Dispatch::NotHandled(other)),
        }
    }
}
