//! Strategies for changes that only happened on the remote side

use std::path::Path;

use async_trait::async_trait;
use cmisync_core::domain::{MappedObject, RemoteObject};
use tracing::{debug, info, instrument, warn};

use super::{settle, ConflictNamer, SolveOutcome, SolveRequest, Solver, SolverContext};

// ============================================================================
// RemoteObjectAdded
// ============================================================================

/// Materializes a remote object locally
///
/// Also restores objects that were deleted locally while the remote side
/// still changed them. An unmapped local file with different content at the
/// target path is moved aside as a conflict copy first.
pub struct RemoteObjectAdded {
    ctx: SolverContext,
}

impl RemoteObjectAdded {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request), fields(local = %request.local))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let ctx = &self.ctx;
        let remote = request.require_remote()?;
        let path = ctx.target_path(remote).await?;
        let state = ctx.fs.get_state(&path).await?;
        let mut mapping = MappedObject::from_remote(remote);

        if remote.kind.is_folder() {
            if !state.is_directory() {
                ctx.fs.create_directory(&path).await?;
            }
            mapping.local_identity = ctx.fs.identity(&path).await?;
            ctx.save_at(&mapping, &path).await?;
            info!(path = %path.display(), "Created local folder");
            return Ok(SolveOutcome::Success);
        }

        if state.is_file() {
            let local_sum = ctx.fs.compute_checksum(&path).await?;
            let identical = remote
                .content_hash
                .as_ref()
                .and_then(|h| h.same_content(&local_sum))
                .unwrap_or(false);
            if identical {
                mapping.local_identity = ctx.fs.identity(&path).await?;
                mapping.record_local_write(Some(local_sum), Some(state.size));
                ctx.save_at(&mapping, &path).await?;
                debug!(path = %path.display(), "Local file already identical");
                return Ok(SolveOutcome::Success);
            }

            let owned_by_other = ctx
                .store
                .get_by_path(&path)
                .await?
                .map(|m| m.remote_id != remote.id)
                .unwrap_or(true);
            if owned_by_other {
                let copy = ConflictNamer::unique_path(ctx.fs.as_ref(), &path).await?;
                ctx.fs.rename(&path, &copy).await?;
                warn!(path = %path.display(), conflict_copy = %copy.display(), "Kept unsynchronized local file");
            }
        }

        let (checksum, size) = ctx.download_into(remote, &path).await?;
        mapping.local_identity = ctx.fs.identity(&path).await?;
        mapping.record_local_write(Some(checksum), Some(size));
        ctx.save_at(&mapping, &path).await?;
        info!(path = %path.display(), bytes = size, "Downloaded remote object");
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for RemoteObjectAdded {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

// ============================================================================
// RemoteObjectChanged
// ============================================================================

/// Downloads changed remote content
pub struct RemoteObjectChanged {
    ctx: SolverContext,
}

impl RemoteObjectChanged {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let remote = request.require_remote()?;
        let mut mapped = request.require_mapped()?.clone();
        let path = self.ctx.mapped_path(&mapped).await?;

        refresh_content(&self.ctx, &mut mapped, remote, &path).await?;
        mapped.apply_remote(remote);
        self.ctx.store.save(&mapped).await?;
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for RemoteObjectChanged {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

/// Downloads `remote` into `path` unless the stored checksum already matches
async fn refresh_content(
    ctx: &SolverContext,
    mapped: &mut MappedObject,
    remote: &RemoteObject,
    path: &Path,
) -> anyhow::Result<()> {
    if remote.kind.is_folder() {
        return Ok(());
    }
    if let Some(hash) = &remote.content_hash {
        if mapped.content_matches(hash) {
            debug!(path = %path.display(), "Remote content unchanged");
            return Ok(());
        }
    }
    let (checksum, size) = ctx.download_into(remote, path).await?;
    mapped.local_identity = ctx.fs.identity(path).await?;
    mapped.record_local_write(Some(checksum), Some(size));
    info!(path = %path.display(), bytes = size, "Applied remote content");
    Ok(())
}

// ============================================================================
// RemoteObjectRenamed / RemoteObjectMoved
// ============================================================================

/// Moves the local object to where the remote object now lives
///
/// With `refresh_content` the content is downloaded afterwards when it
/// differs; composites disable it and leave content to their second step.
#[instrument(skip(ctx, request))]
async fn follow_remote_path(
    ctx: &SolverContext,
    request: &SolveRequest<'_>,
    refresh: bool,
) -> anyhow::Result<SolveOutcome> {
    let remote = request.require_remote()?;
    let mut mapped = request.require_mapped()?.clone();

    let old_path = ctx.mapped_path(&mapped).await?;
    let new_path = ctx.target_path(remote).await?;

    if old_path != new_path {
        if ctx.fs.get_state(&old_path).await?.exists {
            ctx.fs.rename(&old_path, &new_path).await?;
            info!(from = %old_path.display(), to = %new_path.display(), "Followed remote path change");
        } else {
            debug!(path = %old_path.display(), "Local object missing, nothing to move");
        }
    }

    if refresh {
        refresh_content(ctx, &mut mapped, remote, &new_path).await?;
    }
    mapped.apply_remote(remote);
    if mapped.local_identity.is_none() {
        mapped.local_identity = ctx.fs.identity(&new_path).await?;
    }
    ctx.store.save(&mapped).await?;
    Ok(SolveOutcome::Success)
}

/// Renames the local object after a remote rename
pub struct RemoteObjectRenamed {
    ctx: SolverContext,
    refresh_content: bool,
}

impl RemoteObjectRenamed {
    pub fn new(ctx: SolverContext) -> Self {
        Self {
            ctx,
            refresh_content: true,
        }
    }

    /// Only follows the name; content is handled by a later step
    pub fn path_only(mut self) -> Self {
        self.refresh_content = false;
        self
    }
}

#[async_trait]
impl Solver for RemoteObjectRenamed {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(
            follow_remote_path(&self.ctx, request, self.refresh_content).await,
            request.local_path(),
        )
    }
}

/// Moves the local object after a remote move
pub struct RemoteObjectMoved {
    ctx: SolverContext,
    refresh_content: bool,
}

impl RemoteObjectMoved {
    pub fn new(ctx: SolverContext) -> Self {
        Self {
            ctx,
            refresh_content: true,
        }
    }

    /// Only follows the move; content is handled by a later step
    pub fn path_only(mut self) -> Self {
        self.refresh_content = false;
        self
    }
}

#[async_trait]
impl Solver for RemoteObjectMoved {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(
            follow_remote_path(&self.ctx, request, self.refresh_content).await,
            request.local_path(),
        )
    }
}

// ============================================================================
// RemoteObjectDeleted
// ============================================================================

/// Deletes the local object after a remote delete
///
/// Locally modified files are never deleted: the mapping is dropped so they
/// are uploaded again as new objects. A folder is kept when any mapped file
/// below it carries unsynchronized content.
pub struct RemoteObjectDeleted {
    ctx: SolverContext,
}

impl RemoteObjectDeleted {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let Some(mapped) = &request.mapped else {
            debug!("Nothing mapped, nothing to delete");
            return Ok(SolveOutcome::Success);
        };
        let path = self.ctx.mapped_path(mapped).await?;

        if self.has_unsynced_content(mapped, &path).await? {
            info!(path = %path.display(), "Keeping locally modified content of remotely deleted object");
        } else {
            self.ctx.fs.delete(&path).await?;
            info!(path = %path.display(), "Deleted local object");
        }

        self.ctx.store.remove_subtree(&mapped.remote_id).await?;
        Ok(SolveOutcome::Success)
    }

    async fn has_unsynced_content(&self, mapped: &MappedObject, path: &Path) -> anyhow::Result<bool> {
        let mut pending = vec![(mapped.clone(), path.to_path_buf())];

        while let Some((object, object_path)) = pending.pop() {
            if object.is_folder() {
                for child in self.ctx.store.children(&object.remote_id).await? {
                    let child_path = object_path.join(&child.name);
                    pending.push((child, child_path));
                }
                continue;
            }
            if let Some(local_sum) = self.ctx.local_checksum(&object_path).await? {
                if !object.content_matches(&local_sum) {
                    debug!(path = %object_path.display(), "Unsynchronized local content");
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl Solver for RemoteObjectDeleted {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}
