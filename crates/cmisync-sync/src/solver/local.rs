//! Strategies for changes that only happened on the local side

use async_trait::async_trait;
use cmisync_core::domain::SituationType;
use cmisync_core::ports::RemoteError;
use tracing::{debug, info, instrument};

use super::{file_name, settle, SolveOutcome, SolveRequest, Solver, SolverContext, StrategyError};

// ============================================================================
// LocalObjectAdded
// ============================================================================

/// Creates the remote counterpart of a new local object
///
/// Also covers a local object whose remote counterpart was deleted while it
/// changed: the stale mapping is dropped and the object is uploaded anew.
pub struct LocalObjectAdded {
    ctx: SolverContext,
}

impl LocalObjectAdded {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request), fields(remote = %request.remote))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let path = request.require_local_path()?;

        match &request.mapped {
            Some(mapped) if request.remote != SituationType::Removed => {
                // Replaced in place (new inode): push content to the existing object
                let state = self.ctx.fs.get_state(path).await?;
                let mut mapped = mapped.clone();
                mapped.local_identity = self.ctx.fs.identity(path).await?;
                if state.is_file() {
                    let checksum = self.ctx.fs.compute_checksum(path).await?;
                    if !mapped.content_matches(&checksum) {
                        let data = self.ctx.fs.read_file(path).await?;
                        let updated = self
                            .ctx
                            .session
                            .set_content(&mapped.remote_id, &data, mapped.change_token.as_ref())
                            .await?;
                        mapped.apply_remote(&updated);
                        mapped.record_local_write(Some(checksum), Some(state.size));
                    }
                }
                self.ctx.store.save(&mapped).await?;
                debug!(remote_id = %mapped.remote_id, "Refreshed existing mapping");
            }
            Some(mapped) => {
                info!(remote_id = %mapped.remote_id, "Remote object gone, uploading as new");
                self.ctx.store.remove_subtree(&mapped.remote_id).await?;
                self.ctx.upload_new(path).await?;
            }
            None => {
                self.ctx.upload_new(path).await?;
            }
        }
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for LocalObjectAdded {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

// ============================================================================
// LocalObjectChanged
// ============================================================================

/// Uploads changed local content
///
/// A checksum equal to the stored one means only metadata was touched and
/// nothing is uploaded.
pub struct LocalObjectChanged {
    ctx: SolverContext,
}

impl LocalObjectChanged {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let path = request.require_local_path()?;
        let Some(mapped) = request.mapped.clone() else {
            self.ctx.upload_new(path).await?;
            return Ok(SolveOutcome::Success);
        };

        let state = self.ctx.fs.get_state(path).await?;
        if !state.is_file() {
            debug!(path = %path.display(), "Not a regular file, nothing to upload");
            return Ok(SolveOutcome::Success);
        }

        let mut mapped = mapped;
        mapped.local_identity = self.ctx.fs.identity(path).await?;

        let checksum = self.ctx.fs.compute_checksum(path).await?;
        if mapped.content_matches(&checksum) {
            debug!(path = %path.display(), "Content unchanged, metadata-only touch");
            mapped.record_local_write(None, Some(state.size));
            self.ctx.store.save(&mapped).await?;
            return Ok(SolveOutcome::Success);
        }

        let data = self.ctx.fs.read_file(path).await?;
        let updated = self
            .ctx
            .session
            .set_content(&mapped.remote_id, &data, mapped.change_token.as_ref())
            .await?;
        mapped.apply_remote(&updated);
        mapped.record_local_write(Some(checksum), Some(data.len() as u64));
        self.ctx.store.save(&mapped).await?;
        info!(path = %path.display(), bytes = data.len(), "Uploaded local change");
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for LocalObjectChanged {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

// ============================================================================
// LocalObjectRenamed / LocalObjectMoved
// ============================================================================

/// Renames the remote object after a local rename within the same folder
pub struct LocalObjectRenamed {
    ctx: SolverContext,
}

impl LocalObjectRenamed {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let path = request.require_local_path()?;
        let mut mapped = request.require_mapped()?.clone();
        let new_name = file_name(path)?;

        if mapped.name != new_name {
            let updated = self.ctx.session.rename(&mapped.remote_id, new_name).await?;
            info!(from = %mapped.name, to = %new_name, "Renamed remote object");
            mapped.apply_remote(&updated);
        }
        mapped.local_identity = self.ctx.fs.identity(path).await?;
        self.ctx.store.save(&mapped).await?;
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for LocalObjectRenamed {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

/// Moves (and renames if needed) the remote object after a local move
pub struct LocalObjectMoved {
    ctx: SolverContext,
}

impl LocalObjectMoved {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let path = request.require_local_path()?;
        let mut mapped = request.require_mapped()?.clone();
        let target_parent = self.ctx.parent_remote_id(path).await?;

        if mapped.parent_id.as_ref() != Some(&target_parent) {
            let source_parent = mapped
                .parent_id
                .clone()
                .ok_or(StrategyError::RootMove)?;
            let moved = self
                .ctx
                .session
                .move_object(&mapped.remote_id, &source_parent, &target_parent)
                .await?;
            info!(from = %source_parent, to = %target_parent, "Moved remote object");
            mapped.apply_remote(&moved);
        }

        let new_name = file_name(path)?;
        if mapped.name != new_name {
            let renamed = self.ctx.session.rename(&mapped.remote_id, new_name).await?;
            mapped.apply_remote(&renamed);
        }

        mapped.local_identity = self.ctx.fs.identity(path).await?;
        self.ctx.store.save(&mapped).await?;
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for LocalObjectMoved {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

// ============================================================================
// LocalObjectDeleted
// ============================================================================

/// Deletes the remote object after a local delete
///
/// A remote object that is already gone counts as success.
pub struct LocalObjectDeleted {
    ctx: SolverContext,
}

impl LocalObjectDeleted {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let Some(mapped) = &request.mapped else {
            debug!("Nothing mapped, nothing to delete");
            return Ok(SolveOutcome::Success);
        };

        if let Err(err) = self.ctx.session.delete(&mapped.remote_id).await {
            let already_gone = err
                .chain()
                .any(|e| matches!(e.downcast_ref::<RemoteError>(), Some(RemoteError::NotFound(_))));
            if !already_gone {
                return Err(err);
            }
            debug!(remote_id = %mapped.remote_id, "Remote object already deleted");
        }

        let removed = self.ctx.store.remove_subtree(&mapped.remote_id).await?;
        info!(remote_id = %mapped.remote_id, removed, "Deleted remote object");
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for LocalObjectDeleted {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}
