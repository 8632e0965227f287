//! Strategies where both sides agree, or neither side changed

use async_trait::async_trait;
use cmisync_core::domain::{InteractionDetail, InteractionKind, Severity};
use tracing::{debug, info, instrument};

use super::{file_name, settle, SolveOutcome, SolveRequest, Solver, SolverContext};

/// Keeps the stored change token current after a metadata-only remote touch
///
/// Without this, the same touch would be reported as a change on every poll.
pub struct NothingToDo {
    ctx: SolverContext,
}

impl NothingToDo {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let (Some(mapped), Some(remote)) = (&request.mapped, request.remote_object()) else {
            return Ok(SolveOutcome::Success);
        };
        if remote.change_token.is_some() && remote.change_token != mapped.change_token {
            let mut mapped = mapped.clone();
            mapped.change_token = remote.change_token.clone();
            self.ctx.store.save(&mapped).await?;
            debug!(remote_id = %mapped.remote_id, "Refreshed change token");
        }
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for NothingToDo {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

/// Both sides renamed or moved the same object
///
/// Identical targets only need the mapping updated. Diverging targets
/// cannot be merged automatically and are handed to the user.
pub struct BothRenamedOrMoved {
    ctx: SolverContext,
}

impl BothRenamedOrMoved {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request), fields(local = %request.local, remote = %request.remote))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let path = request.require_local_path()?;
        let remote = request.require_remote()?;
        let mut mapped = request.require_mapped()?.clone();

        let local_name = file_name(path)?;
        let local_parent = self.ctx.parent_remote_id(path).await?;

        if local_name == remote.name && remote.parent_id.as_ref() == Some(&local_parent) {
            mapped.apply_remote(remote);
            mapped.local_identity = self.ctx.fs.identity(path).await?;
            self.ctx.store.save(&mapped).await?;
            info!(path = %path.display(), "Both sides agree on the new location");
            return Ok(SolveOutcome::Success);
        }

        let remote_target = self
            .ctx
            .target_path(remote)
            .await
            .map(|p| p.display().to_string())
            .unwrap_or_else(|_| remote.name.clone());

        let detail = InteractionDetail::new(
            "Conflicting rename",
            format!(
                "'{}' was renamed to '{}' on this computer and to '{}' on the server. \
                 Rename one of them so both agree.",
                mapped.name, local_name, remote.name
            ),
        )
        .with_kind(InteractionKind::ConflictingRename)
        .with_severity(Severity::Warning)
        .with_technical_details(format!(
            "remote_id={} local={} remote={}",
            mapped.remote_id,
            path.display(),
            remote_target
        ))
        .with_path(path);

        Ok(SolveOutcome::NeedsInteraction(detail))
    }
}

#[async_trait]
impl Solver for BothRenamedOrMoved {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

/// Both sides deleted the object; only the metadata remains to go
pub struct BothDeleted {
    ctx: SolverContext,
}

impl BothDeleted {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        if let Some(mapped) = &request.mapped {
            let removed = self.ctx.store.remove_subtree(&mapped.remote_id).await?;
            debug!(remote_id = %mapped.remote_id, removed, "Removed mapping of object deleted on both sides");
        }
        Ok(SolveOutcome::Success)
    }
}

#[async_trait]
impl Solver for BothDeleted {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}
