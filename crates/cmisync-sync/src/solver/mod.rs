//! Resolution strategies and the dispatch machinery around them
//!
//! A [`Solver`] resolves one (local situation, remote situation) pair for one
//! event, operating exclusively through the ports held in a
//! [`SolverContext`]. It reports a [`SolveOutcome`]; it never requeues or
//! notifies by itself, the orchestrator does.
//!
//! ## Failure protocol
//!
//! Port errors are `anyhow::Error`. [`classify_error`] turns them into an
//! outcome:
//!
//! - typed [`RemoteError`] quota / virus → `NeedsInteraction`
//! - typed transient [`RemoteError`], transient I/O kinds, or an untyped
//!   network/5xx/lock message → `Retry`
//! - anything else → `Fatal`

pub mod both;
pub mod local;
pub mod matrix;
pub mod namer;
pub mod remote;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use cmisync_core::domain::{
    Checksum, InteractionDetail, MappedObject, ObjectKind, RemoteId, RemoteObject, SituationType,
    SyncEvent,
};
use cmisync_core::ports::{IMetaDataStorage, ILocalFileSystem, IRemoteSession, RemoteError};
use thiserror::Error;
use tracing::{debug, info, instrument, warn};

pub use matrix::{SolverKey, SolverMatrix, SolverRegistry};
pub use namer::{conflict_copy_name, ConflictNamer};

// ============================================================================
// Solver contract
// ============================================================================

/// Ports shared by every strategy
#[derive(Clone)]
pub struct SolverContext {
    pub store: Arc<dyn IMetaDataStorage>,
    pub session: Arc<dyn IRemoteSession>,
    pub fs: Arc<dyn ILocalFileSystem>,
}

/// One strategy invocation
#[derive(Debug, Clone)]
pub struct SolveRequest<'a> {
    pub event: &'a SyncEvent,
    pub local: SituationType,
    pub remote: SituationType,
    /// Mapping resolved by the orchestrator before dispatch
    pub mapped: Option<MappedObject>,
}

impl<'a> SolveRequest<'a> {
    pub fn local_path(&self) -> Option<&'a Path> {
        self.event.local_path()
    }

    pub fn remote_object(&self) -> Option<&'a RemoteObject> {
        self.event.remote_object()
    }

    fn require_local_path(&self) -> anyhow::Result<&'a Path> {
        self.local_path()
            .ok_or_else(|| StrategyError::MissingLocalPath(self.event.describe()).into())
    }

    fn require_remote(&self) -> anyhow::Result<&'a RemoteObject> {
        self.remote_object()
            .ok_or_else(|| StrategyError::MissingRemoteObject(self.event.describe()).into())
    }

    fn require_mapped(&self) -> anyhow::Result<&MappedObject> {
        self.mapped
            .as_ref()
            .ok_or_else(|| StrategyError::MissingMapping(self.event.describe()).into())
    }
}

/// Result of a strategy execution
#[derive(Debug)]
pub enum SolveOutcome {
    Success,
    /// Transient failure; the same event is requeued
    Retry,
    /// The user has to act; the event is dropped
    NeedsInteraction(InteractionDetail),
    /// Unclassified failure; a full resync is forced
    Fatal(anyhow::Error),
}

impl SolveOutcome {
    /// Label used for metrics and logs
    pub fn label(&self) -> &'static str {
        match self {
            SolveOutcome::Success => "success",
            SolveOutcome::Retry => "retry",
            SolveOutcome::NeedsInteraction(_) => "interaction",
            SolveOutcome::Fatal(_) => "fatal",
        }
    }
}

/// A resolution strategy
#[async_trait]
pub trait Solver: Send + Sync {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome;
}

/// A strategy found the metadata inconsistent with the event
///
/// Always classified as fatal: only a full resync can repair it.
#[derive(Debug, Error)]
pub enum StrategyError {
    #[error("event carries no local path: {0}")]
    MissingLocalPath(String),

    #[error("event carries no remote object: {0}")]
    MissingRemoteObject(String),

    #[error("no mapped object for {0}")]
    MissingMapping(String),

    #[error("no local path for mapped object {0}")]
    UnresolvedPath(RemoteId),

    #[error("{} has no parent", .0.display())]
    NoParent(PathBuf),

    #[error("parent folder {} is not synchronized", .0.display())]
    ParentNotSynchronized(PathBuf),

    #[error("remote object {0} has no parent")]
    NoRemoteParent(RemoteId),

    #[error("remote parent {0} is not synchronized")]
    RemoteParentNotSynchronized(RemoteId),

    #[error("{} has no usable file name", .0.display())]
    UnusableName(PathBuf),

    #[error("the sync root cannot be moved")]
    RootMove,
}

// ============================================================================
// Error classification
// ============================================================================

/// Maps a port error onto the failure protocol
///
/// Only the root cause is matched by message: context layers name user
/// paths and never describe the failure class.
pub fn classify_error(err: anyhow::Error, affected_path: Option<&Path>) -> SolveOutcome {
    if err.chain().any(|e| e.is::<StrategyError>()) {
        return SolveOutcome::Fatal(err);
    }

    if let Some(remote) = err.chain().find_map(|e| e.downcast_ref::<RemoteError>()) {
        let detail = match remote {
            RemoteError::QuotaExceeded(_) => Some(InteractionDetail::quota_exceeded(format!("{err:#}"))),
            RemoteError::VirusDetected(_) => Some(InteractionDetail::virus_detected(format!("{err:#}"))),
            _ => None,
        };
        if let Some(mut detail) = detail {
            if let Some(path) = affected_path {
                detail = detail.with_path(path);
            }
            return SolveOutcome::NeedsInteraction(detail);
        }
        if remote.is_transient() {
            return SolveOutcome::Retry;
        }
        return SolveOutcome::Fatal(err);
    }

    if let Some(io) = err.chain().find_map(|e| e.downcast_ref::<std::io::Error>()) {
        use std::io::ErrorKind;
        if matches!(
            io.kind(),
            ErrorKind::WouldBlock | ErrorKind::Interrupted | ErrorKind::TimedOut
        ) {
            return SolveOutcome::Retry;
        }
    }

    if is_transient_message(&err.root_cause().to_string()) {
        return SolveOutcome::Retry;
    }

    SolveOutcome::Fatal(err)
}

/// Message-based fallback for adapter errors that carry no type
///
/// Keywords and status codes must be whole words; a token keeps its path
/// and name separators, so `Q3-500` or `/sync/network/a.txt` never match.
fn is_transient_message(message: &str) -> bool {
    const PHRASES: [&str; 7] = [
        "timed out",
        "reset by peer",
        "broken pipe",
        "too many requests",
        "rate limit",
        "server error",
        "resource busy",
    ];
    const WORDS: [&str; 10] = [
        // Network errors
        "network", "connection", "timeout", "dns",
        // Rate limiting and server errors
        "429", "500", "502", "503", "504",
        // Local file held by another process
        "locked",
    ];

    let message = message.to_lowercase();
    if PHRASES.iter().any(|phrase| message.contains(phrase)) {
        return true;
    }
    message
        .split(|c: char| !(c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | '\\')))
        .map(|token| token.trim_end_matches('.'))
        .any(|token| WORDS.contains(&token))
}

/// Turns a strategy body result into an outcome
pub(crate) fn settle(result: anyhow::Result<SolveOutcome>, path: Option<&Path>) -> SolveOutcome {
    match result {
        Ok(outcome) => outcome,
        Err(err) => classify_error(err, path),
    }
}

// ============================================================================
// SolverContext helpers
// ============================================================================

impl SolverContext {
    pub fn new(
        store: Arc<dyn IMetaDataStorage>,
        session: Arc<dyn IRemoteSession>,
        fs: Arc<dyn ILocalFileSystem>,
    ) -> Self {
        Self { store, session, fs }
    }

    /// Current local path of a mapped object
    pub async fn mapped_path(&self, mapped: &MappedObject) -> anyhow::Result<PathBuf> {
        self.store
            .local_path_of(mapped)
            .await?
            .ok_or_else(|| StrategyError::UnresolvedPath(mapped.remote_id.clone()).into())
    }

    /// Remote id of the folder that contains `path` locally
    pub async fn parent_remote_id(&self, path: &Path) -> anyhow::Result<RemoteId> {
        let parent = path
            .parent()
            .ok_or_else(|| StrategyError::NoParent(path.to_path_buf()))?;
        let mapped = self
            .store
            .get_by_path(parent)
            .await?
            .ok_or_else(|| StrategyError::ParentNotSynchronized(parent.to_path_buf()))?;
        Ok(mapped.remote_id)
    }

    /// Local path a remote object belongs at, derived from its parent mapping
    pub async fn target_path(&self, remote: &RemoteObject) -> anyhow::Result<PathBuf> {
        let parent_id = remote
            .parent_id
            .as_ref()
            .ok_or_else(|| StrategyError::NoRemoteParent(remote.id.clone()))?;
        let parent = self
            .store
            .get_by_remote_id(parent_id)
            .await?
            .ok_or_else(|| StrategyError::RemoteParentNotSynchronized(parent_id.clone()))?;
        Ok(self.mapped_path(&parent).await?.join(&remote.name))
    }

    /// Computes the local checksum, or `None` when there is no regular file
    pub async fn local_checksum(&self, path: &Path) -> anyhow::Result<Option<Checksum>> {
        if !self.fs.get_state(path).await?.is_file() {
            return Ok(None);
        }
        Ok(Some(self.fs.compute_checksum(path).await?))
    }

    /// Downloads a document into `path`, returning the written checksum and size
    pub async fn download_into(
        &self,
        remote: &RemoteObject,
        path: &Path,
    ) -> anyhow::Result<(Checksum, u64)> {
        let data = self
            .session
            .get_content(&remote.id)
            .await
            .with_context(|| format!("downloading {}", remote.id))?;
        self.fs.write_file(path, &data).await?;
        let checksum = self.fs.compute_checksum(path).await?;
        debug!(path = %path.display(), bytes = data.len(), "downloaded");
        Ok((checksum, data.len() as u64))
    }

    /// Saves a mapping after evicting any other mapping occupying its path
    pub async fn save_at(&self, mapping: &MappedObject, path: &Path) -> anyhow::Result<()> {
        if let Some(occupant) = self.store.get_by_path(path).await? {
            if occupant.remote_id != mapping.remote_id {
                info!(path = %path.display(), stale = %occupant.remote_id, "Evicting stale mapping");
                self.store.remove_subtree(&occupant.remote_id).await?;
            }
        }
        self.store.save(mapping).await
    }

    /// Creates the remote counterpart of a local object and maps it
    #[instrument(skip(self), fields(path = %path.display()))]
    pub async fn upload_new(&self, path: &Path) -> anyhow::Result<Option<MappedObject>> {
        let state = self.fs.get_state(path).await?;
        if !state.exists {
            debug!("local object vanished before upload");
            return Ok(None);
        }

        let name = file_name(path)?;
        let parent_id = self.parent_remote_id(path).await?;

        let (created, checksum) = if state.is_dir {
            (self.session.create_folder(&parent_id, name).await?, None)
        } else {
            let data = self.fs.read_file(path).await?;
            let checksum = self.fs.compute_checksum(path).await?;
            let created = self
                .session
                .create_document(&parent_id, name, &data)
                .await
                .with_context(|| format!("uploading {}", path.display()))?;
            (created, Some(checksum))
        };

        let mut mapping = MappedObject::from_remote(&created);
        mapping.local_identity = self.fs.identity(path).await?;
        if !state.is_dir {
            mapping.record_local_write(checksum, Some(state.size));
        }
        self.save_at(&mapping, path).await?;
        info!(remote_id = %created.id, kind = %created.kind, "Created remote object");
        Ok(Some(mapping))
    }
}

pub(crate) fn file_name(path: &Path) -> anyhow::Result<&str> {
    path.file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| StrategyError::UnusableName(path.to_path_buf()).into())
}

// ============================================================================
// ConflictingContent
// ============================================================================

/// Shared strategy for every cell where both sides may carry content
///
/// Compares the local checksum, the remote hash and the stored checksum:
/// equal content only refreshes the mapping, a one-sided change is
/// propagated, and a two-sided change keeps both versions by moving the
/// local one aside as a conflict copy.
pub struct ConflictingContent {
    ctx: SolverContext,
}

impl ConflictingContent {
    pub fn new(ctx: SolverContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, request), fields(local = %request.local, remote = %request.remote))]
    async fn apply(&self, request: &SolveRequest<'_>) -> anyhow::Result<SolveOutcome> {
        let ctx = &self.ctx;
        let mapped = request.mapped.clone();

        let remote_id = match (&mapped, request.remote_object()) {
            (Some(m), _) => m.remote_id.clone(),
            (None, Some(r)) => r.id.clone(),
            (None, None) => {
                let path = request.require_local_path()?;
                ctx.upload_new(path).await?;
                return Ok(SolveOutcome::Success);
            }
        };

        let path = match &mapped {
            Some(m) => ctx.mapped_path(m).await?,
            None => match request.local_path() {
                Some(p) => p.to_path_buf(),
                None => ctx.target_path(request.require_remote()?).await?,
            },
        };

        let Some(fresh) = ctx.session.get_object(&remote_id).await? else {
            // Remote side is gone: the local content becomes a new object
            info!(path = %path.display(), "Remote object vanished, re-uploading local content");
            ctx.store.remove_subtree(&remote_id).await?;
            ctx.upload_new(&path).await?;
            return Ok(SolveOutcome::Success);
        };

        let state = ctx.fs.get_state(&path).await?;
        let mut mapping = mapped.clone().unwrap_or_else(|| MappedObject::from_remote(&fresh));

        if fresh.kind == ObjectKind::Folder || state.is_dir {
            if !state.exists {
                ctx.fs.create_directory(&path).await?;
            }
            mapping.apply_remote(&fresh);
            mapping.local_identity = ctx.fs.identity(&path).await?;
            ctx.save_at(&mapping, &path).await?;
            return Ok(SolveOutcome::Success);
        }

        if !state.exists {
            let (checksum, size) = ctx.download_into(&fresh, &path).await?;
            mapping.apply_remote(&fresh);
            mapping.local_identity = ctx.fs.identity(&path).await?;
            mapping.record_local_write(Some(checksum), Some(size));
            ctx.save_at(&mapping, &path).await?;
            return Ok(SolveOutcome::Success);
        }

        let local_sum = ctx.fs.compute_checksum(&path).await?;

        let same_now = fresh
            .content_hash
            .as_ref()
            .and_then(|h| h.same_content(&local_sum))
            .unwrap_or(false);

        let local_changed = mapped
            .as_ref()
            .map(|m| !m.content_matches(&local_sum))
            .unwrap_or(true);

        let remote_changed = match (&mapped, &fresh.content_hash) {
            (None, _) => true,
            (Some(m), Some(hash)) => match m.checksum.as_ref().and_then(|c| c.same_content(hash)) {
                Some(equal) => !equal,
                None => remote_token_moved(m, &fresh, request.remote),
            },
            (Some(m), None) => remote_token_moved(m, &fresh, request.remote),
        };

        debug!(same_now, local_changed, remote_changed, "Compared content");

        if same_now || (!local_changed && !remote_changed) {
            mapping.apply_remote(&fresh);
            mapping.local_identity = ctx.fs.identity(&path).await?;
            mapping.record_local_write(Some(local_sum), Some(state.size));
            ctx.save_at(&mapping, &path).await?;
            return Ok(SolveOutcome::Success);
        }

        if remote_changed && !local_changed {
            let (checksum, size) = ctx.download_into(&fresh, &path).await?;
            mapping.apply_remote(&fresh);
            mapping.local_identity = ctx.fs.identity(&path).await?;
            mapping.record_local_write(Some(checksum), Some(size));
            ctx.save_at(&mapping, &path).await?;
            info!(path = %path.display(), "Remote content applied");
            return Ok(SolveOutcome::Success);
        }

        if local_changed && !remote_changed {
            let data = ctx.fs.read_file(&path).await?;
            let updated = ctx
                .session
                .set_content(&remote_id, &data, fresh.change_token.as_ref())
                .await
                .with_context(|| format!("uploading {}", path.display()))?;
            mapping.apply_remote(&updated);
            mapping.local_identity = ctx.fs.identity(&path).await?;
            mapping.record_local_write(Some(local_sum), Some(data.len() as u64));
            ctx.save_at(&mapping, &path).await?;
            info!(path = %path.display(), "Local content uploaded");
            return Ok(SolveOutcome::Success);
        }

        let copy = ConflictNamer::unique_path(ctx.fs.as_ref(), &path).await?;
        ctx.fs.rename(&path, &copy).await?;
        warn!(
            path = %path.display(),
            conflict_copy = %copy.display(),
            "Both sides changed content, local version kept as conflict copy"
        );

        let (checksum, size) = ctx.download_into(&fresh, &path).await?;
        mapping.apply_remote(&fresh);
        mapping.local_identity = ctx.fs.identity(&path).await?;
        mapping.record_local_write(Some(checksum), Some(size));
        ctx.save_at(&mapping, &path).await?;
        Ok(SolveOutcome::Success)
    }
}

/// Token-based fallback when hashes cannot be compared
fn remote_token_moved(mapped: &MappedObject, fresh: &RemoteObject, remote: SituationType) -> bool {
    match (&mapped.change_token, &fresh.change_token) {
        (Some(stored), Some(current)) if stored != current => true,
        (Some(_), Some(_)) => false,
        _ => matches!(remote, SituationType::Added | SituationType::Changed),
    }
}

#[async_trait]
impl Solver for ConflictingContent {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        settle(self.apply(request).await, request.local_path())
    }
}

// ============================================================================
// PathStepThenContent
// ============================================================================

/// Composite: a rename/move step followed by the shared content strategy
pub struct PathStepThenContent {
    ctx: SolverContext,
    step: Arc<dyn Solver>,
    content: Arc<ConflictingContent>,
}

impl PathStepThenContent {
    pub fn new(ctx: SolverContext, step: Arc<dyn Solver>, content: Arc<ConflictingContent>) -> Self {
        Self { ctx, step, content }
    }
}

#[async_trait]
impl Solver for PathStepThenContent {
    async fn solve(&self, request: &SolveRequest<'_>) -> SolveOutcome {
        match self.step.solve(request).await {
            SolveOutcome::Success => {}
            other => return other,
        }

        // The step rewrote the mapping; the content step must see the new one
        let refreshed = match &request.mapped {
            Some(m) => match self.ctx.store.get_by_remote_id(&m.remote_id).await {
                Ok(found) => found,
                Err(err) => return classify_error(err, request.local_path()),
            },
            None => None,
        };

        let next = SolveRequest {
            event: request.event,
            local: request.local,
            remote: request.remote,
            mapped: refreshed,
        };
        self.content.solve(&next).await
    }
}
