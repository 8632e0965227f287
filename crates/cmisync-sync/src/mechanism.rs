//! Sync mechanism - the orchestrator of the decision engine
//!
//! For every canonical event the [`SyncMechanism`]:
//!
//! 1. classifies the local and the remote side independently,
//! 2. looks up the solver key in the [`SolverMatrix`],
//! 3. runs the registered strategy and acts on its outcome.
//!
//! ## Outcomes
//!
//! ```text
//! Success           ──► event dropped
//! Retry             ──► retry_count += 1, the same boxed event is requeued
//! NeedsInteraction  ──► one InteractionNeeded queued, event dropped
//! Fatal             ──► StartNextSync { full_sync: true } queued, then the error is returned
//! ```
//!
//! A matrix cell without a key is a coverage defect and fails fast with
//! [`SyncError::MissingSolver`].

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use cmisync_core::domain::{InteractionNeeded, MappedObject, QueueEvent, SyncEvent};
use cmisync_core::ports::{ILocalFileSystem, IMetaDataStorage};
use tracing::{debug, error, info, instrument, warn, Span};

use crate::detection::{LocalSituationDetector, RemoteSituationDetector};
use crate::metrics::SyncMetrics;
use crate::queue::{priority, Dispatch, EventQueue, SyncEventHandler};
use crate::solver::{SolveOutcome, SolveRequest, SolverContext, SolverMatrix, SolverRegistry};
use crate::SyncError;

pub struct SyncMechanism {
    store: Arc<dyn IMetaDataStorage>,
    fs: Arc<dyn ILocalFileSystem>,
    local_detector: LocalSituationDetector,
    remote_detector: RemoteSituationDetector,
    matrix: SolverMatrix,
    registry: SolverRegistry,
    queue: EventQueue,
    metrics: Option<Arc<SyncMetrics>>,
}

impl SyncMechanism {
    /// Creates a mechanism with the standard matrix and strategies
    pub fn new(ctx: SolverContext, queue: EventQueue) -> Self {
        Self {
            store: ctx.store.clone(),
            fs: ctx.fs.clone(),
            local_detector: LocalSituationDetector::new(ctx.fs.clone()),
            remote_detector: RemoteSituationDetector::new(),
            matrix: SolverMatrix::standard(),
            registry: SolverRegistry::standard(ctx),
            queue,
            metrics: None,
        }
    }

    pub fn with_matrix(mut self, matrix: SolverMatrix) -> Self {
        self.matrix = matrix;
        self
    }

    pub fn with_registry(mut self, registry: SolverRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn matrix(&self) -> &SolverMatrix {
        &self.matrix
    }

    /// Detects, dispatches and resolves one canonical event
    ///
    /// # Errors
    /// - [`SyncError::MissingSolver`] / [`SyncError::UnregisteredSolver`] on a
    ///   coverage defect
    /// - [`SyncError::Storage`] when the mapping cannot be read (a full
    ///   resync is queued first)
    /// - [`SyncError::SolverFailed`] on an unclassified strategy failure (a
    ///   full resync is queued first)
    #[instrument(
        skip(self, event),
        fields(event = %event.describe(), retry = event.retry_count(), solver = tracing::field::Empty)
    )]
    pub async fn handle_event(&self, event: Box<SyncEvent>) -> Result<(), SyncError> {
        let store = self.store.as_ref();
        let local = self.local_detector.analyse(store, &event).await;
        let remote = self.remote_detector.analyse(store, &event).await;

        let Some(key) = self.matrix.get(local, remote) else {
            error!(%local, %remote, "No solver assigned for situation pair");
            return Err(SyncError::MissingSolver { local, remote });
        };
        Span::current().record("solver", key.name());

        let Some(solver) = self.registry.get(key) else {
            error!(solver = %key, "Solver key has no registered strategy");
            return Err(SyncError::UnregisteredSolver(key));
        };

        let mapped = match self.resolve_mapping(&event).await {
            Ok(mapped) => mapped,
            Err(err) => {
                error!(error = %format!("{err:#}"), "Metadata lookup failed, forcing full sync");
                self.queue.push(QueueEvent::StartNextSync { full_sync: true });
                return Err(SyncError::Storage(err));
            }
        };

        let started = Instant::now();
        let outcome = {
            let request = SolveRequest {
                event: &event,
                local,
                remote,
                mapped,
            };
            solver.solve(&request).await
        };
        let elapsed = started.elapsed();

        if let Some(metrics) = &self.metrics {
            metrics.observe_solve(key.name(), elapsed.as_secs_f64());
            metrics.record_outcome(key.name(), outcome.label());
        }
        debug!(
            %local,
            %remote,
            outcome = outcome.label(),
            elapsed_ms = elapsed.as_millis() as u64,
            "Strategy finished"
        );

        match outcome {
            SolveOutcome::Success => Ok(()),
            SolveOutcome::Retry => {
                let mut event = event;
                let attempt = event.increment_retry();
                warn!(attempt, "Transient failure, requeuing event");
                self.queue.push(QueueEvent::Sync(event));
                Ok(())
            }
            SolveOutcome::NeedsInteraction(detail) => {
                info!(title = %detail.title, severity = %detail.severity, "User interaction needed");
                self.queue
                    .push(QueueEvent::InteractionNeeded(InteractionNeeded::new(detail)));
                Ok(())
            }
            SolveOutcome::Fatal(err) => {
                error!(error = %format!("{err:#}"), "Strategy failed, forcing full sync");
                self.queue.push(QueueEvent::StartNextSync { full_sync: true });
                Err(SyncError::SolverFailed {
                    solver: key,
                    error: err,
                })
            }
        }
    }

    /// Finds the mapping an event refers to
    ///
    /// Tries the remote id, then the old and new local paths, then the local
    /// identity of the new path.
    async fn resolve_mapping(&self, event: &SyncEvent) -> anyhow::Result<Option<MappedObject>> {
        if let Some(remote) = event.remote_object() {
            if let Some(mapped) = self.store.get_by_remote_id(&remote.id).await? {
                return Ok(Some(mapped));
            }
        }

        let Some(local) = event.local_object() else {
            return Ok(None);
        };

        let candidates: [Option<&Path>; 2] = [local.old_path(), Some(local.path())];
        for path in candidates.into_iter().flatten() {
            if let Some(mapped) = self.store.get_by_path(path).await? {
                return Ok(Some(mapped));
            }
        }

        // Identities only help for objects that still exist locally
        if self.store.sync_root() != local.path() {
            if let Some(identity) = self.fs.identity(local.path()).await? {
                return self.store.get_by_identity(&identity).await;
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl SyncEventHandler for SyncMechanism {
    fn name(&self) -> &'static str {
        "sync_mechanism"
    }

    fn priority(&self) -> i32 {
        priority::MECHANISM
    }

    async fn handle(&self, event: QueueEvent) -> Result<Dispatch, SyncError> {
        match event {
            QueueEvent::Sync(event) => {
                self.handle_event(event).await?;
                Ok(Dispatch::Handled)
            }
            other => Ok(Dispatch::NotHandled(other)),
        }
    }
}
