//! CmisSync Sync - Synchronization decision engine
//!
//! Provides:
//! - Local and remote situation detection
//! - The solver dispatch matrix and its resolution strategies
//! - The event queue, its drain loop and the handlers registered on it
//! - Filesystem watching, debouncing and remote change log polling
//!
//! ## Modules
//!
//! - [`mechanism`] - Orchestrator: detect, look up the matrix, solve
//! - [`detection`] - Local and remote situation detectors
//! - [`solver`] - Dispatch matrix, registry and resolution strategies
//! - [`queue`] - Event queue and the single drain loop
//! - [`local_events`] / [`remote_events`] - Normalization of raw changes
//! - [`filter`] - Ignore rules applied before anything else
//! - [`watcher`] / [`scheduler`] - OS notifications and debouncing
//! - [`filesystem`] - Local filesystem adapter (atomic writes, SHA-256)
//! - [`metrics`] - Prometheus metrics for the engine

pub mod detection;
pub mod filesystem;
pub mod filter;
pub mod handlers;
pub mod local_events;
pub mod mechanism;
pub mod metrics;
pub mod queue;
pub mod remote_events;
pub mod scheduler;
pub mod solver;
pub mod watcher;

use cmisync_core::domain::{DomainError, SituationType};
use thiserror::Error;

use crate::solver::SolverKey;

/// Errors surfaced by the decision engine
#[derive(Debug, Error)]
pub enum SyncError {
    /// The dispatch matrix has no strategy for a situation pair
    #[error("No solver assigned for local={local} remote={remote}")]
    MissingSolver {
        local: SituationType,
        remote: SituationType,
    },

    /// A matrix cell names a key the registry has no strategy for
    #[error("Solver {0} is not registered")]
    UnregisteredSolver(SolverKey),

    /// A strategy failed with an unclassified error
    #[error("Solver {solver} failed: {error:#}")]
    SolverFailed {
        solver: SolverKey,
        error: anyhow::Error,
    },

    /// The metadata store could not be read or written
    #[error("Metadata storage error: {0:#}")]
    Storage(anyhow::Error),

    /// An ignore pattern does not compile
    #[error("Invalid ignore pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("File watcher error: {0:#}")]
    Watcher(anyhow::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// A domain-level error propagated from cmisync-core
    #[error("Domain error: {0}")]
    DomainError(#[from] DomainError),
}
