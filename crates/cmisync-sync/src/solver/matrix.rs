//! Solver dispatch matrix and registry
//!
//! The matrix is a 6×6 table indexed by (local situation, remote situation).
//! Cells hold [`SolverKey`]s rather than strategy references; the
//! [`SolverRegistry`] maps each key to exactly one strategy instance, so
//! cells that share a key share the strategy.
//!
//! ## Standard layout
//!
//! ```text
//! local \ remote  NoChange            Added                    Changed                  Renamed                   Moved                    Removed
//! NoChange        NothingToDo         RemoteObjectAdded        RemoteObjectChanged      RemoteObjectRenamed       RemoteObjectMoved        RemoteObjectDeleted
//! Added           LocalObjectAdded    ConflictingContent       ConflictingContent       RemoteRenamedThenContent  RemoteMovedThenContent   LocalObjectAdded
//! Changed         LocalObjectChanged  ConflictingContent       ConflictingContent       RemoteRenamedThenContent  RemoteMovedThenContent   LocalObjectAdded
//! Renamed         LocalObjectRenamed  LocalRenamedThenContent  LocalRenamedThenContent  BothRenamedOrMoved        BothRenamedOrMoved       LocalObjectAdded
//! Moved           LocalObjectMoved    LocalMovedThenContent    LocalMovedThenContent    BothRenamedOrMoved        BothRenamedOrMoved       LocalObjectAdded
//! Removed         LocalObjectDeleted  RemoteObjectAdded        RemoteObjectAdded        RemoteObjectAdded         RemoteObjectAdded        BothDeleted
//! ```
//!
//! No combination is treated as unreachable: all 36 cells are assigned,
//! `(NoChange, NoChange)` included. A cell left empty by a custom matrix is
//! reported by the mechanism as a fatal dispatch failure.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use cmisync_core::domain::SituationType;
use serde::Serialize;

use super::both::{BothDeleted, BothRenamedOrMoved, NothingToDo};
use super::local::{
    LocalObjectAdded, LocalObjectChanged, LocalObjectDeleted, LocalObjectMoved,
    LocalObjectRenamed,
};
use super::remote::{
    RemoteObjectAdded, RemoteObjectChanged, RemoteObjectDeleted, RemoteObjectMoved,
    RemoteObjectRenamed,
};
use super::{ConflictingContent, PathStepThenContent, Solver, SolverContext};

// ============================================================================
// SolverKey
// ============================================================================

/// Registry key naming one resolution strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SolverKey {
    NothingToDo,
    LocalObjectAdded,
    LocalObjectChanged,
    LocalObjectRenamed,
    LocalObjectMoved,
    LocalObjectDeleted,
    RemoteObjectAdded,
    RemoteObjectChanged,
    RemoteObjectRenamed,
    RemoteObjectMoved,
    RemoteObjectDeleted,
    ConflictingContent,
    LocalRenamedThenContent,
    LocalMovedThenContent,
    RemoteRenamedThenContent,
    RemoteMovedThenContent,
    BothRenamedOrMoved,
    BothDeleted,
}

impl SolverKey {
    pub const ALL: [SolverKey; 18] = [
        SolverKey::NothingToDo,
        SolverKey::LocalObjectAdded,
        SolverKey::LocalObjectChanged,
        SolverKey::LocalObjectRenamed,
        SolverKey::LocalObjectMoved,
        SolverKey::LocalObjectDeleted,
        SolverKey::RemoteObjectAdded,
        SolverKey::RemoteObjectChanged,
        SolverKey::RemoteObjectRenamed,
        SolverKey::RemoteObjectMoved,
        SolverKey::RemoteObjectDeleted,
        SolverKey::ConflictingContent,
        SolverKey::LocalRenamedThenContent,
        SolverKey::LocalMovedThenContent,
        SolverKey::RemoteRenamedThenContent,
        SolverKey::RemoteMovedThenContent,
        SolverKey::BothRenamedOrMoved,
        SolverKey::BothDeleted,
    ];

    /// Snake-case name, used as metric label and log field
    pub const fn name(self) -> &'static str {
        match self {
            SolverKey::NothingToDo => "nothing_to_do",
            SolverKey::LocalObjectAdded => "local_object_added",
            SolverKey::LocalObjectChanged => "local_object_changed",
            SolverKey::LocalObjectRenamed => "local_object_renamed",
            SolverKey::LocalObjectMoved => "local_object_moved",
            SolverKey::LocalObjectDeleted => "local_object_deleted",
            SolverKey::RemoteObjectAdded => "remote_object_added",
            SolverKey::RemoteObjectChanged => "remote_object_changed",
            SolverKey::RemoteObjectRenamed => "remote_object_renamed",
            SolverKey::RemoteObjectMoved => "remote_object_moved",
            SolverKey::RemoteObjectDeleted => "remote_object_deleted",
            SolverKey::ConflictingContent => "conflicting_content",
            SolverKey::LocalRenamedThenContent => "local_renamed_then_content",
            SolverKey::LocalMovedThenContent => "local_moved_then_content",
            SolverKey::RemoteRenamedThenContent => "remote_renamed_then_content",
            SolverKey::RemoteMovedThenContent => "remote_moved_then_content",
            SolverKey::BothRenamedOrMoved => "both_renamed_or_moved",
            SolverKey::BothDeleted => "both_deleted",
        }
    }
}

impl fmt::Display for SolverKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

// ============================================================================
// SolverMatrix
// ============================================================================

const N: usize = SituationType::COUNT;

/// (local, remote) → solver key table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SolverMatrix {
    cells: [[Option<SolverKey>; N]; N],
}

impl SolverMatrix {
    /// A matrix with no cell assigned
    pub fn empty() -> Self {
        Self {
            cells: [[None; N]; N],
        }
    }

    /// The fully populated production matrix
    pub fn standard() -> Self {
        use SituationType as S;
        use SolverKey as K;

        let mut m = Self::empty();

        // Row: nothing happened locally
        m.assign(S::NoChange, S::NoChange, K::NothingToDo);
        m.assign(S::NoChange, S::Added, K::RemoteObjectAdded);
        m.assign(S::NoChange, S::Changed, K::RemoteObjectChanged);
        m.assign(S::NoChange, S::Renamed, K::RemoteObjectRenamed);
        m.assign(S::NoChange, S::Moved, K::RemoteObjectMoved);
        m.assign(S::NoChange, S::Removed, K::RemoteObjectDeleted);

        // Rows: local content exists and may differ
        for local in [S::Added, S::Changed] {
            m.assign(local, S::Added, K::ConflictingContent);
            m.assign(local, S::Changed, K::ConflictingContent);
            m.assign(local, S::Renamed, K::RemoteRenamedThenContent);
            m.assign(local, S::Moved, K::RemoteMovedThenContent);
            m.assign(local, S::Removed, K::LocalObjectAdded);
        }
        m.assign(S::Added, S::NoChange, K::LocalObjectAdded);
        m.assign(S::Changed, S::NoChange, K::LocalObjectChanged);

        // Rows: local path changed
        m.assign(S::Renamed, S::NoChange, K::LocalObjectRenamed);
        m.assign(S::Moved, S::NoChange, K::LocalObjectMoved);
        for remote in [S::Added, S::Changed] {
            m.assign(S::Renamed, remote, K::LocalRenamedThenContent);
            m.assign(S::Moved, remote, K::LocalMovedThenContent);
        }
        for local in [S::Renamed, S::Moved] {
            m.assign(local, S::Renamed, K::BothRenamedOrMoved);
            m.assign(local, S::Moved, K::BothRenamedOrMoved);
            m.assign(local, S::Removed, K::LocalObjectAdded);
        }

        // Row: deleted locally; anything the remote still has comes back
        m.assign(S::Removed, S::NoChange, K::LocalObjectDeleted);
        for remote in [S::Added, S::Changed, S::Renamed, S::Moved] {
            m.assign(S::Removed, remote, K::RemoteObjectAdded);
        }
        m.assign(S::Removed, S::Removed, K::BothDeleted);

        m
    }

    pub fn assign(&mut self, local: SituationType, remote: SituationType, key: SolverKey) {
        self.cells[local.index()][remote.index()] = Some(key);
    }

    pub fn get(&self, local: SituationType, remote: SituationType) -> Option<SolverKey> {
        self.cells[local.index()][remote.index()]
    }

    /// Cells without an assigned key, in row-major order
    pub fn missing_cells(&self) -> Vec<(SituationType, SituationType)> {
        SituationType::ALL
            .iter()
            .flat_map(|&local| SituationType::ALL.iter().map(move |&remote| (local, remote)))
            .filter(|&(local, remote)| self.get(local, remote).is_none())
            .collect()
    }

    /// Whether every (local, remote) pair has a key
    ///
    /// The standard matrix has no unreachable subset, so it is always
    /// complete; an empty cell is a coverage defect, never an expected gap.
    pub fn is_complete(&self) -> bool {
        self.missing_cells().is_empty()
    }
}

impl Default for SolverMatrix {
    fn default() -> Self {
        Self::standard()
    }
}

// ============================================================================
// SolverRegistry
// ============================================================================

/// Maps each solver key to its single strategy instance
#[derive(Default, Clone)]
pub struct SolverRegistry {
    solvers: HashMap<SolverKey, Arc<dyn Solver>>,
}

impl SolverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a strategy, replacing any previous one for the key
    pub fn register(&mut self, key: SolverKey, solver: Arc<dyn Solver>) {
        self.solvers.insert(key, solver);
    }

    pub fn get(&self, key: SolverKey) -> Option<Arc<dyn Solver>> {
        self.solvers.get(&key).cloned()
    }

    pub fn contains(&self, key: SolverKey) -> bool {
        self.solvers.contains_key(&key)
    }

    /// Registers the production strategy for every key
    ///
    /// The composite keys reuse the same `ConflictingContent` instance as
    /// their content step.
    pub fn standard(ctx: SolverContext) -> Self {
        let conflicting = Arc::new(ConflictingContent::new(ctx.clone()));
        let local_renamed = Arc::new(LocalObjectRenamed::new(ctx.clone()));
        let local_moved = Arc::new(LocalObjectMoved::new(ctx.clone()));
        let remote_renamed_step = Arc::new(RemoteObjectRenamed::new(ctx.clone()).path_only());
        let remote_moved_step = Arc::new(RemoteObjectMoved::new(ctx.clone()).path_only());

        let mut registry = Self::new();
        registry.register(SolverKey::NothingToDo, Arc::new(NothingToDo::new(ctx.clone())));
        registry.register(SolverKey::LocalObjectAdded, Arc::new(LocalObjectAdded::new(ctx.clone())));
        registry.register(
            SolverKey::LocalObjectChanged,
            Arc::new(LocalObjectChanged::new(ctx.clone())),
        );
        registry.register(SolverKey::LocalObjectRenamed, local_renamed.clone());
        registry.register(SolverKey::LocalObjectMoved, local_moved.clone());
        registry.register(
            SolverKey::LocalObjectDeleted,
            Arc::new(LocalObjectDeleted::new(ctx.clone())),
        );
        registry.register(
            SolverKey::RemoteObjectAdded,
            Arc::new(RemoteObjectAdded::new(ctx.clone())),
        );
        registry.register(
            SolverKey::RemoteObjectChanged,
            Arc::new(RemoteObjectChanged::new(ctx.clone())),
        );
        registry.register(
            SolverKey::RemoteObjectRenamed,
            Arc::new(RemoteObjectRenamed::new(ctx.clone())),
        );
        registry.register(
            SolverKey::RemoteObjectMoved,
            Arc::new(RemoteObjectMoved::new(ctx.clone())),
        );
        registry.register(
            SolverKey::RemoteObjectDeleted,
            Arc::new(RemoteObjectDeleted::new(ctx.clone())),
        );
        registry.register(SolverKey::ConflictingContent, conflicting.clone());
        registry.register(
            SolverKey::LocalRenamedThenContent,
            Arc::new(PathStepThenContent::new(ctx.clone(), local_renamed, conflicting.clone())),
        );
        registry.register(
            SolverKey::LocalMovedThenContent,
            Arc::new(PathStepThenContent::new(ctx.clone(), local_moved, conflicting.clone())),
        );
        registry.register(
            SolverKey::RemoteRenamedThenContent,
            Arc::new(PathStepThenContent::new(
                ctx.clone(),
                remote_renamed_step,
                conflicting.clone(),
            )),
        );
        registry.register(
            SolverKey::RemoteMovedThenContent,
            Arc::new(PathStepThenContent::new(ctx.clone(), remote_moved_step, conflicting)),
        );
        registry.register(
            SolverKey::BothRenamedOrMoved,
            Arc::new(BothRenamedOrMoved::new(ctx.clone())),
        );
        registry.register(SolverKey::BothDeleted, Arc::new(BothDeleted::new(ctx)));
        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use SituationType as S;

    #[test]
    fn test_standard_matrix_is_complete() {
        let matrix = SolverMatrix::standard();
        assert!(matrix.is_complete());
        assert!(matrix.missing_cells().is_empty());
        for &local in SituationType::ALL.iter() {
            for &remote in SituationType::ALL.iter() {
                assert!(matrix.get(local, remote).is_some(), "{local}/{remote}");
            }
        }
        assert_eq!(matrix.get(S::NoChange, S::NoChange), Some(SolverKey::NothingToDo));
    }

    #[test]
    fn test_empty_matrix_reports_every_cell() {
        let matrix = SolverMatrix::empty();
        assert_eq!(matrix.missing_cells().len(), 36);
        assert_eq!(matrix.missing_cells()[0], (S::NoChange, S::NoChange));
    }

    #[test]
    fn test_content_cells_share_one_key() {
        let matrix = SolverMatrix::standard();
        for local in [S::Added, S::Changed] {
            for remote in [S::Added, S::Changed] {
                assert_eq!(matrix.get(local, remote), Some(SolverKey::ConflictingContent));
            }
        }
    }

    #[test]
    fn test_selected_cells() {
        let matrix = SolverMatrix::standard();
        assert_eq!(matrix.get(S::NoChange, S::NoChange), Some(SolverKey::NothingToDo));
        assert_eq!(matrix.get(S::Renamed, S::Changed), Some(SolverKey::LocalRenamedThenContent));
        assert_eq!(matrix.get(S::Changed, S::Moved), Some(SolverKey::RemoteMovedThenContent));
        assert_eq!(matrix.get(S::Moved, S::Renamed), Some(SolverKey::BothRenamedOrMoved));
        assert_eq!(matrix.get(S::Removed, S::Changed), Some(SolverKey::RemoteObjectAdded));
        assert_eq!(matrix.get(S::Changed, S::Removed), Some(SolverKey::LocalObjectAdded));
        assert_eq!(matrix.get(S::Removed, S::Removed), Some(SolverKey::BothDeleted));
    }

    #[test]
    fn test_assign_overrides_cell() {
        let mut matrix = SolverMatrix::empty();
        matrix.assign(S::Added, S::NoChange, SolverKey::NothingToDo);
        matrix.assign(S::Added, S::NoChange, SolverKey::LocalObjectAdded);
        assert_eq!(matrix.get(S::Added, S::NoChange), Some(SolverKey::LocalObjectAdded));
        assert_eq!(matrix.missing_cells().len(), 35);
    }

    #[test]
    fn test_key_names_are_unique() {
        let mut names: Vec<&str> = SolverKey::ALL.iter().map(|k| k.name()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), SolverKey::ALL.len());
    }
}
