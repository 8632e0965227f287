//! Situation classification shared by both sides of a canonical event

use std::fmt;

use serde::{Deserialize, Serialize};

/// What happened to one side (local or remote) of a synchronized object
///
/// Both situation detectors use this vocabulary, and the dispatch matrix is
/// indexed by a `(local, remote)` pair of it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SituationType {
    /// Nothing relevant changed on this side
    NoChange,
    /// The object is new on this side
    Added,
    /// The content (or metadata) of the object changed
    Changed,
    /// The object got a new name within the same parent
    Renamed,
    /// The object got a new parent
    Moved,
    /// The object disappeared from this side
    Removed,
}

impl SituationType {
    /// Every situation, in matrix index order
    pub const ALL: [SituationType; 6] = [
        SituationType::NoChange,
        SituationType::Added,
        SituationType::Changed,
        SituationType::Renamed,
        SituationType::Moved,
        SituationType::Removed,
    ];

    /// Number of situations (one matrix dimension)
    pub const COUNT: usize = Self::ALL.len();

    /// Position of this situation in [`SituationType::ALL`]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            SituationType::NoChange => 0,
            SituationType::Added => 1,
            SituationType::Changed => 2,
            SituationType::Renamed => 3,
            SituationType::Moved => 4,
            SituationType::Removed => 5,
        }
    }

    /// Stable snake_case name, used in logs and metric labels
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            SituationType::NoChange => "no_change",
            SituationType::Added => "added",
            SituationType::Changed => "changed",
            SituationType::Renamed => "renamed",
            SituationType::Moved => "moved",
            SituationType::Removed => "removed",
        }
    }
}

impl fmt::Display for SituationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
