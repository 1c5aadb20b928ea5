//! Comparing editions: line diffs for a single pair of texts and structural
//! diff trees for hierarchical inputs.

pub mod input;
pub mod job;
pub mod lines;
pub mod stats;
pub mod tree;
pub mod types;

pub use input::{CompareInput, IdentityComparator, Input, RevisionIdentity, Verdict};
pub use job::{DiffJob, spawn_diff};
pub use stats::DiffStats;
pub use tree::{ContentFailure, DiffNode, DiffOutcome, DiffTree, DiffTreeBuilder};
pub use types::{DiffKind, DiffLine, DiffLineType, DiffRow, Direction};
