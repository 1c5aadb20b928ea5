//! Revision history of one resource: fetching, collapsing duplicates,
//! grouping by date and remembering what was shown.

pub mod category;
pub mod dedupe;
pub mod edition;
pub mod filter;
pub mod navigation;
pub mod refresh;
pub mod types;

pub use category::{Bucket, Category, categorize};
pub use edition::{Edition, EditionMap, StructuredContent};
pub use filter::HistoryFilter;
pub use navigation::{NavigationEntry, NavigationHistory};
pub use refresh::{Clock, HistorySnapshot, RefreshCoordinator, RefreshOptions, RefreshState, RefreshStatus};
pub use types::{ContentHandle, ContentSource, ResourceId, Revision, RevisionProvider, RevisionSet};
