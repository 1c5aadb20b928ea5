/// Application name and metadata constants
pub const APP_QUALIFIER: &str = "com";
pub const APP_ORGANIZATION: &str = "HistoryLens";
pub const APP_NAME: &str = "History Lens";

/// Store layout
pub const BLOB_DIR: &str = "blobs";
pub const HISTORY_DIR: &str = "history";

/// Navigation trail capacity
pub const MAX_NAVIGATION_ENTRIES: usize = 15;

/// Diffs touching more nodes than this run as a background job
pub const DEFAULT_BACKGROUND_DIFF_THRESHOLD: usize = 200;

/// Category labels
pub const CATEGORY_TODAY: &str = "Today";
pub const CATEGORY_YESTERDAY: &str = "Yesterday";
pub const CATEGORY_THIS_MONTH: &str = "This Month";
pub const CATEGORY_PREVIOUS: &str = "Previous";
pub const NO_REVISIONS_MESSAGE: &str = "No revisions found";
