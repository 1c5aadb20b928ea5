use thiserror::Error;

/// Bytes for one edition could not be materialized. Always recoverable:
/// the edition compares as different from everything.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ContentError {
    #[error("Revision {0} records a deletion and has no content")]
    Deleted(String),

    #[error("Content unavailable for {subject}: {reason}")]
    Unavailable { subject: String, reason: String },
}

impl ContentError {
    pub fn unavailable(subject: impl Into<String>, reason: impl ToString) -> Self {
        Self::Unavailable {
            subject: subject.into(),
            reason: reason.to_string(),
        }
    }
}

/// The storage provider could not produce a revision set. Retryable on the
/// next refresh.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchError {
    #[error("History for {resource} could not be fetched: {reason}")]
    Provider { resource: String, reason: String },

    #[error("Fetch was cancelled")]
    Cancelled,
}

/// Cooperative cancellation was observed. Not an error, a distinct outcome.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("Operation cancelled")]
pub struct Cancelled;

/// A diff was requested for editions the session doesn't know
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    #[error("Unknown revision {0}")]
    UnknownRevision(String),

    #[error(transparent)]
    Content(#[from] ContentError),
}
