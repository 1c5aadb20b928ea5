use crate::error::{ContentError, FetchError};
use crate::progress::CancelToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// Identity of one versioned resource inside a provider
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ResourceId(String);

impl ResourceId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Opaque key a provider uses to find a revision's bytes
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentHandle(String);

impl ContentHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// One historical state of a resource.
///
/// Two revisions with the same content identifier are the same revision,
/// whatever the rest of their metadata says.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Revision {
    content_id: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    comment: String,
    /// Milliseconds on the resource clock
    timestamp: i64,
    #[serde(default = "default_exists")]
    exists: bool,
    handle: ContentHandle,
}

fn default_exists() -> bool {
    true
}

impl Revision {
    pub fn new(content_id: impl Into<String>, timestamp: i64, handle: ContentHandle) -> Self {
        Self {
            content_id: content_id.into(),
            author: String::new(),
            comment: String::new(),
            timestamp,
            exists: true,
            handle,
        }
    }

    pub fn with_author(mut self, author: impl Into<String>) -> Self {
        self.author = author.into();
        self
    }

    pub fn with_comment(mut self, comment: impl Into<String>) -> Self {
        self.comment = comment.into();
        self
    }

    /// Mark this revision as the deletion of the resource
    pub fn deleted(mut self) -> Self {
        self.exists = false;
        self
    }

    pub fn content_id(&self) -> &str {
        &self.content_id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn comment(&self) -> &str {
        &self.comment
    }

    pub fn timestamp(&self) -> i64 {
        self.timestamp
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn handle(&self) -> &ContentHandle {
        &self.handle
    }

    /// Timestamp as a UTC instant, `None` when out of chrono's range
    pub fn datetime(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp_millis(self.timestamp)
    }
}

impl PartialEq for Revision {
    fn eq(&self, other: &Self) -> bool {
        self.content_id == other.content_id
    }
}

impl Eq for Revision {}

impl Hash for Revision {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.content_id.hash(state);
    }
}

/// Immutable snapshot of every revision a provider knows for one resource
#[derive(Debug, Clone)]
pub struct RevisionSet {
    resource: ResourceId,
    revisions: Arc<[Revision]>,
}

impl RevisionSet {
    pub fn new(resource: ResourceId, revisions: Vec<Revision>) -> Self {
        Self {
            resource,
            revisions: revisions.into(),
        }
    }

    pub fn empty(resource: ResourceId) -> Self {
        Self::new(resource, Vec::new())
    }

    pub fn resource(&self) -> &ResourceId {
        &self.resource
    }

    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn find(&self, content_id: &str) -> Option<&Revision> {
        self.revisions.iter().find(|r| r.content_id() == content_id)
    }
}

/// Supplies revision bytes and the live content of a resource
pub trait ContentSource: Send + Sync {
    fn read_content(&self, revision: &Revision) -> Result<Vec<u8>, ContentError>;

    fn read_local(&self, resource: &ResourceId) -> Result<Vec<u8>, ContentError>;
}

/// The revision-storage collaborator a history session is bound to
pub trait RevisionProvider: ContentSource {
    fn fetch_revisions(
        &self,
        resource: &ResourceId,
        cancel: &CancelToken,
    ) -> Result<RevisionSet, FetchError>;

    /// Whatever can still be listed when the full fetch failed
    fn fetch_local_only(&self, resource: &ResourceId) -> RevisionSet {
        RevisionSet::empty(resource.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_revision_identity_is_content_id() {
        let a = Revision::new("1.1", 10, ContentHandle::new("aaa")).with_author("ann");
        let b = Revision::new("1.1", 99, ContentHandle::new("bbb")).with_comment("other");
        let c = Revision::new("1.2", 10, ContentHandle::new("aaa"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_revision_deserializes_with_defaults() {
        let json = r#"{"content_id":"r1","timestamp":5,"handle":"abc"}"#;
        let revision: Revision = serde_json::from_str(json).unwrap();
        assert!(revision.exists());
        assert_eq!(revision.author(), "");
        assert_eq!(revision.handle().as_str(), "abc");
    }

    #[test]
    fn test_revision_set_find() {
        let set = RevisionSet::new(
            ResourceId::new("doc"),
            vec![
                Revision::new("r1", 1, ContentHandle::new("a")),
                Revision::new("r2", 2, ContentHandle::new("b")),
            ],
        );
        assert_eq!(set.len(), 2);
        assert_eq!(set.find("r2").map(|r| r.timestamp()), Some(2));
        assert!(set.find("r3").is_none());
    }
}
