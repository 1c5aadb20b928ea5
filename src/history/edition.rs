use super::types::{ContentSource, ResourceId, Revision};
use crate::error::ContentError;
use std::borrow::Cow;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::trace;
use xxhash_rust::xxh64::xxh64;

/// Materialized body of an edition, hashed once for cheap inequality checks
#[derive(Debug, PartialEq, Eq)]
pub struct StructuredContent {
    bytes: Vec<u8>,
    digest: u64,
}

impl StructuredContent {
    pub fn new(bytes: Vec<u8>) -> Self {
        let digest = xxh64(&bytes, 0);
        Self { bytes, digest }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn digest(&self) -> u64 {
        self.digest
    }

    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }

    /// Byte equality; the digest only short-circuits the negative case
    pub fn same_as(&self, other: &StructuredContent) -> bool {
        self.digest == other.digest && self.bytes == other.bytes
    }
}

/// Byte equality of two optional contents. Missing content never equals
/// anything, including other missing content.
pub fn same_content(a: Option<&StructuredContent>, b: Option<&StructuredContent>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.same_as(b),
        _ => false,
    }
}

#[derive(Debug, Clone)]
enum Subject {
    Local(ResourceId),
    Revision(Revision),
}

/// A revision, or the live content of a resource, with a lazily loaded body.
///
/// The body is dropped by `release` and at the latest when the edition is
/// dropped.
#[derive(Debug)]
pub struct Edition {
    subject: Subject,
    content: Option<Arc<StructuredContent>>,
}

impl Edition {
    /// The live state of `resource`
    pub fn local(resource: ResourceId) -> Self {
        Self {
            subject: Subject::Local(resource),
            content: None,
        }
    }

    pub fn for_revision(revision: Revision) -> Self {
        Self {
            subject: Subject::Revision(revision),
            content: None,
        }
    }

    pub fn is_local(&self) -> bool {
        matches!(self.subject, Subject::Local(_))
    }

    pub fn revision(&self) -> Option<&Revision> {
        match &self.subject {
            Subject::Revision(revision) => Some(revision),
            Subject::Local(_) => None,
        }
    }

    /// `None` for the local edition
    pub fn content_id(&self) -> Option<&str> {
        self.revision().map(Revision::content_id)
    }

    pub fn label(&self) -> String {
        match &self.subject {
            Subject::Local(resource) => format!("{} (local)", resource),
            Subject::Revision(revision) => revision.content_id().to_string(),
        }
    }

    pub fn is_materialized(&self) -> bool {
        self.content.is_some()
    }

    pub fn content(&self) -> Option<&Arc<StructuredContent>> {
        self.content.as_ref()
    }

    /// Load the body if it isn't cached yet
    pub fn materialize<S: ContentSource + ?Sized>(
        &mut self,
        source: &S,
    ) -> Result<Arc<StructuredContent>, ContentError> {
        if let Some(content) = &self.content {
            return Ok(Arc::clone(content));
        }

        let bytes = match &self.subject {
            Subject::Local(resource) => source.read_local(resource)?,
            Subject::Revision(revision) if !revision.exists() => {
                return Err(ContentError::Deleted(revision.content_id().to_string()));
            }
            Subject::Revision(revision) => source.read_content(revision)?,
        };

        let content = Arc::new(StructuredContent::new(bytes));
        self.content = Some(Arc::clone(&content));
        Ok(content)
    }

    pub fn release(&mut self) {
        if self.content.take().is_some() {
            trace!("Released edition {}", self.label());
        }
    }

    pub fn same_content(&self, other: &Edition) -> bool {
        same_content(self.content.as_deref(), other.content.as_deref())
    }
}

impl Drop for Edition {
    fn drop(&mut self) {
        self.release();
    }
}

/// Revision to edition mapping owned by a history session.
///
/// Filled by the deduplicator and read by the diff builder so bodies are
/// loaded once per refresh.
#[derive(Debug, Default)]
pub struct EditionMap {
    entries: Vec<Edition>,
    index: HashMap<String, usize>,
}

impl EditionMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an edition for a revision; a previous edition for the same
    /// revision is released and replaced.
    pub fn insert(&mut self, edition: Edition) {
        let Some(key) = edition.content_id().map(str::to_string) else {
            return;
        };

        match self.index.get(&key) {
            Some(&slot) => self.entries[slot] = edition,
            None => {
                self.index.insert(key, self.entries.len());
                self.entries.push(edition);
            }
        }
    }

    pub fn get(&self, content_id: &str) -> Option<&Edition> {
        self.index.get(content_id).map(|&slot| &self.entries[slot])
    }

    pub fn get_mut(&mut self, content_id: &str) -> Option<&mut Edition> {
        let slot = *self.index.get(content_id)?;
        self.entries.get_mut(slot)
    }

    pub fn contains(&self, content_id: &str) -> bool {
        self.index.contains_key(content_id)
    }

    /// Editions paired with their revisions, in insertion order
    pub fn iter(&self) -> impl Iterator<Item = (&Revision, &Edition)> {
        self.entries
            .iter()
            .filter_map(|edition| edition.revision().map(|revision| (revision, edition)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Release every cached body and forget all editions
    pub fn clear(&mut self) {
        self.entries.clear();
        self.index.clear();
    }
}
