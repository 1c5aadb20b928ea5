//! Things that can be compared.
//!
//! Every input kind answers the same questions: its name (used to match
//! children across sides), cheap identity metadata, its children if it is
//! a container, and its bytes if it is a leaf.

use crate::error::ContentError;
use crate::history::edition::{Edition, StructuredContent};
use crate::history::types::{ContentSource, Revision};
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Metadata available without reading any content
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Identity {
    /// Content identifier of the revision the input was taken from
    pub revision: Option<String>,
    /// Digest of already materialized content
    pub digest: Option<u64>,
}

/// Capabilities the diff builder needs from an input
pub trait CompareInput {
    fn name(&self) -> &str;

    fn identity(&self) -> Identity;

    /// `Ok(None)` for leaves
    fn children(&self) -> Result<Option<Vec<Input>>, ContentError>;

    fn read_content(&self) -> Result<Arc<StructuredContent>, ContentError>;
}

#[derive(Clone)]
pub enum Input {
    /// A file or directory on disk, i.e. the live state
    Local(LocalInput),
    /// One revision of a file from a revision provider
    Historical(HistoricalInput),
    /// An in-memory node, e.g. produced by a structure parser
    External(ExternalInput),
}

impl Input {
    pub fn local(path: impl Into<PathBuf>) -> Self {
        Input::Local(LocalInput::new(path))
    }

    fn inner(&self) -> &dyn CompareInput {
        match self {
            Input::Local(input) => input,
            Input::Historical(input) => input,
            Input::External(input) => input,
        }
    }
}

impl CompareInput for Input {
    fn name(&self) -> &str {
        self.inner().name()
    }

    fn identity(&self) -> Identity {
        self.inner().identity()
    }

    fn children(&self) -> Result<Option<Vec<Input>>, ContentError> {
        self.inner().children()
    }

    fn read_content(&self) -> Result<Arc<StructuredContent>, ContentError> {
        self.inner().read_content()
    }
}

impl fmt::Debug for Input {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self {
            Input::Local(_) => "Local",
            Input::Historical(_) => "Historical",
            Input::External(_) => "External",
        };
        f.debug_struct(kind)
            .field("name", &self.name())
            .field("identity", &self.identity())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct LocalInput {
    path: PathBuf,
    name: String,
}

impl LocalInput {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.to_string_lossy().into_owned());
        Self { path, name }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CompareInput for LocalInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> Identity {
        Identity::default()
    }

    fn children(&self) -> Result<Option<Vec<Input>>, ContentError> {
        if !self.path.is_dir() {
            return Ok(None);
        }

        let unavailable = |e: std::io::Error| ContentError::unavailable(self.path.display().to_string(), e);
        let mut paths = Vec::new();
        for entry in fs::read_dir(&self.path).map_err(unavailable)? {
            paths.push(entry.map_err(unavailable)?.path());
        }
        // directory order is unspecified; expose children by name
        paths.sort();

        Ok(Some(paths.into_iter().map(Input::local).collect()))
    }

    fn read_content(&self) -> Result<Arc<StructuredContent>, ContentError> {
        fs::read(&self.path)
            .map(|bytes| Arc::new(StructuredContent::new(bytes)))
            .map_err(|e| ContentError::unavailable(self.path.display().to_string(), e))
    }
}

/// A revision leaf. Reuses the body of an already materialized edition so
/// the provider isn't asked twice.
#[derive(Clone)]
pub struct HistoricalInput {
    revision: Revision,
    name: String,
    content: Option<Arc<StructuredContent>>,
    source: Arc<dyn ContentSource>,
}

impl HistoricalInput {
    pub fn new(name: impl Into<String>, revision: Revision, source: Arc<dyn ContentSource>) -> Self {
        Self {
            revision,
            name: name.into(),
            content: None,
            source,
        }
    }

    /// `None` for the local edition, which has no revision
    pub fn from_edition(
        name: impl Into<String>,
        edition: &Edition,
        source: Arc<dyn ContentSource>,
    ) -> Option<Self> {
        let revision = edition.revision()?.clone();
        Some(Self {
            revision,
            name: name.into(),
            content: edition.content().cloned(),
            source,
        })
    }

    pub fn revision(&self) -> &Revision {
        &self.revision
    }
}

impl CompareInput for HistoricalInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> Identity {
        Identity {
            revision: Some(self.revision.content_id().to_string()),
            digest: self.content.as_ref().map(|c| c.digest()),
        }
    }

    fn children(&self) -> Result<Option<Vec<Input>>, ContentError> {
        Ok(None)
    }

    fn read_content(&self) -> Result<Arc<StructuredContent>, ContentError> {
        if let Some(content) = &self.content {
            return Ok(Arc::clone(content));
        }
        if !self.revision.exists() {
            return Err(ContentError::Deleted(self.revision.content_id().to_string()));
        }
        self.source
            .read_content(&self.revision)
            .map(|bytes| Arc::new(StructuredContent::new(bytes)))
    }
}

#[derive(Debug, Clone)]
pub struct ExternalInput {
    name: String,
    revision: Option<String>,
    content: Option<Arc<StructuredContent>>,
    children: Option<Vec<Input>>,
}

impl ExternalInput {
    pub fn leaf(name: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            name: name.into(),
            revision: None,
            content: Some(Arc::new(StructuredContent::new(bytes.into()))),
            children: None,
        }
    }

    pub fn container(name: impl Into<String>, children: Vec<Input>) -> Self {
        Self {
            name: name.into(),
            revision: None,
            content: None,
            children: Some(children),
        }
    }

    /// A leaf whose bytes are missing, e.g. a node that failed to parse
    pub fn unreadable(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            revision: None,
            content: None,
            children: None,
        }
    }

    /// Tag the node with the revision it was taken from
    pub fn with_revision(mut self, revision: impl Into<String>) -> Self {
        self.revision = Some(revision.into());
        self
    }
}

impl CompareInput for ExternalInput {
    fn name(&self) -> &str {
        &self.name
    }

    fn identity(&self) -> Identity {
        Identity {
            revision: self.revision.clone(),
            digest: self.content.as_ref().map(|c| c.digest()),
        }
    }

    fn children(&self) -> Result<Option<Vec<Input>>, ContentError> {
        Ok(self.children.clone())
    }

    fn read_content(&self) -> Result<Arc<StructuredContent>, ContentError> {
        self.content
            .clone()
            .ok_or_else(|| ContentError::unavailable(self.name.as_str(), "no content"))
    }
}

impl From<ExternalInput> for Input {
    fn from(input: ExternalInput) -> Self {
        Input::External(input)
    }
}

impl From<HistoricalInput> for Input {
    fn from(input: HistoricalInput) -> Self {
        Input::Historical(input)
    }
}

impl From<LocalInput> for Input {
    fn from(input: LocalInput) -> Self {
        Input::Local(input)
    }
}

/// Result of the metadata-only comparison
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Equal,
    NotEqual,
    Unknown,
}

/// Decides equality from metadata alone when it can
pub trait IdentityComparator: Send + Sync {
    fn compare(&self, left: &Input, right: &Input) -> Verdict;
}

/// Inputs from the same revision are equal; inputs with known, different
/// digests are not.
#[derive(Debug, Clone, Copy, Default)]
pub struct RevisionIdentity;

impl IdentityComparator for RevisionIdentity {
    fn compare(&self, left: &Input, right: &Input) -> Verdict {
        let (left, right) = (left.identity(), right.identity());

        if let (Some(a), Some(b)) = (&left.revision, &right.revision)
            && a == b
        {
            return Verdict::Equal;
        }

        match (left.digest, right.digest) {
            (Some(a), Some(b)) if a != b => Verdict::NotEqual,
            _ => Verdict::Unknown,
        }
    }
}
