use crate::config::Config;
use crate::constant::{BLOB_DIR, HISTORY_DIR};
use crate::error::{ContentError, FetchError};
use crate::history::types::{
    ContentHandle, ContentSource, ResourceId, Revision, RevisionProvider, RevisionSet,
};
use crate::progress::CancelToken;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{debug, info};
use xxhash_rust::xxh64::xxh64;

/// Custom error types for the backend
#[derive(Error, Debug)]
pub enum BackendError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid hash: {0}")]
    InvalidHash(String),

    #[error("No history recorded for {0}")]
    UnknownResource(String),
}

/// Represents a single version entry in the history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub id: String,
    /// Blob hash, empty for deletions
    pub hash: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub comment: String,
    #[serde(default = "default_exists")]
    pub exists: bool,
}

fn default_exists() -> bool {
    true
}

impl HistoryEntry {
    pub fn to_revision(&self) -> Revision {
        let revision = Revision::new(
            self.id.as_str(),
            self.timestamp.timestamp_millis(),
            ContentHandle::new(self.hash.as_str()),
        )
        .with_author(self.author.as_str())
        .with_comment(self.comment.as_str());

        if self.exists {
            revision
        } else {
            revision.deleted()
        }
    }
}

/// Per-resource index file
#[derive(Debug, Serialize, Deserialize)]
struct HistoryFile {
    path: PathBuf,
    entries: Vec<HistoryEntry>,
}

/// Content-addressable local history: blobs keyed by content hash plus one
/// JSON index per tracked file
pub struct LocalHistoryStore {
    data_dir: PathBuf,
    blobs_dir: PathBuf,
    history_dir: PathBuf,
}

impl LocalHistoryStore {
    /// Open the store in the configured data directory
    pub fn new(config: &Config) -> Result<Self, BackendError> {
        Self::open(config.data_dir())
    }

    /// Open (creating if needed) a store rooted at `data_dir`
    pub fn open(data_dir: impl Into<PathBuf>) -> Result<Self, BackendError> {
        let data_dir = data_dir.into();
        let blobs_dir = data_dir.join(BLOB_DIR);
        let history_dir = data_dir.join(HISTORY_DIR);

        fs::create_dir_all(&blobs_dir)?;
        fs::create_dir_all(&history_dir)?;
        debug!("Opened history store at {:?}", data_dir);

        Ok(Self {
            data_dir,
            blobs_dir,
            history_dir,
        })
    }

    /// Calculate XXHash64 of content and return as hex string
    fn calculate_hash(content: &[u8]) -> String {
        format!("{:016x}", xxh64(content, 0))
    }

    /// Resource id of a tracked file: the hash of its path
    pub fn resource_id(path: &Path) -> ResourceId {
        ResourceId::new(Self::calculate_hash(path.to_string_lossy().as_bytes()))
    }

    /// Save blob to storage if it doesn't already exist (deduplication)
    fn save_blob(&self, hash: &str, content: &[u8]) -> Result<(), BackendError> {
        let blob_path = self.blobs_dir.join(hash);
        if !blob_path.exists() {
            fs::write(blob_path, content)?;
        }
        Ok(())
    }

    fn history_path(&self, resource: &ResourceId) -> PathBuf {
        self.history_dir.join(format!("{}.json", resource))
    }

    fn load_file(&self, resource: &ResourceId) -> Result<Option<HistoryFile>, BackendError> {
        let history_path = self.history_path(resource);
        if !history_path.exists() {
            return Ok(None);
        }
        let content = fs::read_to_string(history_path)?;
        Ok(Some(serde_json::from_str(&content)?))
    }

    fn save_file(&self, resource: &ResourceId, file: &HistoryFile) -> Result<(), BackendError> {
        let content = serde_json::to_string_pretty(file)?;
        fs::write(self.history_path(resource), content)?;
        Ok(())
    }

    fn append(
        &self,
        path: &Path,
        hash: String,
        exists: bool,
        author: &str,
        comment: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Revision, BackendError> {
        let resource = Self::resource_id(path);
        let mut file = self.load_file(&resource)?.unwrap_or_else(|| HistoryFile {
            path: path.to_path_buf(),
            entries: Vec::new(),
        });

        let entry = HistoryEntry {
            id: format!("r{}", file.entries.len() + 1),
            hash,
            timestamp,
            author: author.to_string(),
            comment: comment.to_string(),
            exists,
        };
        let revision = entry.to_revision();
        file.entries.push(entry);
        self.save_file(&resource, &file)?;

        info!("Recorded {} of {:?}", revision.content_id(), path);
        Ok(revision)
    }

    /// Record `content` as the newest revision of `path`
    pub fn save(
        &self,
        path: &Path,
        content: &[u8],
        author: &str,
        comment: &str,
    ) -> Result<Revision, BackendError> {
        self.save_at(path, content, author, comment, Utc::now())
    }

    /// Like `save`, with an explicit time (e.g. when importing old versions)
    pub fn save_at(
        &self,
        path: &Path,
        content: &[u8],
        author: &str,
        comment: &str,
        timestamp: DateTime<Utc>,
    ) -> Result<Revision, BackendError> {
        let hash = Self::calculate_hash(content);
        self.save_blob(&hash, content)?;
        self.append(path, hash, true, author, comment, timestamp)
    }

    /// Record that `path` was deleted
    pub fn record_deletion(
        &self,
        path: &Path,
        author: &str,
        comment: &str,
    ) -> Result<Revision, BackendError> {
        self.append(path, String::new(), false, author, comment, Utc::now())
    }

    /// Load version history for a file, oldest first
    pub fn load_history(&self, path: &Path) -> Result<Vec<HistoryEntry>, BackendError> {
        Ok(self
            .load_file(&Self::resource_id(path))?
            .map(|file| file.entries)
            .unwrap_or_default())
    }

    /// All revisions of a resource
    pub fn revisions(&self, resource: &ResourceId) -> Result<RevisionSet, BackendError> {
        let entries = self
            .load_file(resource)?
            .map(|file| file.entries)
            .unwrap_or_default();
        Ok(RevisionSet::new(
            resource.clone(),
            entries.iter().map(HistoryEntry::to_revision).collect(),
        ))
    }

    /// Restore content from a specific hash
    pub fn restore_version(&self, hash: &str) -> Result<Vec<u8>, BackendError> {
        let blob_path = self.blobs_dir.join(hash);
        if hash.is_empty() || !blob_path.exists() {
            return Err(BackendError::InvalidHash(format!(
                "Blob not found for hash: {}",
                hash
            )));
        }
        Ok(fs::read(blob_path)?)
    }

    /// Path of the tracked file behind `resource`
    pub fn tracked_path(&self, resource: &ResourceId) -> Result<PathBuf, BackendError> {
        self.load_file(resource)?
            .map(|file| file.path)
            .ok_or_else(|| BackendError::UnknownResource(resource.to_string()))
    }

    /// Get the data directory path
    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }
}

impl ContentSource for LocalHistoryStore {
    fn read_content(&self, revision: &Revision) -> Result<Vec<u8>, ContentError> {
        if !revision.exists() {
            return Err(ContentError::Deleted(revision.content_id().to_string()));
        }
        self.restore_version(revision.handle().as_str())
            .map_err(|e| ContentError::unavailable(revision.content_id(), e))
    }

    fn read_local(&self, resource: &ResourceId) -> Result<Vec<u8>, ContentError> {
        let path = self
            .tracked_path(resource)
            .map_err(|e| ContentError::unavailable(resource.as_str(), e))?;
        fs::read(&path).map_err(|e| ContentError::unavailable(path.display().to_string(), e))
    }
}

impl RevisionProvider for LocalHistoryStore {
    fn fetch_revisions(
        &self,
        resource: &ResourceId,
        cancel: &CancelToken,
    ) -> Result<RevisionSet, FetchError> {
        if cancel.is_cancelled() {
            return Err(FetchError::Cancelled);
        }
        self.revisions(resource).map_err(|e| FetchError::Provider {
            resource: resource.to_string(),
            reason: e.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn setup_test_store() -> (LocalHistoryStore, PathBuf) {
        let test_dir = std::env::temp_dir().join(format!("test_backend_{}", Uuid::new_v4()));
        let store = LocalHistoryStore::open(&test_dir).unwrap();
        (store, test_dir)
    }

    fn cleanup_test_dir(test_dir: &Path) {
        let _ = fs::remove_dir_all(test_dir);
    }

    #[test]
    fn test_hash_calculation() {
        let hash1 = LocalHistoryStore::calculate_hash(b"Hello, World!");
        let hash2 = LocalHistoryStore::calculate_hash(b"Hello, World!");
        let hash3 = LocalHistoryStore::calculate_hash(b"Different content");

        assert_eq!(hash1, hash2, "Same content should produce same hash");
        assert_ne!(hash1, hash3, "Different content should produce different hash");
        assert_eq!(hash1.len(), 16, "Hash should be 16 hex characters");
    }

    #[test]
    fn test_blob_storage_is_deduplicated() {
        let (store, test_dir) = setup_test_store();
        let test_file = test_dir.join("notes.txt");

        store.save(&test_file, b"same", "", "").unwrap();
        store.save(&test_file, b"same", "", "").unwrap();

        let blobs = fs::read_dir(&store.blobs_dir).unwrap().count();
        assert_eq!(blobs, 1, "Identical content should share one blob");
        assert_eq!(store.load_history(&test_file).unwrap().len(), 2);

        cleanup_test_dir(&test_dir);
    }

    #[test]
    fn test_full_save_workflow() {
        let (store, test_dir) = setup_test_store();
        let test_file = test_dir.join("test_file.txt");
        fs::write(&test_file, "Version 2 content").unwrap();

        let first = store
            .save(&test_file, b"Version 1 content", "ada", "first draft")
            .unwrap();
        let second = store
            .save(&test_file, b"Version 2 content", "ada", "")
            .unwrap();
        assert_eq!(first.content_id(), "r1");
        assert_eq!(second.content_id(), "r2");

        let resource = LocalHistoryStore::resource_id(&test_file);
        let set = store
            .fetch_revisions(&resource, &CancelToken::new())
            .unwrap();
        assert_eq!(set.len(), 2);
        assert_eq!(set.find("r1").unwrap().comment(), "first draft");

        assert_eq!(store.read_content(&first).unwrap(), b"Version 1 content");
        assert_eq!(store.read_local(&resource).unwrap(), b"Version 2 content");
        assert_eq!(store.data_dir(), test_dir.as_path());

        cleanup_test_dir(&test_dir);
    }

    #[test]
    fn test_save_at_keeps_the_given_time() {
        let (store, test_dir) = setup_test_store();
        let test_file = test_dir.join("imported.txt");
        let at = DateTime::parse_from_rfc3339("2023-11-02T08:30:00Z")
            .unwrap()
            .with_timezone(&Utc);

        let revision = store.save_at(&test_file, b"old", "", "import", at).unwrap();

        assert_eq!(revision.datetime(), Some(at));
        assert_eq!(store.load_history(&test_file).unwrap()[0].timestamp, at);

        cleanup_test_dir(&test_dir);
    }

    #[test]
    fn test_deletion_revision_has_no_content() {
        let (store, test_dir) = setup_test_store();
        let test_file = test_dir.join("gone.txt");

        store.save(&test_file, b"body", "", "").unwrap();
        let deletion = store.record_deletion(&test_file, "", "removed").unwrap();

        assert!(!deletion.exists());
        assert!(matches!(
            store.read_content(&deletion),
            Err(ContentError::Deleted(_))
        ));
        let history = store.load_history(&test_file).unwrap();
        assert!(!history[1].exists);

        cleanup_test_dir(&test_dir);
    }

    #[test]
    fn test_restore_version() {
        let (store, test_dir) = setup_test_store();

        let content = b"Content to restore";
        let hash = LocalHistoryStore::calculate_hash(content);
        store.save_blob(&hash, content).unwrap();

        assert_eq!(store.restore_version(&hash).unwrap(), content);
        assert!(
            store.restore_version("invalid_hash_123").is_err(),
            "Should error on invalid hash"
        );

        cleanup_test_dir(&test_dir);
    }

    #[test]
    fn test_unknown_resource() {
        let (store, test_dir) = setup_test_store();
        let resource = ResourceId::new("missing");

        let set = store
            .fetch_revisions(&resource, &CancelToken::new())
            .unwrap();
        assert!(set.is_empty());
        assert!(store.read_local(&resource).is_err());

        let cancelled = CancelToken::new();
        cancelled.cancel();
        assert_eq!(
            store.fetch_revisions(&resource, &cancelled).unwrap_err(),
            FetchError::Cancelled
        );

        cleanup_test_dir(&test_dir);
    }
}
