//! Durable JSON state for tracked resources
//!
//! The store mirrors the registry for audit and crash recovery. Every
//! mutation is applied to a copy of the document, written to disk through
//! an atomic rename, and only then swapped in, so memory and disk never
//! disagree after a failed write.

mod crud;
mod db;
mod types;

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

pub use db::{default_error_log_path, default_state_path, stack_data_dir, write_atomically};
pub use types::{StoreDocument, StoredResource};

/// State store failures
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the state file failed
    #[error("State file I/O failed for '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The state file exists but is not a valid document
    #[error("State file '{path}' is corrupt: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Serializing the document failed
    #[error("Failed to serialize state: {0}")]
    Serialize(#[source] serde_json::Error),

    /// Renaming the temp file over the state file failed
    #[error("Failed to replace state file '{path}': {source}")]
    Persist {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl StoreError {
    /// Create an IO error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Owner of the state document and, optionally, the file backing it
///
/// A single session must own a given file; there is no cross-process lock.
#[derive(Debug)]
pub struct StateStore {
    path: Option<PathBuf>,
    doc: StoreDocument,
}

impl StateStore {
    /// Open the state file at `path`, creating it if missing.
    ///
    /// An existing file keeps its own stack name and region.
    pub fn open(
        path: impl AsRef<Path>,
        stack_name: &str,
        region: &str,
    ) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();

        let doc = match db::read_document(&path)? {
            Some(doc) => {
                info!(
                    path = %path.display(),
                    stack = %doc.stack_name,
                    resources = doc.resource_count(),
                    "Loaded state file"
                );
                doc
            }
            None => {
                let doc = StoreDocument::new(stack_name, region);
                db::write_document(&path, &doc)?;
                info!(path = %path.display(), stack = %stack_name, "Created state file");
                doc
            }
        };

        Ok(Self {
            path: Some(path),
            doc,
        })
    }

    /// A store that never touches disk
    pub fn in_memory(stack_name: &str, region: &str) -> Self {
        Self {
            path: None,
            doc: StoreDocument::new(stack_name, region),
        }
    }

    /// Current document snapshot
    pub fn document(&self) -> &StoreDocument {
        &self.doc
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Apply a mutation as one read-modify-write unit.
    ///
    /// On a write failure the in-memory document is left untouched.
    pub fn apply<R>(&mut self, f: impl FnOnce(&mut StoreDocument) -> R) -> Result<R, StoreError> {
        let mut next = self.doc.clone();
        let result = f(&mut next);

        if let Some(path) = &self.path {
            db::write_document(path, &next)?;
        }

        self.doc = next;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use tempfile::TempDir;

    fn entry(id: &str) -> StoredResource {
        StoredResource {
            id: id.to_string(),
            created_at: Utc::now(),
            metadata: serde_json::json!({"az": "us-east-1a"}),
            status: None,
            dependencies: Default::default(),
            tags: Default::default(),
            cleanup_command: None,
        }
    }

    #[test]
    fn test_open_creates_file() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("state.json");

        let store = StateStore::open(&path, "demo", "eu-west-1").unwrap();

        assert!(path.exists());
        assert_eq!(store.document().stack_name, "demo");
        assert_eq!(store.document().region, "eu-west-1");
    }

    #[test]
    fn test_apply_persists_and_reloads() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::open(&path, "demo", "us-east-1").unwrap();
        store
            .apply(|doc| doc.upsert_resource("instance", entry("i-1")))
            .unwrap();

        let reopened = StateStore::open(&path, "other", "other").unwrap();
        assert_eq!(reopened.document().stack_name, "demo");
        assert_eq!(reopened.document().resources["instance"][0].id, "i-1");
    }

    #[test]
    fn test_three_field_entries_parse() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(
            &path,
            r#"{
                "stack_name": "legacy",
                "created_at": "2024-01-01T00:00:00Z",
                "region": "us-west-2",
                "resources": {
                    "volume": [{"id": "v-1", "created_at": "2024-01-01T00:00:00Z", "metadata": {"size": 100}}]
                }
            }"#,
        )
        .unwrap();

        let store = StateStore::open(&path, "demo", "us-east-1").unwrap();
        let stored = &store.document().resources["volume"][0];
        assert_eq!(stored.metadata["size"], 100);
        assert!(stored.status.is_none());
        assert!(stored.dependencies.is_empty());
    }

    #[test]
    fn test_written_file_omits_empty_optional_fields() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");

        let mut store = StateStore::open(&path, "demo", "us-east-1").unwrap();
        store
            .apply(|doc| doc.upsert_resource("instance", entry("i-1")))
            .unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        let stored = raw["resources"]["instance"][0].as_object().unwrap();
        let mut keys: Vec<_> = stored.keys().map(String::as_str).collect();
        keys.sort_unstable();
        assert_eq!(keys, ["created_at", "id", "metadata"]);
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, "{ truncated").unwrap();

        let err = StateStore::open(&path, "demo", "us-east-1").unwrap_err();
        assert!(matches!(err, StoreError::Parse { .. }));
    }

    #[test]
    fn test_failed_write_leaves_memory_unchanged() {
        let dir = TempDir::new().unwrap();
        let blocker = dir.path().join("not-a-dir");
        std::fs::write(&blocker, "file").unwrap();

        let mut store = StateStore::in_memory("demo", "us-east-1");
        store.path = Some(blocker.join("state.json"));

        let result = store.apply(|doc| doc.upsert_resource("instance", entry("i-1")));
        assert!(result.is_err());
        assert_eq!(store.document().resource_count(), 0);
    }

    #[test]
    fn test_in_memory_never_writes() {
        let mut store = StateStore::in_memory("demo", "us-east-1");
        store
            .apply(|doc| doc.upsert_resource("instance", entry("i-1")))
            .unwrap();
        assert!(store.path().is_none());
        assert_eq!(store.document().resource_count(), 1);
    }
}
