//! Durable document stores.
//!
//! The pipeline persists through the [`DocumentStore`] capability: a
//! whole-record upsert keyed by [`DocumentRecord::id`], with overwrite
//! semantics and no partial patching. Two implementations ship here:
//!
//! * [`MemoryStore`] — a mutex-guarded map, for tests and embedding.
//! * [`JsonFileStore`] — one pretty-printed `<id>.json` per record in a
//!   directory. Every write goes to its own temp file and is renamed into
//!   place, so neither a crash nor a concurrent writer of the same id leaves
//!   a half-written record behind.

use crate::error::PipelineError;
use crate::record::DocumentRecord;
use async_trait::async_trait;
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Insert-or-overwrite persistence for document records.
///
/// `upsert` must be atomic per record: a concurrent reader sees either the
/// previous record or the new one, never a mix. Concurrent upserts of the same
/// id race and the last writer wins.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Persist the full record, replacing any stored record with the same id.
    async fn upsert(&self, record: &DocumentRecord) -> Result<(), PipelineError>;

    /// Fetch a stored record by id.
    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, PipelineError>;
}

/// In-process store backed by a `HashMap`.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Mutex<HashMap<String, DocumentRecord>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.records.lock().map(|m| m.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn upsert(&self, record: &DocumentRecord) -> Result<(), PipelineError> {
        let mut records = self
            .records
            .lock()
            .map_err(|e| PipelineError::PersistenceFailure {
                id: record.id().to_string(),
                message: format!("store lock poisoned: {e}"),
            })?;
        records.insert(record.id().to_string(), record.clone());
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, PipelineError> {
        let records = self
            .records
            .lock()
            .map_err(|e| PipelineError::Internal(format!("store lock poisoned: {e}")))?;
        Ok(records.get(id).cloned())
    }
}

/// Directory-backed store: one JSON file per record.
#[derive(Debug, Clone)]
pub struct JsonFileStore {
    root: PathBuf,
}

impl JsonFileStore {
    /// Open (creating if needed) a store rooted at `root`.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, PipelineError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root)
            .await
            .map_err(|e| PipelineError::PersistenceFailure {
                id: String::new(),
                message: format!("cannot create store directory '{}': {e}", root.display()),
            })?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, id: &str) -> Result<PathBuf, PipelineError> {
        if id.is_empty() || id == "." || id == ".." {
            return Err(PipelineError::PersistenceFailure {
                id: id.to_string(),
                message: "id is not usable as a file name".into(),
            });
        }
        Ok(self.root.join(format!("{id}.json")))
    }
}

#[async_trait]
impl DocumentStore for JsonFileStore {
    async fn upsert(&self, record: &DocumentRecord) -> Result<(), PipelineError> {
        let id = record.id();
        let fail = |message: String| PipelineError::PersistenceFailure {
            id: id.to_string(),
            message,
        };

        let path = self.path_for(id)?;
        let body = serde_json::to_vec_pretty(record).map_err(|e| fail(e.to_string()))?;

        // Each writer gets its own temp file, so concurrent upserts of one id
        // never share an inode; the rename decides the winner.
        let root = self.root.clone();
        let target = path.clone();
        let len = body.len();
        tokio::task::spawn_blocking(move || -> Result<(), String> {
            let mut tmp = tempfile::Builder::new()
                .prefix(".upsert-")
                .suffix(".json.tmp")
                .tempfile_in(&root)
                .map_err(|e| format!("create temp file in '{}': {e}", root.display()))?;
            tmp.write_all(&body)
                .and_then(|()| tmp.as_file().sync_all())
                .map_err(|e| format!("write '{}': {e}", tmp.path().display()))?;
            tmp.persist(&target)
                .map_err(|e| format!("rename into '{}': {}", target.display(), e.error))?;
            Ok(())
        })
        .await
        .map_err(|e| fail(format!("upsert task panicked: {e}")))?
        .map_err(fail)?;

        debug!("Upserted {} ({} bytes)", path.display(), len);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, PipelineError> {
        let path = self.path_for(id)?;
        let bytes = match tokio::fs::read(&path).await {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(PipelineError::Internal(format!(
                    "read '{}': {e}",
                    path.display()
                )))
            }
        };
        serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| PipelineError::Internal(format!("decode '{}': {e}", path.display())))
    }
}
