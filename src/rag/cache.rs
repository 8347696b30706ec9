use super::vector_store::VectorStore;
use super::{EmbeddingRecord, IndexedFileRegistry};
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;

/// Bumped whenever the layout of [`CacheEntry`] changes.
const FORMAT_VERSION: u32 = 1;

#[derive(Serialize)]
struct CacheEntryRef<'a> {
    format_version: u32,
    session_id: &'a str,
    dimension: Option<usize>,
    saved_at: i64,
    records: &'a [EmbeddingRecord],
    indexed_files: &'a IndexedFileRegistry,
}

#[derive(Deserialize)]
struct CacheEntry {
    format_version: u32,
    session_id: String,
    dimension: Option<usize>,
    #[allow(dead_code)]
    saved_at: i64,
    records: Vec<EmbeddingRecord>,
    indexed_files: IndexedFileRegistry,
}

/// Persists each session's vector store and indexed-file registry as one blob.
///
/// Entries live in a sled tree keyed by session id. A save replaces the whole
/// entry with a single insert, so a crash mid-save leaves either the previous
/// entry or the new one, never a mix. Cloning shares the same database handle.
#[derive(Clone)]
pub struct IndexCache {
    db: Db,
}

impl IndexCache {
    pub fn open(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db = sled::open(dir)?;
        Ok(Self { db })
    }

    /// A cache that is discarded when the last handle is dropped.
    pub fn temporary() -> Result<Self> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Self { db })
    }

    pub fn save(
        &self,
        session_id: &str,
        store: &VectorStore,
        registry: &IndexedFileRegistry,
    ) -> Result<()> {
        let bytes = Self::encode(session_id, store, registry)?;
        self.write(session_id, bytes)
    }

    /// Serializes a store and registry into a cache entry.
    ///
    /// Split from [`IndexCache::write`] so callers can encode while holding a
    /// read lock and do the disk write after releasing it.
    pub fn encode(
        session_id: &str,
        store: &VectorStore,
        registry: &IndexedFileRegistry,
    ) -> Result<Vec<u8>> {
        let entry = CacheEntryRef {
            format_version: FORMAT_VERSION,
            session_id,
            dimension: store.dimension(),
            saved_at: chrono::Utc::now().timestamp_millis(),
            records: store.records(),
            indexed_files: registry,
        };
        bincode::serialize(&entry)
            .map_err(|e| RagError::CacheStorage(format!("Failed to serialize cache: {}", e)))
    }

    pub fn write(&self, session_id: &str, bytes: Vec<u8>) -> Result<()> {
        let size = bytes.len();
        self.db.insert(session_id.as_bytes(), bytes)?;
        self.db.flush()?;
        tracing::debug!(session_id, bytes = size, "Saved index cache");
        Ok(())
    }

    /// Loads a session's cache entry.
    ///
    /// Returns `Ok(None)` when the session has never been indexed. When
    /// `expected_dimension` is given, an entry built with a different
    /// embedding dimension is rejected as [`RagError::CacheIncompatible`].
    pub fn load(
        &self,
        session_id: &str,
        expected_dimension: Option<usize>,
    ) -> Result<Option<(VectorStore, IndexedFileRegistry)>> {
        let Some(bytes) = self.db.get(session_id.as_bytes())? else {
            return Ok(None);
        };

        let incompatible = |message: String| RagError::CacheIncompatible {
            session_id: session_id.to_string(),
            message,
        };

        let entry: CacheEntry = bincode::deserialize(&bytes)
            .map_err(|e| incompatible(format!("unreadable entry: {}", e)))?;

        if entry.format_version != FORMAT_VERSION {
            return Err(incompatible(format!(
                "format version {} (expected {})",
                entry.format_version, FORMAT_VERSION
            )));
        }
        if entry.session_id != session_id {
            return Err(incompatible(format!("entry belongs to session {}", entry.session_id)));
        }
        if let (Some(expected), Some(stored)) = (expected_dimension, entry.dimension) {
            if expected != stored {
                return Err(incompatible(format!(
                    "built with {}-dimensional embeddings, model produces {}",
                    stored, expected
                )));
            }
        }
        if let Some(stored) = entry.dimension {
            if let Some(bad) = entry.records.iter().find(|r| r.vector.len() != stored) {
                return Err(incompatible(format!(
                    "record of dimension {} in a {}-dimensional store",
                    bad.vector.len(),
                    stored
                )));
            }
        }

        let store = VectorStore::from_records(entry.records)
            .map_err(|e| incompatible(e.to_string()))?;
        tracing::debug!(
            session_id,
            segments = store.len(),
            files = entry.indexed_files.len(),
            "Loaded index cache"
        );
        Ok(Some((store, entry.indexed_files)))
    }

    /// Removes a session's entry. Deleting an absent entry is not an error.
    pub fn delete(&self, session_id: &str) -> Result<bool> {
        let removed = self.db.remove(session_id.as_bytes())?.is_some();
        self.db.flush()?;
        if removed {
            tracing::debug!(session_id, "Deleted index cache");
        }
        Ok(removed)
    }

    pub fn contains(&self, session_id: &str) -> Result<bool> {
        Ok(self.db.contains_key(session_id.as_bytes())?)
    }
}
