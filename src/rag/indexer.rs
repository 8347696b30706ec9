use super::cache::IndexCache;
use super::documents::{segment_document, TextExtractor};
use super::embeddings::EmbeddingModel;
use super::knowledgebase::{FileLister, KnowledgeFile};
use super::vector_store::VectorStore;
use super::{EmbeddingRecord, IndexedFileRegistry, FILE_NAME_KEY};
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// The vector store and the registry of indexed files.
///
/// They are mutated under the same lock and persisted as one cache entry so
/// the registry never names a file whose segments are missing.
#[derive(Debug, Default)]
pub struct IndexState {
    pub store: VectorStore,
    pub registry: IndexedFileRegistry,
}

pub type SharedIndexState = Arc<RwLock<IndexState>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexPhase {
    Idle,
    Scanning,
    Processing,
    Persisting,
    Failed,
}

/// One progress event of an indexing run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexProgress {
    pub phase: IndexPhase,
    pub message: String,
    pub current: usize,
    pub total: usize,
}

impl IndexProgress {
    fn new(phase: IndexPhase, message: impl Into<String>, current: usize, total: usize) -> Self {
        Self {
            phase,
            message: message.into(),
            current,
            total,
        }
    }
}

/// Receives progress events, synchronously, on the thread running the indexer.
pub trait ProgressSink: Send + Sync {
    fn report(&self, progress: IndexProgress);
}

impl ProgressSink for UnboundedSender<IndexProgress> {
    fn report(&self, progress: IndexProgress) {
        // a dropped receiver just means nobody is watching
        let _ = self.send(progress);
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn report(&self, _progress: IndexProgress) {}
}

/// Cooperative cancellation for an indexing run, checked before each file.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counts from a completed indexing run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexReport {
    pub added: usize,
    pub updated: usize,
    pub deleted: usize,
    /// Whether the cache was written.
    pub persisted: bool,
}

impl IndexReport {
    pub fn has_changes(&self) -> bool {
        self.added > 0 || self.updated > 0 || self.deleted > 0
    }
}

struct IndexPlan {
    to_index: Vec<(KnowledgeFile, bool)>,
    deleted: Vec<String>,
}

/// Keeps a session's vector store in step with its knowledgebase files.
pub struct DocumentIndexer {
    session_id: String,
    embedder: Arc<dyn EmbeddingModel>,
    extractor: Arc<dyn TextExtractor>,
    state: SharedIndexState,
    cache: IndexCache,
    chunk_size: usize,
    chunk_overlap: usize,
    /// One run at a time per session.
    run_lock: Mutex<()>,
}

impl DocumentIndexer {
    pub fn new(
        session_id: impl Into<String>,
        embedder: Arc<dyn EmbeddingModel>,
        extractor: Arc<dyn TextExtractor>,
        state: SharedIndexState,
        cache: IndexCache,
        config: &RagConfig,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            embedder,
            extractor,
            state,
            cache,
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            run_lock: Mutex::new(()),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Brings the index up to date with the files `lister` reports.
    ///
    /// New and modified files are chunked, embedded and swapped in one at a
    /// time; files no longer listed are evicted. The cache is written only if
    /// something changed. A failure or cancellation stops the run, but files
    /// finished before it stay indexed and are saved before the error returns.
    pub async fn index_knowledgebase(
        &self,
        lister: &dyn FileLister,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<IndexReport> {
        let _run = self.run_lock.lock().await;

        progress.report(IndexProgress::new(IndexPhase::Scanning, "Scanning knowledgebase...", 0, 0));
        let files = match lister.list() {
            Ok(files) => files,
            Err(e) => {
                progress.report(IndexProgress::new(IndexPhase::Failed, e.to_string(), 0, 0));
                return Err(e);
            }
        };
        debug!(session_id = %self.session_id, files = files.len(), "Starting incremental indexing");

        let plan = {
            let state = self.state.read().await;
            plan_changes(files, &state.registry)
        };
        let total = plan.to_index.len();

        if total > 0 {
            progress.report(IndexProgress::new(IndexPhase::Processing, "Starting indexing...", 0, total));
        }

        let mut report = IndexReport::default();
        let outcome = self.apply_plan(plan, progress, cancel, &mut report).await;

        if let Err(e) = outcome {
            if report.has_changes() {
                match self.persist().await {
                    Ok(()) => report.persisted = true,
                    Err(save_err) => warn!(
                        session_id = %self.session_id,
                        error = %save_err,
                        "Failed to save partial index"
                    ),
                }
            }
            match e {
                RagError::Cancelled => {
                    info!(
                        session_id = %self.session_id,
                        added = report.added,
                        updated = report.updated,
                        deleted = report.deleted,
                        "Indexing cancelled"
                    );
                    progress.report(IndexProgress::new(IndexPhase::Idle, "Indexing cancelled", report.added + report.updated, total));
                }
                ref other => {
                    warn!(session_id = %self.session_id, error = %other, "Indexing failed");
                    progress.report(IndexProgress::new(IndexPhase::Failed, other.to_string(), report.added + report.updated, total));
                }
            }
            return Err(e);
        }

        info!(
            session_id = %self.session_id,
            new = report.added,
            updated = report.updated,
            deleted = report.deleted,
            "Indexing complete"
        );

        if report.has_changes() {
            progress.report(IndexProgress::new(IndexPhase::Persisting, "Saving cache...", total, total));
            if let Err(e) = self.persist().await {
                progress.report(IndexProgress::new(IndexPhase::Failed, e.to_string(), total, total));
                return Err(e);
            }
            report.persisted = true;
        }

        if total == 0 {
            progress.report(IndexProgress::new(IndexPhase::Idle, "All files already indexed", 0, 0));
        } else {
            progress.report(IndexProgress::new(IndexPhase::Idle, "Indexing complete", total, total));
        }

        Ok(report)
    }

    /// Indexes (or re-indexes) one file and saves the cache.
    pub async fn index_single_file(&self, file: &KnowledgeFile) -> Result<()> {
        let _run = self.run_lock.lock().await;
        debug!(session_id = %self.session_id, file = %file.name, "Indexing single file");

        let records = self.embed_file(file).await?;
        self.commit_file(file, records).await?;
        self.persist().await
    }

    /// Evicts one file's segments and registry entry and saves the cache.
    ///
    /// Returns the number of segments removed.
    pub async fn remove_file_from_index(&self, file_name: &str) -> Result<usize> {
        let _run = self.run_lock.lock().await;
        debug!(session_id = %self.session_id, file = %file_name, "Removing file from index");

        let removed = self.evict_file(file_name).await;
        self.persist().await?;
        Ok(removed)
    }

    async fn apply_plan(
        &self,
        plan: IndexPlan,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
        report: &mut IndexReport,
    ) -> Result<()> {
        let total = plan.to_index.len();

        for (i, (file, modified)) in plan.to_index.iter().enumerate() {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled);
            }
            debug!(
                file = %file.name,
                kind = if *modified { "modified" } else { "new" },
                "Indexing file"
            );
            progress.report(IndexProgress::new(
                IndexPhase::Processing,
                format!("Indexing {}...", file.name),
                i + 1,
                total,
            ));

            let records = self.embed_file(file).await?;
            self.commit_file(file, records).await?;

            if *modified {
                report.updated += 1;
            } else {
                report.added += 1;
            }
        }

        for file_name in &plan.deleted {
            if cancel.is_cancelled() {
                return Err(RagError::Cancelled);
            }
            debug!(file = %file_name, "Removing deleted file from index");
            self.evict_file(file_name).await;
            report.deleted += 1;
        }

        Ok(())
    }

    /// Extracts, chunks and embeds a file without touching shared state.
    async fn embed_file(&self, file: &KnowledgeFile) -> Result<Vec<EmbeddingRecord>> {
        let text = self.extractor.read(file)?;
        let segments = segment_document(&file.name, &text, self.chunk_size, self.chunk_overlap);

        let mut records = Vec::with_capacity(segments.len());
        for segment in segments {
            let vector = self.embedder.embed(&segment.text).await?;
            records.push(EmbeddingRecord { vector, segment });
        }

        debug!(file = %file.name, segments = records.len(), "Embedded file");
        Ok(records)
    }

    /// Swaps a file's segments and updates its registry entry in one write.
    async fn commit_file(&self, file: &KnowledgeFile, records: Vec<EmbeddingRecord>) -> Result<()> {
        let mut state = self.state.write().await;
        let evicted = state
            .store
            .replace_by_metadata(FILE_NAME_KEY, &file.name, records)?;
        state.registry.insert(file.name.clone(), file.last_modified);
        if evicted > 0 {
            debug!(file = %file.name, evicted, "Replaced stale segments");
        }
        Ok(())
    }

    async fn evict_file(&self, file_name: &str) -> usize {
        let mut state = self.state.write().await;
        state.registry.remove(file_name);
        state.store.remove_by_metadata(FILE_NAME_KEY, file_name)
    }

    /// Writes the current store and registry to the cache.
    pub async fn persist(&self) -> Result<()> {
        let bytes = {
            let state = self.state.read().await;
            IndexCache::encode(&self.session_id, &state.store, &state.registry)?
        };
        self.cache.write(&self.session_id, bytes)
    }
}

/// Splits the listing into new/modified files (listing order) and deleted names.
fn plan_changes(files: Vec<KnowledgeFile>, registry: &IndexedFileRegistry) -> IndexPlan {
    let current: HashSet<String> = files.iter().map(|f| f.name.clone()).collect();

    let to_index = files
        .into_iter()
        .filter_map(|file| match registry.get(&file.name) {
            None => Some((file, false)),
            Some(&indexed_at) if indexed_at != file.last_modified => Some((file, true)),
            Some(_) => None,
        })
        .collect();

    let deleted = registry
        .keys()
        .filter(|name| !current.contains(*name))
        .cloned()
        .collect();

    IndexPlan { to_index, deleted }
}
