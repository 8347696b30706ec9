use super::cache::IndexCache;
use super::context::{ConversationContext, ConversationTurn};
use super::documents::TextExtractor;
use super::embeddings::{ChatModel, EmbeddingModel};
use super::indexer::{
    CancelFlag, DocumentIndexer, IndexReport, IndexState, ProgressSink, SharedIndexState,
};
use super::knowledgebase::{FileLister, Knowledgebase, KnowledgeFile};
use super::reranker::Reranker;
use super::SearchMatch;
use crate::chat_sessions::{ChatHistoryStore, ChatMessage, ASSISTANT_ROLE};
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info, warn};

/// The external models and readers a session works with.
#[derive(Clone)]
pub struct SessionServices {
    pub embedder: Arc<dyn EmbeddingModel>,
    pub chat: Arc<dyn ChatModel>,
    pub extractor: Arc<dyn TextExtractor>,
    pub reranker: Arc<dyn Reranker>,
}

/// An answer together with the files its context came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryResponse {
    pub answer_text: String,
    pub source_file_names: BTreeSet<String>,
}

impl QueryResponse {
    pub fn has_sources(&self) -> bool {
        !self.source_file_names.is_empty()
    }

    /// Sources as a sorted, comma-separated list.
    pub fn sources_label(&self) -> String {
        self.source_file_names
            .iter()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The answer as an assistant message ready for the history store.
    pub fn to_message(&self) -> ChatMessage {
        let sources = self.has_sources().then(|| self.sources_label());
        ChatMessage::new(ASSISTANT_ROLE, self.answer_text.clone(), sources)
    }
}

/// Answers questions for one session from its indexed knowledgebase.
pub struct RetrievalEngine {
    session_id: String,
    services: SessionServices,
    state: SharedIndexState,
    indexer: DocumentIndexer,
    context: Mutex<ConversationContext>,
    max_results_before_rerank: usize,
    min_score: f32,
    top_k: usize,
}

impl RetrievalEngine {
    /// Opens a session, restoring its index from `cache` when possible.
    ///
    /// An invalid `config` is rejected. A cache entry that cannot be used is
    /// logged and the session starts with an empty index; re-indexing rebuilds it.
    pub fn open(
        session_id: impl Into<String>,
        services: SessionServices,
        cache: IndexCache,
        config: &RagConfig,
    ) -> Result<Self> {
        config.validate()?;
        let session_id = session_id.into();
        let expected_dimension = services.embedder.dimensions();

        let state = match cache.load(&session_id, Some(expected_dimension)) {
            Ok(Some((store, registry))) => {
                info!(
                    session_id = %session_id,
                    files = registry.len(),
                    segments = store.len(),
                    "Restored index from cache"
                );
                IndexState { store, registry }
            }
            Ok(None) => {
                debug!(session_id = %session_id, "No index cache, starting empty");
                IndexState::default()
            }
            Err(e @ RagError::CacheIncompatible { .. }) => {
                warn!(session_id = %session_id, error = %e, "Discarding index cache");
                IndexState::default()
            }
            Err(e) => return Err(e),
        };

        let state: SharedIndexState = Arc::new(RwLock::new(state));
        let indexer = DocumentIndexer::new(
            session_id.clone(),
            services.embedder.clone(),
            services.extractor.clone(),
            state.clone(),
            cache,
            config,
        );

        Ok(Self {
            session_id,
            services,
            state,
            indexer,
            context: Mutex::new(ConversationContext::new(config.system_prompt.clone())),
            max_results_before_rerank: config.max_results_before_rerank,
            min_score: config.min_score,
            top_k: config.top_k,
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Answers `user_message` with context retrieved from the index.
    ///
    /// History keeps the message as the user typed it; only the outgoing
    /// request carries the retrieved context. If the chat call fails the
    /// user turn is rolled back so history stays in question/answer pairs.
    pub async fn query(&self, user_message: &str) -> Result<QueryResponse> {
        let mut context = self.context.lock().await;

        // Step 1: Fold recent turns into the search query
        let search_query = context.contextualize(user_message);

        // Step 2: Embed and search
        let query_vector = self.services.embedder.embed(&search_query).await?;
        let candidates = {
            let state = self.state.read().await;
            state
                .store
                .search(&query_vector, self.max_results_before_rerank, self.min_score)?
        };
        debug!(candidates = candidates.len(), "Vector search complete");

        // Step 3: Rerank, then keep the best
        let mut ranked = self.services.reranker.rerank(&search_query, candidates);
        ranked.truncate(self.top_k);

        let source_file_names: BTreeSet<String> = ranked
            .iter()
            .filter_map(SearchMatch::file_name)
            .map(str::to_string)
            .collect();
        let prompt = build_prompt(user_message, &ranked);

        // Step 4: Ask the chat model with the augmented last turn
        context.record_user(user_message);
        let mut request = context.turns().to_vec();
        if let Some(last) = request.last_mut() {
            *last = ConversationTurn::User(prompt);
        }

        match self.services.chat.chat(&request).await {
            Ok(answer_text) => {
                context.record_assistant(answer_text.clone());
                info!(
                    session_id = %self.session_id,
                    segments = ranked.len(),
                    sources = source_file_names.len(),
                    "Answered query"
                );
                Ok(QueryResponse {
                    answer_text,
                    source_file_names,
                })
            }
            Err(e) => {
                context.pop_turn();
                Err(e)
            }
        }
    }

    /// Resets the conversation to just the system turn.
    pub async fn clear_history(&self) {
        self.context.lock().await.clear();
        debug!(session_id = %self.session_id, "Cleared conversation history");
    }

    /// Replaces the conversation with persisted chat messages, in storage order.
    pub async fn restore_history(&self, messages: &[ChatMessage]) {
        let mut context = self.context.lock().await;
        context.clear();
        context.restore(messages);
        debug!(session_id = %self.session_id, turns = context.len(), "Restored conversation history");
    }

    pub async fn history(&self) -> Vec<ConversationTurn> {
        self.context.lock().await.turns().to_vec()
    }

    pub async fn index_knowledgebase(
        &self,
        lister: &dyn FileLister,
        progress: &dyn ProgressSink,
        cancel: &CancelFlag,
    ) -> Result<IndexReport> {
        self.indexer.index_knowledgebase(lister, progress, cancel).await
    }

    pub async fn index_single_file(&self, file: &KnowledgeFile) -> Result<()> {
        self.indexer.index_single_file(file).await
    }

    pub async fn remove_file_from_index(&self, file_name: &str) -> Result<usize> {
        self.indexer.remove_file_from_index(file_name).await
    }

    pub async fn indexed_file_count(&self) -> usize {
        self.state.read().await.registry.len()
    }

    pub async fn segment_count(&self) -> usize {
        self.state.read().await.store.len()
    }
}

fn build_prompt(user_message: &str, ranked: &[SearchMatch]) -> String {
    if ranked.is_empty() {
        return user_message.to_string();
    }

    let mut prompt = String::from("Relevant context:\n\n");
    for segment in ranked {
        prompt.push_str(segment.text());
        prompt.push_str("\n\n");
    }
    prompt.push_str("\nUser question: ");
    prompt.push_str(user_message);
    prompt
}

/// Removes everything a session owns: its chat record, knowledgebase files
/// and index cache.
pub fn delete_session(
    session_id: &str,
    history: &ChatHistoryStore,
    knowledgebase: &Knowledgebase,
    cache: &IndexCache,
) -> Result<()> {
    if knowledgebase.session_id() != session_id {
        return Err(RagError::Knowledgebase {
            file_name: knowledgebase.dir().display().to_string(),
            message: format!("Knowledgebase does not belong to session {}", session_id),
        });
    }

    cache.delete(session_id)?;
    knowledgebase.remove_all()?;
    let existed = history.delete_session(session_id)?;

    info!(session_id, had_history = existed, "Deleted session");
    Ok(())
}
