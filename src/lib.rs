//! Session-scoped retrieval-augmented chat over a local knowledgebase.
//!
//! Each chat session owns a directory of documents. [`rag::indexer::DocumentIndexer`]
//! chunks and embeds them into a [`rag::vector_store::VectorStore`], persisted per
//! session by [`rag::cache::IndexCache`]. [`rag::engine::RetrievalEngine`] answers
//! questions by searching that store, reranking the hits and sending the best
//! segments to a chat model along with the conversation so far.

pub mod chat_sessions;
pub mod config;
pub mod error;
pub mod logging;
pub mod rag;

pub use chat_sessions::{ChatHistoryStore, ChatMessage, ChatSession};
pub use config::RagConfig;
pub use error::{RagError, Result};
pub use rag::cache::IndexCache;
pub use rag::context::{ConversationContext, ConversationTurn};
pub use rag::documents::{FileTextExtractor, TextExtractor};
pub use rag::embeddings::{ChatModel, EmbeddingModel, OpenAiClient};
pub use rag::engine::{delete_session, QueryResponse, RetrievalEngine, SessionServices};
pub use rag::indexer::{
    CancelFlag, DocumentIndexer, IndexPhase, IndexProgress, IndexReport, NoProgress, ProgressSink,
};
pub use rag::knowledgebase::{DirectoryLister, FileLister, KnowledgeFile, Knowledgebase};
pub use rag::reranker::{HybridReranker, Reranker};
pub use rag::vector_store::VectorStore;
