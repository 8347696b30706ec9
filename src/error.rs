//! Error types for the retrieval engine.

use thiserror::Error;

/// Errors that can occur while indexing, persisting or querying a knowledgebase.
#[derive(Debug, Error)]
pub enum RagError {
    /// A vector's length disagrees with the dimension fixed by the store.
    #[error("Dimension mismatch: store holds {expected}-dimensional vectors, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    /// A knowledgebase file could not be read or parsed.
    #[error("Failed to extract text from {file_name}: {message}")]
    Extraction { file_name: String, message: String },

    /// The embedding model was unavailable or returned an error.
    #[error("Embedding error ({provider}): {message}")]
    EmbeddingCall { provider: String, message: String },

    /// The chat model was unavailable or returned an error.
    #[error("Chat error ({provider}): {message}")]
    ChatCall { provider: String, message: String },

    /// A persisted index cache exists but cannot be used.
    #[error("Index cache for session {session_id} is incompatible: {message}")]
    CacheIncompatible { session_id: String, message: String },

    /// Reading or writing the index cache failed.
    #[error("Index cache error: {0}")]
    CacheStorage(String),

    /// Importing, reading or deleting a knowledgebase resource failed.
    #[error("Knowledgebase error ({file_name}): {message}")]
    Knowledgebase { file_name: String, message: String },

    /// The chat-session store could not be read or written.
    #[error("Chat history error: {0}")]
    History(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// An indexing run was interrupted between files.
    #[error("Indexing cancelled")]
    Cancelled,

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl From<sled::Error> for RagError {
    fn from(e: sled::Error) -> Self {
        RagError::CacheStorage(e.to_string())
    }
}

/// A convenience result type for retrieval operations.
pub type Result<T> = std::result::Result<T, RagError>;
