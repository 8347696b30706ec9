pub mod cache;
pub mod context;
pub mod documents;
pub mod embeddings;
pub mod engine;
pub mod indexer;
pub mod knowledgebase;
pub mod reranker;
#[cfg(test)]
pub(crate) mod testing;
pub mod vector_store;

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Metadata key carrying the source file of a segment.
pub const FILE_NAME_KEY: &str = "fileName";
/// Metadata key carrying a segment's position within its file.
pub const CHUNK_INDEX_KEY: &str = "chunkIndex";

/// A chunk of a source document together with its provenance metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSegment {
    pub text: String,
    pub metadata: HashMap<String, String>,
}

impl TextSegment {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn from_file(text: impl Into<String>, file_name: &str, chunk_index: usize) -> Self {
        let mut metadata = HashMap::new();
        metadata.insert(FILE_NAME_KEY.to_string(), file_name.to_string());
        metadata.insert(CHUNK_INDEX_KEY.to_string(), chunk_index.to_string());
        Self {
            text: text.into(),
            metadata,
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn file_name(&self) -> Option<&str> {
        self.metadata.get(FILE_NAME_KEY).map(String::as_str)
    }
}

/// An embedding vector paired with the segment it was computed from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRecord {
    pub vector: Vec<f32>,
    pub segment: TextSegment,
}

/// A stored record returned by a similarity search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchMatch {
    pub record: EmbeddingRecord,
    /// Cosine similarity between the query and the record's vector.
    pub score: f32,
    /// Hybrid score assigned by the reranker, if the match was reranked.
    pub rerank_score: Option<f32>,
}

impl SearchMatch {
    pub fn text(&self) -> &str {
        &self.record.segment.text
    }

    pub fn file_name(&self) -> Option<&str> {
        self.record.segment.file_name()
    }
}

/// File name to last-modified timestamp (epoch millis) of every indexed file.
///
/// A `BTreeMap` keeps the serialized form and iteration order deterministic.
pub type IndexedFileRegistry = BTreeMap<String, i64>;
