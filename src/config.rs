use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RagError, Result};

pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant. Use the provided context to answer questions accurately. \
If the context doesn't contain relevant information, say so politely. \
In your response, do not use any markdown formatting. Simple plain text is preferred.";

/// Tunable retrieval policy and model endpoint settings.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct RagConfig {
    /// Maximum chunk size in characters.
    pub chunk_size: usize,
    /// Characters carried over from one chunk into the next.
    pub chunk_overlap: usize,
    /// Candidates pulled from the vector store before reranking.
    pub max_results_before_rerank: usize,
    /// Similarity floor applied by the vector store search.
    pub min_score: f32,
    /// Segments kept after reranking.
    pub top_k: usize,
    pub system_prompt: String,
    /// Root for knowledgebase storage, index cache and chat history.
    pub data_dir: PathBuf,
    pub api_base: String,
    pub embedding_model: String,
    pub embedding_dimensions: usize,
    pub chat_model: String,
    pub temperature: f32,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            chunk_size: 500,
            chunk_overlap: 50,
            max_results_before_rerank: 15,
            min_score: 0.5,
            top_k: 5,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            data_dir: PathBuf::from("data"),
            api_base: "https://api.openai.com/v1".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            chat_model: "gpt-4o-mini".to_string(),
            temperature: 1.0,
        }
    }
}

impl RagConfig {
    pub fn load_from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(path)?;
        let config: RagConfig = serde_json::from_str(&content)
            .map_err(|e| RagError::Config(format!("Failed to parse {}: {}", path.display(), e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RagError::Config(format!("Failed to serialize config: {}", e)))?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Checks that the retrieval parameters are consistent with each other.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_overlap >= self.chunk_size {
            return Err(RagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        if self.top_k == 0 {
            return Err(RagError::Config("top_k must be greater than zero".to_string()));
        }
        if self.max_results_before_rerank < self.top_k {
            return Err(RagError::Config(format!(
                "max_results_before_rerank ({}) must be at least top_k ({})",
                self.max_results_before_rerank, self.top_k
            )));
        }
        if !(-1.0..=1.0).contains(&self.min_score) {
            return Err(RagError::Config(format!(
                "min_score ({}) must lie within [-1, 1]",
                self.min_score
            )));
        }
        Ok(())
    }

    pub fn knowledgebase_dir(&self) -> PathBuf {
        self.data_dir.join("knowledgebase")
    }

    pub fn cache_dir(&self) -> PathBuf {
        self.data_dir.join("index_cache")
    }

    pub fn chat_sessions_path(&self) -> PathBuf {
        self.data_dir.join("chat_sessions.json")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = RagConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.chunk_overlap, 50);
        assert_eq!(config.max_results_before_rerank, 15);
        assert_eq!(config.top_k, 5);
    }

    #[test]
    fn test_validate_rejects_overlap_not_below_size() {
        let config = RagConfig { chunk_size: 100, chunk_overlap: 100, ..Default::default() };
        assert!(matches!(config.validate(), Err(RagError::Config(_))));
    }

    #[test]
    fn test_validate_rejects_candidate_pool_smaller_than_top_k() {
        let config = RagConfig { max_results_before_rerank: 3, top_k: 5, ..Default::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_missing_file_loads_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = RagConfig::load_from_file(&dir.path().join("absent.json")).unwrap();
        assert_eq!(config, RagConfig::default());
    }

    #[test]
    fn test_save_and_load_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.json");
        let config = RagConfig { top_k: 3, min_score: 0.4, ..Default::default() };
        config.save_to_file(&path).unwrap();
        assert_eq!(RagConfig::load_from_file(&path).unwrap(), config);

        fs::write(&path, r#"{ "chunk_size": 800 }"#).unwrap();
        let loaded = RagConfig::load_from_file(&path).unwrap();
        assert_eq!(loaded.chunk_size, 800);
        assert_eq!(loaded.chunk_overlap, 50);
    }
}
