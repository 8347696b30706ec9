#![allow(dead_code)]

use async_trait::async_trait;
use kb_rag::{
    ChatModel, ConversationTurn, EmbeddingModel, FileTextExtractor, HybridReranker, RagError,
    Result, SessionServices,
};
use std::path::Path;
use std::sync::{Arc, Mutex};

pub const VOCAB: [&str; 7] = ["what", "color", "are", "apples", "red", "bananas", "yellow"];

/// Word counts over a fixed vocabulary.
pub struct WordCountEmbedder;

#[async_trait]
impl EmbeddingModel for WordCountEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        Ok(VOCAB
            .iter()
            .map(|v| words.iter().filter(|w| *w == v).count() as f32)
            .collect())
    }

    fn dimensions(&self) -> usize {
        VOCAB.len()
    }
}

/// Replies with a fixed answer and keeps every request it saw.
#[derive(Default)]
pub struct RecordingChat {
    pub requests: Mutex<Vec<Vec<ConversationTurn>>>,
}

#[async_trait]
impl ChatModel for RecordingChat {
    async fn chat(&self, messages: &[ConversationTurn]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        match messages.last() {
            Some(ConversationTurn::User(_)) => Ok("Apples are red.".to_string()),
            _ => Err(RagError::ChatCall {
                provider: "test".to_string(),
                message: "last turn is not a user turn".to_string(),
            }),
        }
    }
}

pub fn services(chat: Arc<RecordingChat>) -> SessionServices {
    SessionServices {
        embedder: Arc::new(WordCountEmbedder),
        chat,
        extractor: Arc::new(FileTextExtractor),
        reranker: Arc::new(HybridReranker::new()),
    }
}

pub fn write_source(dir: &Path, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    std::fs::write(&path, content).unwrap();
    path
}
