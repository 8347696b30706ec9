//! In-memory doubles for the model and filesystem seams.

use super::context::ConversationTurn;
use super::documents::TextExtractor;
use super::embeddings::{ChatModel, EmbeddingModel};
use super::knowledgebase::{FileLister, KnowledgeFile};
use crate::error::{RagError, Result};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use tokio::sync::Notify;

/// Bag-of-words embedder over a fixed vocabulary. Text containing "boom"
/// fails to embed.
pub struct VocabEmbedder {
    vocab: Vec<&'static str>,
    calls: AtomicUsize,
}

impl VocabEmbedder {
    pub fn new(vocab: Vec<&'static str>) -> Self {
        Self { vocab, calls: AtomicUsize::new(0) }
    }

    pub fn fruit() -> Self {
        Self::new(vec!["what", "color", "are", "apples", "red", "bananas", "yellow", "green"])
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl EmbeddingModel for VocabEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let lowered = text.to_lowercase();
        let words: Vec<&str> = lowered
            .split(|c: char| !c.is_ascii_alphanumeric())
            .filter(|w| !w.is_empty())
            .collect();
        if words.contains(&"boom") {
            return Err(RagError::EmbeddingCall {
                provider: "fake".to_string(),
                message: "boom".to_string(),
            });
        }
        Ok(self
            .vocab
            .iter()
            .map(|v| words.iter().filter(|w| *w == v).count() as f32)
            .collect())
    }

    fn dimensions(&self) -> usize {
        self.vocab.len()
    }
}

/// Wraps [`VocabEmbedder`] and parks any text containing `trigger` until
/// `release` is notified, signalling `entered` first.
pub struct GatedEmbedder {
    inner: VocabEmbedder,
    trigger: &'static str,
    pub entered: Notify,
    pub release: Notify,
}

impl GatedEmbedder {
    pub fn new(inner: VocabEmbedder, trigger: &'static str) -> Self {
        Self { inner, trigger, entered: Notify::new(), release: Notify::new() }
    }
}

#[async_trait]
impl EmbeddingModel for GatedEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        if text.contains(self.trigger) {
            self.entered.notify_one();
            self.release.notified().await;
        }
        self.inner.embed(text).await
    }

    fn dimensions(&self) -> usize {
        self.inner.dimensions()
    }
}

/// Records every request and answers with a fixed reply.
pub struct ScriptedChat {
    reply: String,
    fail: bool,
    pub requests: Mutex<Vec<Vec<ConversationTurn>>>,
}

impl ScriptedChat {
    pub fn replying(reply: &str) -> Self {
        Self { reply: reply.to_string(), fail: false, requests: Mutex::new(Vec::new()) }
    }

    pub fn failing() -> Self {
        Self { reply: String::new(), fail: true, requests: Mutex::new(Vec::new()) }
    }

    pub fn last_request(&self) -> Vec<ConversationTurn> {
        self.requests.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl ChatModel for ScriptedChat {
    async fn chat(&self, messages: &[ConversationTurn]) -> Result<String> {
        self.requests.lock().unwrap().push(messages.to_vec());
        if self.fail {
            return Err(RagError::ChatCall {
                provider: "fake".to_string(),
                message: "unavailable".to_string(),
            });
        }
        Ok(self.reply.clone())
    }
}

/// A knowledgebase listing held in memory. `None` content cannot be read.
#[derive(Default)]
pub struct MemoryFiles {
    files: Mutex<BTreeMap<String, (i64, Option<String>)>>,
}

impl MemoryFiles {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put(&self, name: &str, last_modified: i64, content: &str) {
        self.files
            .lock()
            .unwrap()
            .insert(name.to_string(), (last_modified, Some(content.to_string())));
    }

    pub fn put_unreadable(&self, name: &str, last_modified: i64) {
        self.files.lock().unwrap().insert(name.to_string(), (last_modified, None));
    }

    pub fn remove(&self, name: &str) {
        self.files.lock().unwrap().remove(name);
    }

    pub fn file(&self, name: &str) -> KnowledgeFile {
        let last_modified = self.files.lock().unwrap()[name].0;
        KnowledgeFile { name: name.to_string(), path: name.into(), last_modified }
    }
}

impl FileLister for MemoryFiles {
    fn list(&self) -> Result<Vec<KnowledgeFile>> {
        Ok(self
            .files
            .lock()
            .unwrap()
            .iter()
            .map(|(name, (last_modified, _))| KnowledgeFile {
                name: name.clone(),
                path: name.into(),
                last_modified: *last_modified,
            })
            .collect())
    }
}

impl TextExtractor for MemoryFiles {
    fn read(&self, file: &KnowledgeFile) -> Result<String> {
        match self.files.lock().unwrap().get(&file.name) {
            Some((_, Some(content))) => Ok(content.clone()),
            _ => Err(RagError::Extraction {
                file_name: file.name.clone(),
                message: "unreadable".to_string(),
            }),
        }
    }
}
