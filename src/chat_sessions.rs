use crate::error::{RagError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

pub const USER_ROLE: &str = "user";
pub const ASSISTANT_ROLE: &str = "assistant";
const DEFAULT_TITLE: &str = "New Chat";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: String, // "user" or "assistant"
    pub content: String,
    pub timestamp: i64,
    /// Comma-separated source file names of an assistant answer.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<String>,
}

impl ChatMessage {
    pub fn new(role: &str, content: impl Into<String>, sources: Option<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: role.to_string(),
            content: content.into(),
            timestamp: chrono::Utc::now().timestamp_millis(),
            sources,
        }
    }

    pub fn is_user(&self) -> bool {
        self.role == USER_ROLE
    }

    pub fn has_sources(&self) -> bool {
        self.sources.as_deref().is_some_and(|s| !s.trim().is_empty())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatSession {
    pub id: String,
    pub title: String,
    pub created_at: i64,
    pub updated_at: i64,
    pub model_id: Option<String>,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct ChatSessionsStorage {
    sessions: HashMap<String, ChatSession>,
}

/// JSON-file store of chat sessions and their transcripts.
///
/// Every change rewrites the whole file through a temporary sibling and a
/// rename, so readers never see a half-written file.
#[derive(Debug, Clone)]
pub struct ChatHistoryStore {
    path: PathBuf,
}

impl ChatHistoryStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn create_session(&self, title: Option<String>, model_id: Option<String>) -> Result<ChatSession> {
        let mut storage = self.load()?;

        let now = chrono::Utc::now().timestamp_millis();
        let session = ChatSession {
            id: Uuid::new_v4().to_string(),
            title: title.unwrap_or_else(|| DEFAULT_TITLE.to_string()),
            created_at: now,
            updated_at: now,
            model_id,
            messages: Vec::new(),
        };

        storage.sessions.insert(session.id.clone(), session.clone());
        self.save(&storage)?;
        tracing::info!(session_id = %session.id, title = %session.title, "Created chat session");

        Ok(session)
    }

    pub fn update_session(
        &self,
        session_id: &str,
        title: Option<String>,
        model_id: Option<String>,
    ) -> Result<ChatSession> {
        let mut storage = self.load()?;
        let session = storage
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;

        if let Some(new_title) = title {
            session.title = new_title;
        }
        if let Some(new_model_id) = model_id {
            session.model_id = Some(new_model_id);
        }
        session.updated_at = chrono::Utc::now().timestamp_millis();

        let updated_session = session.clone();
        self.save(&storage)?;
        Ok(updated_session)
    }

    /// Removes a session, returning whether it existed.
    pub fn delete_session(&self, session_id: &str) -> Result<bool> {
        let mut storage = self.load()?;
        let removed = storage.sessions.remove(session_id).is_some();
        if removed {
            self.save(&storage)?;
            tracing::info!(session_id, "Deleted chat session");
        }
        Ok(removed)
    }

    pub fn session(&self, session_id: &str) -> Result<Option<ChatSession>> {
        Ok(self.load()?.sessions.remove(session_id))
    }

    /// All sessions, most recently created first.
    pub fn list_sessions(&self) -> Result<Vec<ChatSession>> {
        let mut sessions: Vec<ChatSession> = self.load()?.sessions.into_values().collect();
        sessions.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(sessions)
    }

    pub fn add_message(&self, session_id: &str, message: ChatMessage) -> Result<ChatMessage> {
        let mut storage = self.load()?;
        let session = storage
            .sessions
            .get_mut(session_id)
            .ok_or_else(|| not_found(session_id))?;

        session.updated_at = message.timestamp;

        // Auto-generate title from first user message if still "New Chat"
        if session.title == DEFAULT_TITLE && message.is_user() {
            session.title = generate_chat_title(&message.content);
        }
        session.messages.push(message.clone());

        self.save(&storage)?;
        Ok(message)
    }

    /// Messages in the order they were stored.
    pub fn session_messages(&self, session_id: &str) -> Result<Vec<ChatMessage>> {
        self.session(session_id)?
            .map(|session| session.messages)
            .ok_or_else(|| not_found(session_id))
    }

    fn load(&self) -> Result<ChatSessionsStorage> {
        if !self.path.exists() {
            return Ok(ChatSessionsStorage::default());
        }

        let contents = fs::read_to_string(&self.path)
            .map_err(|e| RagError::History(format!("Failed to read chat sessions file: {}", e)))?;

        serde_json::from_str(&contents)
            .map_err(|e| RagError::History(format!("Failed to parse chat sessions: {}", e)))
    }

    fn save(&self, storage: &ChatSessionsStorage) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        let contents = serde_json::to_string_pretty(storage)
            .map_err(|e| RagError::History(format!("Failed to serialize chat sessions: {}", e)))?;

        let tmp_path = self.path.with_extension("json.tmp");
        fs::write(&tmp_path, contents)
            .map_err(|e| RagError::History(format!("Failed to write chat sessions file: {}", e)))?;
        fs::rename(&tmp_path, &self.path)
            .map_err(|e| RagError::History(format!("Failed to replace chat sessions file: {}", e)))
    }
}

fn not_found(session_id: &str) -> RagError {
    RagError::History(format!("Chat session not found: {}", session_id))
}

fn generate_chat_title(content: &str) -> String {
    let cleaned = content.trim();

    let title = if cleaned.chars().count() <= 60 {
        cleaned.to_string()
    } else {
        // Prefer a word boundary between characters 40 and 60
        let limit = cleaned.char_indices().nth(60).map_or(cleaned.len(), |(i, _)| i);
        let head = &cleaned[..limit];
        let break_point = match head.rfind(' ') {
            Some(space) if head[..space].chars().count() > 40 => space,
            _ => limit,
        };
        let trimmed = cleaned[..break_point].trim_end_matches(['.', ',', '!', '?', ';', ':']);
        format!("{}...", trimmed)
    };

    let mut chars = title.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => title,
    }
}
