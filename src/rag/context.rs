use crate::chat_sessions::{ChatMessage, ASSISTANT_ROLE, USER_ROLE};
use serde::{Deserialize, Serialize};

/// Number of recent non-system turns folded into a contextualized query.
const CONTEXT_TURNS: usize = 4;
/// Characters of an assistant reply kept in a contextualized query.
const ANSWER_SNIPPET_CHARS: usize = 100;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "role", content = "text", rename_all = "lowercase")]
pub enum ConversationTurn {
    System(String),
    User(String),
    Assistant(String),
}

impl ConversationTurn {
    pub fn role(&self) -> &'static str {
        match self {
            ConversationTurn::System(_) => "system",
            ConversationTurn::User(_) => USER_ROLE,
            ConversationTurn::Assistant(_) => ASSISTANT_ROLE,
        }
    }

    pub fn text(&self) -> &str {
        match self {
            ConversationTurn::System(text)
            | ConversationTurn::User(text)
            | ConversationTurn::Assistant(text) => text,
        }
    }
}

/// Ordered message history of one session, always led by a single system turn.
#[derive(Debug, Clone)]
pub struct ConversationContext {
    turns: Vec<ConversationTurn>,
}

impl ConversationContext {
    pub fn new(system_prompt: impl Into<String>) -> Self {
        Self {
            turns: vec![ConversationTurn::System(system_prompt.into())],
        }
    }

    /// Rebuilds a context from persisted chat messages, in storage order.
    pub fn from_messages(system_prompt: impl Into<String>, messages: &[ChatMessage]) -> Self {
        let mut context = Self::new(system_prompt);
        context.restore(messages);
        context
    }

    /// Appends persisted messages as turns. Roles other than user and
    /// assistant are skipped.
    pub fn restore(&mut self, messages: &[ChatMessage]) {
        for message in messages {
            match message.role.as_str() {
                USER_ROLE => self.record_user(message.content.clone()),
                ASSISTANT_ROLE => self.record_assistant(message.content.clone()),
                other => tracing::warn!(role = other, "Skipping message with unknown role"),
            }
        }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    /// True when only the system turn is present.
    pub fn is_empty(&self) -> bool {
        self.turns.len() <= 1
    }

    /// Appends a user or assistant turn. System turns are ignored; the
    /// context always holds exactly one, at the front.
    pub fn record_turn(&mut self, turn: ConversationTurn) {
        if let ConversationTurn::System(_) = turn {
            tracing::warn!("Ignoring extra system turn");
            return;
        }
        self.turns.push(turn);
    }

    pub fn record_user(&mut self, text: impl Into<String>) {
        self.record_turn(ConversationTurn::User(text.into()));
    }

    pub fn record_assistant(&mut self, text: impl Into<String>) {
        self.record_turn(ConversationTurn::Assistant(text.into()));
    }

    /// Removes the newest turn, never the system turn.
    pub fn pop_turn(&mut self) -> Option<ConversationTurn> {
        if self.is_empty() {
            None
        } else {
            self.turns.pop()
        }
    }

    /// Drops every turn but the system turn.
    pub fn clear(&mut self) {
        self.turns.truncate(1);
    }

    /// Builds the string used for embedding search from the latest turns.
    ///
    /// With no history the query comes back unchanged. Otherwise the last
    /// four user/assistant turns are rendered oldest first, followed by the
    /// current question.
    pub fn contextualize(&self, current_query: &str) -> String {
        if self.is_empty() {
            return current_query.to_string();
        }

        let history = &self.turns[1..];
        let start = history.len().saturating_sub(CONTEXT_TURNS);

        let mut query = String::new();
        for turn in &history[start..] {
            match turn {
                ConversationTurn::User(text) => {
                    query.push_str("User asked: ");
                    query.push_str(text);
                    query.push(' ');
                }
                ConversationTurn::Assistant(text) => {
                    query.push_str("Assistant answered: ");
                    query.push_str(&snippet(text, ANSWER_SNIPPET_CHARS));
                    query.push(' ');
                }
                ConversationTurn::System(_) => {}
            }
        }
        query.push_str("Current question: ");
        query.push_str(current_query);

        tracing::debug!(contextualized_query = %query, "Contextualized query");
        query
    }
}

fn snippet(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}...", &text[..idx]),
        None => text.to_string(),
    }
}
