use super::context::ConversationTurn;
use crate::config::RagConfig;
use crate::error::{RagError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, error};

/// Turns text into a fixed-length vector.
#[async_trait]
pub trait EmbeddingModel: Send + Sync {
    async fn embed(&self, text: &str) -> Result<Vec<f32>>;

    /// Length of every vector this model produces.
    fn dimensions(&self) -> usize;
}

/// Produces a reply to a conversation.
#[async_trait]
pub trait ChatModel: Send + Sync {
    async fn chat(&self, messages: &[ConversationTurn]) -> Result<String>;
}

const PROVIDER: &str = "OpenAI";

/// Client for an OpenAI-compatible embeddings and chat-completions API.
pub struct OpenAiClient {
    client: reqwest::Client,
    api_key: String,
    api_base: String,
    embedding_model: String,
    embedding_dimensions: usize,
    chat_model: String,
    temperature: f32,
}

impl OpenAiClient {
    /// Builds a client from an already validated API key.
    pub fn new(api_key: impl Into<String>, config: &RagConfig) -> Result<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(RagError::Config("API key must not be empty".to_string()));
        }

        Ok(Self {
            client: reqwest::Client::new(),
            api_key,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            embedding_model: config.embedding_model.clone(),
            embedding_dimensions: config.embedding_dimensions,
            chat_model: config.chat_model.clone(),
            temperature: config.temperature,
        })
    }

    async fn post<B: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &B,
    ) -> std::result::Result<R, String> {
        let url = format!("{}/{}", self.api_base, path);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| format!("request failed: {}", e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let detail = serde_json::from_str::<ErrorResponse>(&body)
                .map(|e| e.error.message)
                .unwrap_or(body);
            return Err(format!("API returned {}: {}", status, detail));
        }

        response
            .json()
            .await
            .map_err(|e| format!("failed to parse response: {}", e))
    }
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: Vec<&'a str>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatRequestMessage<'a>>,
    temperature: f32,
}

#[derive(Serialize)]
struct ChatRequestMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Deserialize)]
struct ChatResponseMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct ErrorResponse {
    error: ErrorDetail,
}

#[derive(Deserialize)]
struct ErrorDetail {
    message: String,
}

#[async_trait]
impl EmbeddingModel for OpenAiClient {
    async fn embed(&self, text: &str) -> Result<Vec<f32>> {
        debug!(model = %self.embedding_model, text_len = text.len(), "Creating embedding");

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: vec![text],
        };
        let embedding_error = |message: String| {
            error!(provider = PROVIDER, error = %message, "Embedding request failed");
            RagError::EmbeddingCall {
                provider: PROVIDER.to_string(),
                message,
            }
        };

        let response: EmbeddingResponse =
            self.post("embeddings", &request).await.map_err(embedding_error)?;
        response
            .data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or_else(|| embedding_error("No embedding returned".to_string()))
    }

    fn dimensions(&self) -> usize {
        self.embedding_dimensions
    }
}

#[async_trait]
impl ChatModel for OpenAiClient {
    async fn chat(&self, messages: &[ConversationTurn]) -> Result<String> {
        debug!(model = %self.chat_model, messages = messages.len(), "Sending chat request");

        let request = ChatRequest {
            model: &self.chat_model,
            messages: messages
                .iter()
                .map(|turn| ChatRequestMessage {
                    role: turn.role(),
                    content: turn.text(),
                })
                .collect(),
            temperature: self.temperature,
        };
        let chat_error = |message: String| {
            error!(provider = PROVIDER, error = %message, "Chat request failed");
            RagError::ChatCall {
                provider: PROVIDER.to_string(),
                message,
            }
        };

        let response: ChatResponse = self.post("chat/completions", &request).await.map_err(chat_error)?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| chat_error("No content in response".to_string()))
    }
}
