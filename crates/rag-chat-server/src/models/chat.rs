use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::services::conversation::ChatOptions;
use crate::services::retrieval::RetrievalResult;

// ===== MESSAGE MODELS =====

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One `{role, content}` entry, both in stored history and in outgoing prompts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

// ===== REQUEST MODELS =====

#[derive(Debug, Deserialize)]
pub struct ChatRequest {
    pub session_id: String,
    pub message: String,
    #[serde(default)]
    pub vector_store_dir: Option<String>,
    #[serde(default)]
    pub top_k: Option<usize>,
    #[serde(default)]
    pub enable_context: Option<bool>,
    #[serde(default)]
    pub enable_summarisation: Option<bool>,
    #[serde(default)]
    pub enable_intent_tracking: Option<bool>,
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl ChatRequest {
    pub fn options(&self) -> ChatOptions {
        ChatOptions {
            retrieval_location: self.vector_store_dir.clone(),
            top_k: self.top_k,
            enable_context: self.enable_context,
            enable_summarisation: self.enable_summarisation,
            enable_intent_tracking: self.enable_intent_tracking,
            system_prompt_override: self.system_prompt.clone(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct RetrievalRequest {
    pub store_dir: String,
    pub session_id: String,
    pub query: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
}

fn default_top_k() -> usize {
    4
}

// ===== RESPONSE MODELS =====

#[derive(Debug, Serialize)]
pub struct RetrievalResponse {
    pub results: Vec<RetrievalResult>,
    pub context: String,
}

/// Point-in-time copy of a session, returned by history lookups.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    pub messages: Vec<ChatMessage>,
    pub summary: String,
    pub intents: Vec<String>,
    pub last_context: String,
    pub last_retrievals: Vec<RetrievalResult>,
    pub vector_store_dir: Option<String>,
    pub updated_at: DateTime<Utc>,
}

/// Lightweight per-session row for listings.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub updated_at: DateTime<Utc>,
    pub summary: String,
    pub last_message: String,
    pub vector_store_dir: Option<String>,
    pub message_count: usize,
    pub intents: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(json["content"], "hi");
    }

    #[test]
    fn chat_request_maps_to_options() {
        let request: ChatRequest = serde_json::from_value(serde_json::json!({
            "session_id": "s1",
            "message": "hello",
            "vector_store_dir": "/stores/docs",
            "enable_context": false,
        }))
        .unwrap();

        let options = request.options();
        assert_eq!(options.retrieval_location.as_deref(), Some("/stores/docs"));
        assert_eq!(options.enable_context, Some(false));
        assert_eq!(options.top_k, None);
        assert_eq!(options.enable_summarisation, None);
    }
}
