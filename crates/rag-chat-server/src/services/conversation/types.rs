use chrono::{DateTime, Utc};

use crate::config::ChatConfig;
use crate::models::chat::{ChatMessage, HistoryResponse, SessionSummary};
use crate::services::retrieval::{RetrievalResult, RetrievedContext};

/// Number of trailing intents included in session listings.
pub const LISTED_INTENTS: usize = 3;

/// Conversation memory for one session id. Lives for the process lifetime.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub session_id: String,

    /// Oldest first; capped at `max_history_messages` after every append.
    pub messages: Vec<ChatMessage>,

    /// Replaced wholesale on refresh, never appended to.
    pub summary: String,

    /// One short phrase per completed turn with intent tracking on.
    pub intents: Vec<String>,

    /// Context and results used by the most recently committed turn.
    pub last_context: String,
    pub last_retrievals: Vec<RetrievalResult>,

    /// Bound on first non-empty value, immutable afterwards.
    pub retrieval_location: Option<String>,

    /// Time of the last committed turn (creation time before the first).
    pub updated_at: DateTime<Utc>,
}

impl SessionState {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            messages: Vec::new(),
            summary: String::new(),
            intents: Vec::new(),
            last_context: String::new(),
            last_retrievals: Vec::new(),
            retrieval_location: None,
            updated_at: Utc::now(),
        }
    }

    /// Append and trim to the newest `max_messages`. Returns how many
    /// messages were dropped.
    pub fn push_message(&mut self, message: ChatMessage, max_messages: usize) -> usize {
        self.messages.push(message);

        let overflow = self.messages.len().saturating_sub(max_messages);
        if overflow > 0 {
            self.messages.drain(0..overflow);
        }
        overflow
    }

    /// Sticky bind. Returns true only when this call set the location.
    pub fn bind_retrieval_location(&mut self, location: Option<&str>) -> bool {
        if self.retrieval_location.is_some() {
            return false;
        }

        match location.map(str::trim).filter(|l| !l.is_empty()) {
            Some(location) => {
                self.retrieval_location = Some(location.to_string());
                true
            }
            None => false,
        }
    }

    pub fn record_turn(&mut self, reply: ChatMessage, retrieved: RetrievedContext, max_messages: usize) {
        self.push_message(reply, max_messages);
        self.last_context = retrieved.context;
        self.last_retrievals = retrieved.results;
        self.updated_at = Utc::now();
    }

    pub fn last_message(&self) -> &str {
        self.messages.last().map(|m| m.content.as_str()).unwrap_or("")
    }

    pub fn snapshot(&self) -> HistoryResponse {
        HistoryResponse {
            session_id: self.session_id.clone(),
            messages: self.messages.clone(),
            summary: self.summary.clone(),
            intents: self.intents.clone(),
            last_context: self.last_context.clone(),
            last_retrievals: self.last_retrievals.clone(),
            vector_store_dir: self.retrieval_location.clone(),
            updated_at: self.updated_at,
        }
    }

    pub fn listing(&self) -> SessionSummary {
        let tail = self.intents.len().saturating_sub(LISTED_INTENTS);
        SessionSummary {
            session_id: self.session_id.clone(),
            updated_at: self.updated_at,
            summary: self.summary.clone(),
            last_message: self.last_message().to_string(),
            vector_store_dir: self.retrieval_location.clone(),
            message_count: self.messages.len(),
            intents: self.intents[tail..].to_vec(),
        }
    }
}

/// Per-request overrides; `None` falls back to the configured default.
#[derive(Debug, Clone, Default)]
pub struct ChatOptions {
    pub retrieval_location: Option<String>,
    pub top_k: Option<usize>,
    pub enable_context: Option<bool>,
    pub enable_summarisation: Option<bool>,
    pub enable_intent_tracking: Option<bool>,
    pub system_prompt_override: Option<String>,
}

impl ChatOptions {
    pub fn with_location(mut self, location: impl Into<String>) -> Self {
        self.retrieval_location = Some(location.into());
        self
    }

    pub fn resolve(&self, config: &ChatConfig) -> TurnSettings {
        TurnSettings {
            enable_context: self.enable_context.unwrap_or(config.enable_context),
            enable_summarisation: self
                .enable_summarisation
                .unwrap_or(config.enable_summarisation),
            enable_intent_tracking: self
                .enable_intent_tracking
                .unwrap_or(config.enable_intent_tracking),
            top_k: self
                .top_k
                .filter(|k| *k > 0)
                .unwrap_or(config.context_top_k),
            system_prompt: self
                .system_prompt_override
                .clone()
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| config.system_prompt.clone()),
        }
    }
}

/// Options after merging with configuration, fixed for one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnSettings {
    pub enable_context: bool,
    pub enable_summarisation: bool,
    pub enable_intent_tracking: bool,
    pub top_k: usize,
    pub system_prompt: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn push_message_keeps_newest() {
        let mut state = SessionState::new("s1");
        assert_eq!(state.push_message(ChatMessage::user("a"), 2), 0);
        assert_eq!(state.push_message(ChatMessage::assistant("A"), 2), 0);
        assert_eq!(state.push_message(ChatMessage::user("b"), 2), 1);

        let contents: Vec<_> = state.messages.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(contents, ["A", "b"]);
    }

    #[test]
    fn location_binds_once() {
        let mut state = SessionState::new("s1");
        assert!(!state.bind_retrieval_location(None));
        assert!(!state.bind_retrieval_location(Some("  ")));
        assert!(state.bind_retrieval_location(Some("/stores/a")));
        assert!(!state.bind_retrieval_location(Some("/stores/b")));
        assert_eq!(state.retrieval_location.as_deref(), Some("/stores/a"));
    }

    #[test]
    fn listing_keeps_last_three_intents() {
        let mut state = SessionState::new("s1");
        state.intents = ["a", "b", "c", "d"].iter().map(|s| s.to_string()).collect();
        state.push_message(ChatMessage::user("latest"), 10);

        let listing = state.listing();
        assert_eq!(listing.intents, ["b", "c", "d"]);
        assert_eq!(listing.last_message, "latest");
        assert_eq!(listing.message_count, 1);
    }

    #[test]
    fn options_fall_back_to_config() {
        let config = ChatConfig::default();
        let settings = ChatOptions {
            enable_context: Some(false),
            top_k: Some(0),
            system_prompt_override: Some("Be terse.".to_string()),
            ..Default::default()
        }
        .resolve(&config);

        assert!(!settings.enable_context);
        assert!(settings.enable_summarisation);
        assert_eq!(settings.top_k, config.context_top_k);
        assert_eq!(settings.system_prompt, "Be terse.");
    }
}
