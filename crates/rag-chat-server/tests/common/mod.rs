#![allow(dead_code)]

use async_trait::async_trait;
use futures::stream;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;

use rag_chat_server::config::ChatConfig;
use rag_chat_server::models::ChatMessage;
use rag_chat_server::services::embedding_service::EmbeddingProvider;
use rag_chat_server::services::llm_service::{CompletionProvider, FragmentStream};
use rag_chat_server::services::retrieval::{
    ContextProvider, RetrievalResult, RetrievedContext,
};
use rag_chat_server::services::ChatService;
use rag_chat_server::utils::error::ChatError;

/// Streams `reply-<n>` split into two fragments for the n-th streamed turn;
/// one-shot calls return `one_shot`. When `fail_after_first_fragment` is set
/// the second fragment is replaced by that error.
pub struct ScriptedLlm {
    pub one_shot: Mutex<Result<String, ChatError>>,
    pub stream_failure: Mutex<Option<ChatError>>,
    pub fail_after_first_fragment: Mutex<Option<ChatError>>,
    pub prompts: Mutex<Vec<Vec<ChatMessage>>>,
    pub one_shot_calls: Mutex<usize>,
}

impl ScriptedLlm {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            one_shot: Mutex::new(Ok("summary text".to_string())),
            stream_failure: Mutex::new(None),
            fail_after_first_fragment: Mutex::new(None),
            prompts: Mutex::new(Vec::new()),
            one_shot_calls: Mutex::new(0),
        })
    }

    pub fn last_prompt(&self) -> Vec<ChatMessage> {
        self.prompts.lock().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionProvider for ScriptedLlm {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _model_kwargs: &Map<String, Value>,
    ) -> Result<String, ChatError> {
        *self.one_shot_calls.lock() += 1;
        self.one_shot.lock().clone()
    }

    async fn stream_complete(
        &self,
        messages: &[ChatMessage],
        _model_kwargs: &Map<String, Value>,
    ) -> Result<FragmentStream, ChatError> {
        if let Some(err) = self.stream_failure.lock().clone() {
            return Err(err);
        }

        let mut prompts = self.prompts.lock();
        prompts.push(messages.to_vec());
        let n = prompts.len();

        let second = match self.fail_after_first_fragment.lock().take() {
            Some(err) => Err(err),
            None => Ok(n.to_string()),
        };
        let fragments: Vec<Result<String, ChatError>> = vec![Ok("reply-".to_string()), second];
        Ok(Box::pin(stream::iter(fragments)))
    }
}

/// Context provider that records the locations it is asked for.
pub struct RecordingContext {
    pub calls: Mutex<Vec<String>>,
    pub fail: bool,
}

impl RecordingContext {
    pub fn new(fail: bool) -> Arc<Self> {
        Arc::new(Self {
            calls: Mutex::new(Vec::new()),
            fail,
        })
    }
}

#[async_trait]
impl ContextProvider for RecordingContext {
    async fn fetch_context(
        &self,
        location: &str,
        _session_id: &str,
        query: &str,
        _top_k: usize,
    ) -> Result<RetrievedContext, ChatError> {
        self.calls.lock().push(location.to_string());
        if self.fail {
            return Err(ChatError::unavailable("index could not be loaded"));
        }
        Ok(RetrievedContext::from_results(vec![RetrievalResult {
            id: 0,
            score: 0.9,
            text: format!("facts about {}", query),
            metadata: Map::new(),
        }]))
    }
}

/// Maps text to a fixed 2-d vector by keyword.
pub struct KeywordEmbedder;

#[async_trait]
impl EmbeddingProvider for KeywordEmbedder {
    async fn embed(&self, text: &str) -> Result<Vec<f32>, ChatError> {
        if text.contains("north") {
            Ok(vec![0.0, 1.0])
        } else {
            Ok(vec![1.0, 0.0])
        }
    }
}

pub fn quiet_config() -> ChatConfig {
    ChatConfig {
        enable_summarisation: false,
        enable_intent_tracking: false,
        ..ChatConfig::default()
    }
}

pub fn chat_service(
    config: ChatConfig,
    llm: Arc<ScriptedLlm>,
    context: Option<Arc<dyn ContextProvider>>,
) -> Arc<ChatService> {
    Arc::new(ChatService::new(config, llm, context))
}
