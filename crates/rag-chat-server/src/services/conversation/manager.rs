use futures::stream::StreamExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::config::ChatConfig;
use crate::models::chat::{ChatMessage, HistoryResponse, SessionSummary};
use crate::services::llm_service::{CompletionProvider, FragmentStream};
use crate::services::retrieval::{ContextProvider, RetrievedContext};
use crate::utils::error::ChatError;

use super::budget::{BudgetEnforcer, TRUNCATION_NOTICE};
use super::prompt::PromptAssembler;
use super::store::{SessionEntry, SessionStore};
use super::turn::PendingTurn;
use super::types::{ChatOptions, TurnSettings};

/// Reply fragments for one turn. Single pass; the turn commits only when
/// the stream is driven to its end.
pub type ChatStream = FragmentStream;

/// Session orchestration: memory, prompt assembly, budgeting and the
/// streaming turn protocol.
pub struct ChatService {
    config: ChatConfig,
    sessions: SessionStore,
    budget: BudgetEnforcer,
    llm: Arc<dyn CompletionProvider>,
    context_provider: Option<Arc<dyn ContextProvider>>,
}

impl ChatService {
    pub fn new(
        config: ChatConfig,
        llm: Arc<dyn CompletionProvider>,
        context_provider: Option<Arc<dyn ContextProvider>>,
    ) -> Self {
        info!(
            "Initializing chat service (history cap: {}, prompt budget: {}, retrieval: {})",
            config.max_history_messages,
            config.max_prompt_tokens,
            if context_provider.is_some() { "enabled" } else { "disabled" }
        );

        Self {
            budget: BudgetEnforcer::new(config.max_prompt_tokens),
            sessions: SessionStore::new(),
            config,
            llm,
            context_provider,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    /// Begin a turn and return its reply stream.
    ///
    /// Waits for any in-flight turn on the same session. The completion
    /// request is only issued once the returned stream is polled.
    pub async fn stream_chat(
        self: &Arc<Self>,
        session_id: &str,
        message: &str,
        options: ChatOptions,
    ) -> Result<ChatStream, ChatError> {
        if session_id.trim().is_empty() {
            return Err(ChatError::invalid("session_id is required"));
        }
        if message.trim().is_empty() {
            return Err(ChatError::invalid("message is required"));
        }

        let settings = options.resolve(&self.config);
        let entry = self.sessions.get_or_create(session_id);
        let turn_guard = entry.lock_turn().await;

        {
            let mut state = entry.state();
            if state.bind_retrieval_location(options.retrieval_location.as_deref()) {
                info!(
                    "Session {} bound to retrieval location {:?}",
                    session_id, state.retrieval_location
                );
            }
        }

        // Retrieval follows the location named by this request; the bound
        // location is only recorded on the session.
        let location = options
            .retrieval_location
            .as_deref()
            .map(str::trim)
            .filter(|location| !location.is_empty());
        let retrieved = self
            .retrieve_context(&settings, location, session_id, message)
            .await;

        let (summary, history) = {
            let mut state = entry.state();
            state.push_message(ChatMessage::user(message), self.config.max_history_messages);
            (state.summary.clone(), state.messages.clone())
        };

        let prompt = PromptAssembler::assemble(
            &settings.system_prompt,
            &summary,
            &retrieved.context,
            &history,
        );
        let (prompt, truncated) = self
            .budget
            .enforce(prompt, || self.ensure_summary(session_id, &entry))
            .await;

        debug!(
            "Prompt for session {}: {} message(s), truncated: {}",
            session_id,
            prompt.len(),
            truncated
        );

        let turn = PendingTurn::new(session_id, entry, turn_guard, message, retrieved);
        let service = Arc::clone(self);

        let stream = async_stream::stream! {
            let mut turn = turn;

            if truncated {
                turn.push_fragment(TRUNCATION_NOTICE);
                yield Ok(TRUNCATION_NOTICE.to_string());
            }

            let mut fragments = match service.llm.stream_complete(&prompt, &service.config.model_kwargs).await {
                Ok(fragments) => fragments,
                Err(e) => {
                    warn!("Completion request failed for session {}: {}", turn.session_id(), e);
                    yield Err(e);
                    return;
                }
            };

            while let Some(fragment) = fragments.next().await {
                match fragment {
                    Ok(fragment) => {
                        turn.push_fragment(&fragment);
                        yield Ok(fragment);
                    }
                    Err(e) => {
                        warn!("Completion stream failed for session {}: {}", turn.session_id(), e);
                        yield Err(e);
                        return;
                    }
                }
            }

            service.finish_turn(&mut turn, &settings).await;
        };

        Ok(Box::pin(stream))
    }

    /// Best-effort: any failure is logged and yields no context.
    async fn retrieve_context(
        &self,
        settings: &TurnSettings,
        location: Option<&str>,
        session_id: &str,
        query: &str,
    ) -> RetrievedContext {
        if !settings.enable_context {
            return RetrievedContext::default();
        }

        let (provider, location) = match (&self.context_provider, location) {
            (Some(provider), Some(location)) => (provider, location),
            (None, Some(_)) => {
                debug!("Context requested for session {} but retrieval is disabled", session_id);
                return RetrievedContext::default();
            }
            _ => return RetrievedContext::default(),
        };

        let start = Instant::now();
        match provider
            .fetch_context(location, session_id, query, settings.top_k)
            .await
        {
            Ok(retrieved) => {
                info!(
                    "Retrieved {} result(s) for session {} in {:.2?}",
                    retrieved.results.len(),
                    session_id,
                    start.elapsed()
                );
                retrieved
            }
            Err(e) => {
                warn!("Failed to fetch context for session {}: {}", session_id, e);
                RetrievedContext::default()
            }
        }
    }

    /// Commit, then refresh summary and intent. Runs with the turn lock held.
    async fn finish_turn(&self, turn: &mut PendingTurn, settings: &TurnSettings) {
        turn.commit(self.config.max_history_messages);

        if settings.enable_summarisation {
            self.refresh_summary(turn.session_id(), turn.entry()).await;
        }
        if settings.enable_intent_tracking {
            self.track_intent(turn.session_id(), turn.entry(), turn.user_message())
                .await;
        }
    }

    /// Generate a summary from current history.
    ///
    /// A blank reply is treated like a failure: the prior summary stays in
    /// place instead of being overwritten with empty text.
    async fn refresh_summary(&self, session_id: &str, entry: &SessionEntry) -> Option<String> {
        let history = entry.state().messages.clone();
        let request = PromptAssembler::summary_request(&self.config.summarise_prompt, &history);

        match self.llm.complete(&request, &self.config.model_kwargs).await {
            Ok(summary) if !summary.trim().is_empty() => {
                let summary = summary.trim().to_string();
                entry.state().summary = summary.clone();
                debug!("Updated summary for session {}", session_id);
                Some(summary)
            }
            Ok(_) => {
                warn!("Summary for session {} came back empty; keeping previous", session_id);
                None
            }
            Err(e) => {
                warn!("Failed to update summary for session {}: {}", session_id, e);
                None
            }
        }
    }

    /// Existing summary, or a freshly generated one, or "" on failure.
    async fn ensure_summary(&self, session_id: &str, entry: &SessionEntry) -> String {
        let existing = entry.state().summary.clone();
        if !existing.is_empty() {
            return existing;
        }

        self.refresh_summary(session_id, entry)
            .await
            .unwrap_or_default()
    }

    async fn track_intent(&self, session_id: &str, entry: &SessionEntry, latest_user_message: &str) {
        let request = PromptAssembler::intent_request(&self.config.intent_prompt, latest_user_message);

        match self.llm.complete(&request, &self.config.model_kwargs).await {
            Ok(intent) if !intent.trim().is_empty() => {
                let intent = intent.trim().to_string();
                debug!("Captured intent for session {}: {}", session_id, intent);
                entry.state().intents.push(intent);
            }
            Ok(_) => debug!("No intent returned for session {}", session_id),
            Err(e) => warn!("Failed to capture intent for session {}: {}", session_id, e),
        }
    }

    pub fn get_history(&self, session_id: &str) -> Result<HistoryResponse, ChatError> {
        self.sessions
            .get(session_id)
            .map(|entry| entry.state().snapshot())
            .ok_or_else(|| ChatError::NotFound(format!("No chat session found for id '{}'", session_id)))
    }

    /// Most recently updated first.
    pub fn list_sessions(&self) -> Vec<SessionSummary> {
        let mut sessions: Vec<SessionSummary> = self
            .sessions
            .entries()
            .iter()
            .map(|entry| entry.state().listing())
            .collect();

        sessions.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        sessions
    }
}
