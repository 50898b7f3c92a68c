use std::future::Future;
use tracing::{info, warn};

use super::prompt::summary_note;
use crate::models::chat::ChatMessage;
use crate::utils::token_estimator::estimate_messages_tokens;

/// System message placed in a rebuilt prompt.
pub const TRUNCATION_SYSTEM_NOTE: &str =
    "History was replaced with a summary to fit the context window.";

/// First fragment streamed to the caller when the prompt was rebuilt. Also
/// prefixed onto the recorded reply.
pub const TRUNCATION_NOTICE: &str =
    "Note: Some earlier conversation was truncated to fit the context window. ";

/// Keeps the outgoing prompt under `max_prompt_tokens` by swapping history
/// for a summary. Stored history is never touched here.
#[derive(Debug, Clone, Copy)]
pub struct BudgetEnforcer {
    max_prompt_tokens: i64,
}

impl BudgetEnforcer {
    pub fn new(max_prompt_tokens: i64) -> Self {
        Self { max_prompt_tokens }
    }

    pub fn is_enabled(&self) -> bool {
        self.max_prompt_tokens > 0
    }

    pub fn fits(&self, prompt: &[ChatMessage]) -> bool {
        !self.is_enabled() || estimate_messages_tokens(prompt) as i64 <= self.max_prompt_tokens
    }

    /// Returns the prompt to send and whether it was rebuilt.
    ///
    /// `ensure_summary` is only awaited when the prompt is over budget; it
    /// should yield the session summary (generating one if none exists) and
    /// an empty string if that fails.
    pub async fn enforce<F, Fut>(
        &self,
        prompt: Vec<ChatMessage>,
        ensure_summary: F,
    ) -> (Vec<ChatMessage>, bool)
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = String>,
    {
        if self.fits(&prompt) {
            return (prompt, false);
        }

        let cost = estimate_messages_tokens(&prompt);
        info!(
            "Prompt cost {} exceeds budget {}, replacing history with summary",
            cost, self.max_prompt_tokens
        );

        let summary = ensure_summary().await;
        if summary.is_empty() {
            warn!("No summary available for truncated prompt");
        }

        (Self::rebuild(prompt, &summary), true)
    }

    /// All system messages, the summary note, the truncation note, and only
    /// the latest non-system message.
    pub fn rebuild(prompt: Vec<ChatMessage>, summary: &str) -> Vec<ChatMessage> {
        let (mut rebuilt, turns): (Vec<_>, Vec<_>) =
            prompt.into_iter().partition(ChatMessage::is_system);

        // Placed directly before the truncation note even if the assembled
        // prompt already carries it.
        if !summary.is_empty() {
            rebuilt.push(summary_note(summary));
        }
        rebuilt.push(ChatMessage::system(TRUNCATION_SYSTEM_NOTE));
        rebuilt.extend(turns.into_iter().last());
        rebuilt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::conversation::prompt::PromptAssembler;

    async fn summary_not_expected() -> String {
        panic!("summary requested within budget")
    }

    fn long_history() -> Vec<ChatMessage> {
        vec![
            ChatMessage::user("x".repeat(400)),
            ChatMessage::assistant("y".repeat(400)),
            ChatMessage::user("current question"),
        ]
    }

    #[tokio::test]
    async fn within_budget_is_untouched() {
        let prompt = PromptAssembler::assemble("sys", "", "", &[ChatMessage::user("hi")]);
        let (out, truncated) = BudgetEnforcer::new(1_000)
            .enforce(prompt.clone(), summary_not_expected)
            .await;

        assert!(!truncated);
        assert_eq!(out, prompt);
    }

    #[tokio::test]
    async fn disabled_budget_always_passes() {
        let prompt = PromptAssembler::assemble("sys", "", "", &long_history());
        let (out, truncated) = BudgetEnforcer::new(0)
            .enforce(prompt.clone(), summary_not_expected)
            .await;

        assert!(!truncated);
        assert_eq!(out.len(), prompt.len());
    }

    #[tokio::test]
    async fn over_budget_keeps_only_current_turn() {
        let prompt = PromptAssembler::assemble("sys", "", "ctx", &long_history());
        let (out, truncated) = BudgetEnforcer::new(50)
            .enforce(prompt, || async { "they asked about x".to_string() })
            .await;

        assert!(truncated);
        let non_system: Vec<_> = out.iter().filter(|m| !m.is_system()).collect();
        assert_eq!(non_system.len(), 1);
        assert_eq!(non_system[0].content, "current question");

        assert_eq!(out[0].content, "sys");
        assert_eq!(out[1].content, "Context for this turn:\nctx");
        assert_eq!(out[2].content, "Conversation summary: they asked about x");
        assert_eq!(out[3].content, TRUNCATION_SYSTEM_NOTE);
    }

    #[tokio::test]
    async fn failed_summary_still_truncates() {
        let prompt = PromptAssembler::assemble("sys", "", "", &long_history());
        let (out, truncated) = BudgetEnforcer::new(50)
            .enforce(prompt, || async { String::new() })
            .await;

        assert!(truncated);
        assert_eq!(out.len(), 3);
        assert_eq!(out[1].content, TRUNCATION_SYSTEM_NOTE);
    }

    #[test]
    fn summary_note_precedes_truncation_note() {
        let prompt = PromptAssembler::assemble("sys", "old", "", &long_history());
        let out = BudgetEnforcer::rebuild(prompt, "old");

        let contents: Vec<&str> = out.iter().map(|m| m.content.as_str()).collect();
        assert_eq!(
            contents,
            [
                "sys",
                "Conversation summary: old",
                "Conversation summary: old",
                TRUNCATION_SYSTEM_NOTE,
                "current question",
            ]
        );
    }
}
