use crate::models::chat::ChatMessage;

pub const SUMMARY_NOTE_PREFIX: &str = "Conversation summary: ";
pub const CONTEXT_NOTE_PREFIX: &str = "Context for this turn:\n";

pub fn summary_note(summary: &str) -> ChatMessage {
    ChatMessage::system(format!("{}{}", SUMMARY_NOTE_PREFIX, summary))
}

pub fn context_note(context: &str) -> ChatMessage {
    ChatMessage::system(format!("{}{}", CONTEXT_NOTE_PREFIX, context))
}

/// Renders session memory into the message list sent to the model.
pub struct PromptAssembler;

impl PromptAssembler {
    /// `[system] [summary?] [context?] history...`
    ///
    /// Grounding notes always precede the literal conversation, and history
    /// is passed through in stored order.
    pub fn assemble(
        system_prompt: &str,
        summary: &str,
        context: &str,
        history: &[ChatMessage],
    ) -> Vec<ChatMessage> {
        let mut prompt = Vec::with_capacity(history.len() + 3);
        prompt.push(ChatMessage::system(system_prompt));

        if !summary.is_empty() {
            prompt.push(summary_note(summary));
        }
        if !context.is_empty() {
            prompt.push(context_note(context));
        }

        prompt.extend_from_slice(history);
        prompt
    }

    /// Request asking the model to compact `history`.
    pub fn summary_request(summarise_prompt: &str, history: &[ChatMessage]) -> Vec<ChatMessage> {
        let transcript = history
            .iter()
            .map(|m| format!("{}: {}", m.role.as_str(), m.content))
            .collect::<Vec<_>>()
            .join("\n");

        vec![
            ChatMessage::system(summarise_prompt),
            ChatMessage::user(transcript),
        ]
    }

    pub fn intent_request(intent_prompt: &str, latest_user_message: &str) -> Vec<ChatMessage> {
        vec![
            ChatMessage::system(intent_prompt),
            ChatMessage::user(latest_user_message),
        ]
    }
}
