//! Prompt cost estimation.
//!
//! Approximation of 4 characters per unit, not a real tokenizer. Every
//! message costs at least one unit so empty turns still count.

use crate::models::chat::ChatMessage;

pub const CHARS_PER_TOKEN: usize = 4;

/// Estimate the cost of a single piece of text: `max(1, chars / 4)`.
pub fn estimate_tokens(text: &str) -> usize {
    (text.chars().count() / CHARS_PER_TOKEN).max(1)
}

/// Sum of per-message estimates.
pub fn estimate_messages_tokens(messages: &[ChatMessage]) -> usize {
    messages
        .iter()
        .map(|msg| estimate_tokens(&msg.content))
        .sum()
}
