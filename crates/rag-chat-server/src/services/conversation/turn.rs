use std::sync::Arc;
use std::time::Instant;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};

use super::store::SessionEntry;
use crate::models::chat::ChatMessage;
use crate::services::retrieval::RetrievedContext;

/// A turn that has begun but not yet committed.
///
/// Holds the session's turn lock. Committing records the reply; dropping
/// without committing leaves the session as it was at begin (the user
/// message stays, nothing else changes).
pub struct PendingTurn {
    session_id: String,
    entry: Arc<SessionEntry>,
    _turn_guard: OwnedMutexGuard<()>,
    user_message: String,
    retrieved: RetrievedContext,
    reply: String,
    fragments: usize,
    started: Instant,
    committed: bool,
}

impl PendingTurn {
    pub fn new(
        session_id: &str,
        entry: Arc<SessionEntry>,
        turn_guard: OwnedMutexGuard<()>,
        user_message: &str,
        retrieved: RetrievedContext,
    ) -> Self {
        Self {
            session_id: session_id.to_string(),
            entry,
            _turn_guard: turn_guard,
            user_message: user_message.to_string(),
            retrieved,
            reply: String::new(),
            fragments: 0,
            started: Instant::now(),
            committed: false,
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn entry(&self) -> &SessionEntry {
        &self.entry
    }

    pub fn user_message(&self) -> &str {
        &self.user_message
    }

    pub fn push_fragment(&mut self, fragment: &str) {
        self.reply.push_str(fragment);
        self.fragments += 1;
    }

    pub fn reply(&self) -> &str {
        &self.reply
    }

    /// Record the reply and the context it was grounded on. The turn lock
    /// stays held until `self` is dropped.
    pub fn commit(&mut self, max_history_messages: usize) {
        if self.committed {
            return;
        }

        let reply = ChatMessage::assistant(std::mem::take(&mut self.reply));
        let retrieved = std::mem::take(&mut self.retrieved);
        self.entry
            .state()
            .record_turn(reply, retrieved, max_history_messages);
        self.committed = true;

        info!(
            "Committed turn for session {} ({} fragment(s) in {:.2?})",
            self.session_id,
            self.fragments,
            self.started.elapsed()
        );
    }
}

impl Drop for PendingTurn {
    fn drop(&mut self) {
        if !self.committed {
            warn!(
                "Turn for session {} abandoned after {} fragment(s); reply not recorded",
                self.session_id, self.fragments
            );
        }
    }
}
