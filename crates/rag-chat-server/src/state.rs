use axum::extract::FromRef;
use std::sync::Arc;

use crate::services::{ChatService, RetrievalRouter};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub chat_service: Arc<ChatService>,
    /// Same router the chat service uses for context, or `None` when
    /// retrieval is disabled.
    pub retrieval: Option<Arc<RetrievalRouter>>,
}

impl FromRef<AppState> for Arc<ChatService> {
    fn from_ref(state: &AppState) -> Self {
        state.chat_service.clone()
    }
}

impl FromRef<AppState> for Option<Arc<RetrievalRouter>> {
    fn from_ref(state: &AppState) -> Self {
        state.retrieval.clone()
    }
}
