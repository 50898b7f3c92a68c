pub mod config;
pub mod handlers;
pub mod logging;
pub mod models;
pub mod services;
pub mod state;
pub mod utils;

use axum::{
    routing::{get, post},
    Router,
};
use std::sync::Arc;
use tower_http::{
    cors::CorsLayer,
    trace::{DefaultMakeSpan, TraceLayer},
};
use tracing::info;

use config::Settings;
use services::retrieval::{ContextProvider, VectorStoreFactory};
use services::{ChatService, EmbeddingService, LlmService, RetrievalRouter};
use state::AppState;
use utils::error::ChatError;

/// Wire the services described by `settings`.
pub fn build_state(settings: &Settings) -> Result<AppState, ChatError> {
    let llm_service = Arc::new(LlmService::new(settings.llm.clone())?);

    let retrieval = if settings.retrieval.enabled {
        let embedding_service = Arc::new(EmbeddingService::new(
            settings.retrieval.embedding.clone(),
        )?);
        let factory = Arc::new(VectorStoreFactory::new(embedding_service));
        info!(
            "Retrieval enabled (handle ttl: {:?})",
            settings.retrieval.cache_ttl()
        );
        Some(Arc::new(RetrievalRouter::new(
            settings.retrieval.cache_ttl(),
            factory,
        )))
    } else {
        info!("Retrieval disabled");
        None
    };

    let context_provider = retrieval
        .clone()
        .map(|router| router as Arc<dyn ContextProvider>);

    let chat_service = Arc::new(ChatService::new(
        settings.chat.clone(),
        llm_service,
        context_provider,
    ));

    Ok(AppState {
        chat_service,
        retrieval,
    })
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/chat", post(handlers::chat::chat_stream_handler))
        .route(
            "/chat/history/{session_id}",
            get(handlers::history::history_handler),
        )
        .route(
            "/chat/sessions",
            get(handlers::history::list_sessions_handler),
        )
        .route(
            "/vector-store/query",
            post(handlers::retrieval::vector_store_query_handler),
        )
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::default().include_headers(true)),
        )
}
