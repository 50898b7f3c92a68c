//! Vector-store retrieval with session-scoped handle caching
//!
//! - `RetrievalHandle`: a loaded, queryable store (expensive to build)
//! - `RetrievalCacheManager`: per-location, TTL-evicted handle cache
//! - `RetrievalRouter`: location -> cache manager, and the `ContextProvider`
//!   injected into the chat service

mod cache;
mod router;
pub mod vector_store;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::Arc;

use crate::utils::error::ChatError;

pub use cache::RetrievalCacheManager;
pub use router::RetrievalRouter;
pub use vector_store::{VectorStore, VectorStoreFactory};

/// Separator between chunk texts in a context string.
pub const CONTEXT_SEPARATOR: &str = "\n\n";

/// One ranked match from a similarity search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalResult {
    pub id: usize,
    pub score: f32,
    pub text: String,
    #[serde(default)]
    pub metadata: Map<String, Value>,
}

/// Context string plus the results it was built from.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RetrievedContext {
    pub context: String,
    pub results: Vec<RetrievalResult>,
}

impl RetrievedContext {
    pub fn from_results(results: Vec<RetrievalResult>) -> Self {
        Self {
            context: build_context(&results),
            results,
        }
    }
}

/// Concatenate non-empty result texts for a RAG prompt.
pub fn build_context(results: &[RetrievalResult]) -> String {
    results
        .iter()
        .filter(|r| !r.text.is_empty())
        .map(|r| r.text.as_str())
        .collect::<Vec<_>>()
        .join(CONTEXT_SEPARATOR)
}

/// A loaded store ready for similarity search.
#[async_trait]
pub trait RetrievalHandle: Send + Sync {
    async fn search(&self, query: &str, top_k: usize) -> Result<Vec<RetrievalResult>, ChatError>;
}

/// Builds handles for a backend location (a store directory for the
/// file-backed implementation).
#[async_trait]
pub trait RetrievalBackendFactory: Send + Sync {
    async fn open(&self, location: &str) -> Result<Arc<dyn RetrievalHandle>, ChatError>;
}

/// Capability the chat service uses to ground a turn.
#[async_trait]
pub trait ContextProvider: Send + Sync {
    async fn fetch_context(
        &self,
        location: &str,
        session_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, ChatError>;
}
