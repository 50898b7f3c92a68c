use async_trait::async_trait;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use super::{ContextProvider, RetrievalBackendFactory, RetrievalCacheManager, RetrievedContext};
use crate::utils::error::ChatError;

/// Backend location -> cache manager.
///
/// Managers are created on first use and kept until `remove_location` is
/// called, so the map grows with the number of distinct locations served.
#[derive(Clone)]
pub struct RetrievalRouter {
    managers: Arc<DashMap<String, Arc<RetrievalCacheManager>>>,
    ttl: Duration,
    factory: Arc<dyn RetrievalBackendFactory>,
}

impl RetrievalRouter {
    pub fn new(ttl: Duration, factory: Arc<dyn RetrievalBackendFactory>) -> Self {
        Self {
            managers: Arc::new(DashMap::new()),
            ttl,
            factory,
        }
    }

    pub fn manager(&self, location: &str) -> Result<Arc<RetrievalCacheManager>, ChatError> {
        let location = location.trim();
        if location.is_empty() {
            return Err(ChatError::invalid("retrieval location must not be empty"));
        }

        let manager = self
            .managers
            .entry(location.to_string())
            .or_insert_with(|| {
                Arc::new(RetrievalCacheManager::new(
                    location,
                    self.ttl,
                    self.factory.clone(),
                ))
            })
            .clone();

        Ok(manager)
    }

    pub async fn query(
        &self,
        location: &str,
        session_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, ChatError> {
        let manager = self.manager(location)?;
        manager.query(session_id, query, top_k).await
    }

    /// Drop the manager (and every cached handle) for `location`.
    pub fn remove_location(&self, location: &str) -> bool {
        let removed = self.managers.remove(location.trim()).is_some();
        if removed {
            info!("Removed retrieval cache for {}", location);
        }
        removed
    }

    pub fn locations_len(&self) -> usize {
        self.managers.len()
    }
}

#[async_trait]
impl ContextProvider for RetrievalRouter {
    async fn fetch_context(
        &self,
        location: &str,
        session_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, ChatError> {
        self.query(location, session_id, query, top_k).await
    }
}
