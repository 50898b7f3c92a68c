use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::{RetrievalBackendFactory, RetrievalHandle, RetrievedContext};
use crate::utils::error::ChatError;

struct CacheEntry {
    handle: Arc<dyn RetrievalHandle>,
    last_access: Instant,
}

/// Session-scoped retrieval handles for one backend location.
///
/// Entries idle for longer than `ttl` are dropped lazily, on the next
/// `get_handle` call for any session. There is no background sweep.
pub struct RetrievalCacheManager {
    location: String,
    ttl: Duration,
    factory: Arc<dyn RetrievalBackendFactory>,
    entries: Mutex<HashMap<String, CacheEntry>>,
}

impl RetrievalCacheManager {
    pub fn new(
        location: impl Into<String>,
        ttl: Duration,
        factory: Arc<dyn RetrievalBackendFactory>,
    ) -> Self {
        let location = location.into();
        info!(
            "Initializing retrieval cache for {} (ttl: {:?})",
            location, ttl
        );
        Self {
            location,
            ttl,
            factory,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn location(&self) -> &str {
        &self.location
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.lock().contains_key(session_id)
    }

    fn evict_stale(&self, entries: &mut HashMap<String, CacheEntry>, now: Instant) {
        let ttl = self.ttl;
        let before = entries.len();
        entries.retain(|session_id, entry| {
            let keep = now.duration_since(entry.last_access) <= ttl;
            if !keep {
                info!(
                    "Evicting retrieval handle for session {} at {} (idle {:?})",
                    session_id,
                    self.location,
                    now.duration_since(entry.last_access)
                );
            }
            keep
        });

        let evicted = before - entries.len();
        if evicted > 0 {
            debug!("Evicted {} stale handle(s) from {}", evicted, self.location);
        }
    }

    /// Live handle for `session_id`, constructing one on miss.
    pub async fn get_handle(&self, session_id: &str) -> Result<Arc<dyn RetrievalHandle>, ChatError> {
        if session_id.trim().is_empty() {
            return Err(ChatError::invalid("session_id must not be empty"));
        }

        {
            let mut entries = self.entries.lock();
            let now = Instant::now();
            self.evict_stale(&mut entries, now);

            if let Some(entry) = entries.get_mut(session_id) {
                entry.last_access = now;
                debug!("Retrieval cache hit for session {}", session_id);
                return Ok(entry.handle.clone());
            }
        }

        info!(
            "Retrieval cache miss for session {}, loading {}",
            session_id, self.location
        );
        let handle = self.factory.open(&self.location).await.map_err(|e| {
            warn!("Failed to load retrieval handle for {}: {}", self.location, e);
            match e {
                ChatError::Unavailable(_) => e,
                other => ChatError::unavailable(format!(
                    "Retrieval backend {} could not be loaded: {}",
                    self.location, other
                )),
            }
        })?;

        // Another task may have loaded the same session while we were
        // awaiting; the first insert wins.
        let mut entries = self.entries.lock();
        let entry = entries
            .entry(session_id.to_string())
            .or_insert_with(|| CacheEntry {
                handle,
                last_access: Instant::now(),
            });
        Ok(entry.handle.clone())
    }

    /// Ranked results and their concatenated context for `query`.
    pub async fn query(
        &self,
        session_id: &str,
        query: &str,
        top_k: usize,
    ) -> Result<RetrievedContext, ChatError> {
        let handle = self.get_handle(session_id).await?;

        let results = handle
            .search(query, top_k)
            .await
            .map_err(ChatError::into_backend_failure)?;

        if let Some(entry) = self.entries.lock().get_mut(session_id) {
            entry.last_access = Instant::now();
        }

        debug!(
            "Retrieved {} result(s) for session {} from {}",
            results.len(),
            session_id,
            self.location
        );
        Ok(RetrievedContext::from_results(results))
    }
}
