use dashmap::DashMap;
use parking_lot::{Mutex, MutexGuard};
use std::sync::Arc;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, info};

use super::types::SessionState;

/// One session: its state plus the lock that serialises turns.
///
/// The turn lock is held for a whole turn, across awaits. The state mutex
/// is only held for short synchronous reads and writes.
pub struct SessionEntry {
    turn_lock: Arc<tokio::sync::Mutex<()>>,
    state: Mutex<SessionState>,
}

impl SessionEntry {
    fn new(session_id: &str) -> Self {
        Self {
            turn_lock: Arc::new(tokio::sync::Mutex::new(())),
            state: Mutex::new(SessionState::new(session_id)),
        }
    }

    /// Wait for any in-flight turn on this session to finish.
    pub async fn lock_turn(&self) -> OwnedMutexGuard<()> {
        self.turn_lock.clone().lock_owned().await
    }

    pub fn state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }
}

/// Thread-safe in-memory session map. Sessions are never evicted.
#[derive(Clone, Default)]
pub struct SessionStore {
    sessions: Arc<DashMap<String, Arc<SessionEntry>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        info!("Initializing session store");
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<Arc<SessionEntry>> {
        self.sessions.get(session_id).map(|e| e.value().clone())
    }

    pub fn get_or_create(&self, session_id: &str) -> Arc<SessionEntry> {
        if let Some(entry) = self.get(session_id) {
            return entry;
        }

        self.sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                debug!("Creating session {}", session_id);
                Arc::new(SessionEntry::new(session_id))
            })
            .clone()
    }

    pub fn entries(&self) -> Vec<Arc<SessionEntry>> {
        self.sessions.iter().map(|e| e.value().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn get_or_create_returns_same_entry() {
        let store = SessionStore::new();
        let a = store.get_or_create("s1");
        let b = store.get_or_create("s1");

        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(store.len(), 1);
        assert!(store.get("missing").is_none());
    }

    #[tokio::test]
    async fn turn_lock_serialises_turns() {
        let store = SessionStore::new();
        let entry = store.get_or_create("s1");

        let guard = entry.lock_turn().await;
        let waiter = {
            let entry = entry.clone();
            tokio::spawn(async move {
                let _guard = entry.lock_turn().await;
            })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        drop(guard);
        waiter.await.unwrap();
    }
}
