//! Session store shared by the streaming transports.
//!
//! Each transport owns one store, mapping a session identifier to the live
//! handle for that session. Entries are removed when the connection closes,
//! when they sit idle past the configured limit, or when the server shuts
//! down.

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;

struct Entry<T> {
    handle: Arc<T>,
    last_seen: Instant,
}

/// Session identifier → transport handle.
pub struct SessionStore<T> {
    sessions: DashMap<String, Entry<T>>,
}

impl<T> SessionStore<T> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            sessions: DashMap::new(),
        }
    }

    /// Generates a fresh, unguessable session identifier.
    #[must_use]
    pub fn new_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }

    /// Stores `handle` under `id`, replacing any previous entry.
    pub fn insert(&self, id: impl Into<String>, handle: Arc<T>) {
        let entry = Entry {
            handle,
            last_seen: Instant::now(),
        };
        self.sessions.insert(id.into(), entry);
    }

    /// Looks up a session and marks it as active.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.get_mut(id).map(|mut entry| {
            entry.last_seen = Instant::now();
            Arc::clone(&entry.handle)
        })
    }

    /// Removes a session, returning its handle if it was present.
    pub fn remove(&self, id: &str) -> Option<Arc<T>> {
        self.sessions.remove(id).map(|(_, entry)| entry.handle)
    }

    /// Removes and returns every session not looked up for `max_idle`.
    pub fn expire_idle(&self, max_idle: Duration) -> Vec<(String, Arc<T>)> {
        let idle = |entry: &Entry<T>| entry.last_seen.elapsed() >= max_idle;
        let ids: Vec<String> = self
            .sessions
            .iter()
            .filter(|e| idle(e.value()))
            .map(|e| e.key().clone())
            .collect();
        ids.into_iter()
            .filter_map(|id| self.sessions.remove_if(&id, |_, entry| idle(entry)))
            .map(|(id, entry)| (id, entry.handle))
            .collect()
    }

    /// Returns `true` if `id` is live.
    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.sessions.contains_key(id)
    }

    /// Number of live sessions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Returns `true` if no session is live.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Removes and returns every session, for shutdown.
    pub fn drain(&self) -> Vec<(String, Arc<T>)> {
        let ids: Vec<String> = self.sessions.iter().map(|e| e.key().clone()).collect();
        ids.into_iter()
            .filter_map(|id| self.sessions.remove(&id))
            .map(|(id, entry)| (id, entry.handle))
            .collect()
    }
}

impl<T> Default for SessionStore<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_get_remove() {
        let store = SessionStore::new();
        let id = SessionStore::<u32>::new_id();
        store.insert(id.clone(), Arc::new(7_u32));

        assert!(store.contains(&id));
        assert_eq!(store.get(&id).as_deref(), Some(&7));
        assert_eq!(store.len(), 1);

        assert_eq!(store.remove(&id).as_deref(), Some(&7));
        assert!(store.get(&id).is_none());
        assert!(store.remove(&id).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn lookup_returns_the_same_handle() {
        let store = SessionStore::new();
        let handle = Arc::new(String::from("transport"));
        store.insert("s1", Arc::clone(&handle));

        let found = store.get("s1").unwrap();
        assert!(Arc::ptr_eq(&found, &handle));
    }

    #[test]
    fn ids_are_unique() {
        let a = SessionStore::<()>::new_id();
        let b = SessionStore::<()>::new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }

    #[test]
    fn drain_empties_the_store() {
        let store = SessionStore::new();
        store.insert("a", Arc::new(1));
        store.insert("b", Arc::new(2));

        let mut drained: Vec<i32> = store.drain().into_iter().map(|(_, v)| *v).collect();
        drained.sort_unstable();
        assert_eq!(drained, vec![1, 2]);
        assert!(store.is_empty());
    }

    #[test]
    fn expire_idle_removes_only_stale_sessions() {
        let store = SessionStore::new();
        store.insert("fresh", Arc::new(1));
        store.insert("stale", Arc::new(2));

        assert!(store.expire_idle(Duration::from_secs(3600)).is_empty());
        assert_eq!(store.len(), 2);

        std::thread::sleep(Duration::from_millis(150));
        assert!(store.get("fresh").is_some());

        let expired = store.expire_idle(Duration::from_millis(100));
        assert_eq!(expired.len(), 1);
        assert_eq!(expired[0].0, "stale");
        assert!(store.contains("fresh"));
        assert!(!store.contains("stale"));

        assert_eq!(store.expire_idle(Duration::ZERO).len(), 1);
        assert!(store.is_empty());
    }
}
