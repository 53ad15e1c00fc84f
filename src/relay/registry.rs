//! # Session Registry
//!
//! Process-wide bookkeeping of live relay sessions. The registry is built
//! once at startup and handed to every connection coordinator through shared
//! state — it is never ambient global state. It only holds lightweight
//! identity metadata; each session's audio buffer stays exclusively owned by
//! its coordinator.
//!
//! The registry also counts in-flight persistence writes so shutdown can
//! drain: a coordinator marks a flush before handing the buffer to the
//! writer task and clears it when the write finishes (or fails).

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::RwLock;

/// Identity metadata kept for each live session.
#[derive(Debug, Clone)]
pub struct SessionEntry {
    pub remote_addr: String,
    pub started_at: DateTime<Utc>,
}

/// Thread-safe set of live sessions, keyed by session id.
///
/// ## Concurrency:
/// Independent coordinators add and remove entries concurrently; a RwLock
/// around the map makes membership changes safe while keeping reads cheap
/// for the health endpoints.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, SessionEntry>>,
    pending_flushes: AtomicUsize,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a session at connection accept.
    pub fn insert(&self, session_id: &str, remote_addr: &str, started_at: DateTime<Utc>) {
        let mut sessions = self.sessions.write().unwrap();
        sessions.insert(
            session_id.to_string(),
            SessionEntry {
                remote_addr: remote_addr.to_string(),
                started_at,
            },
        );
    }

    /// Deregister a session at teardown. Idempotent: removing an id that is
    /// already absent is a no-op, and the return value says whether anything
    /// was actually removed.
    pub fn remove(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap();
        sessions.remove(session_id).is_some()
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.sessions.read().unwrap().contains_key(session_id)
    }

    pub fn active_count(&self) -> usize {
        self.sessions.read().unwrap().len()
    }

    /// Snapshot of live sessions for introspection endpoints.
    pub fn snapshot(&self) -> Vec<(String, SessionEntry)> {
        let sessions = self.sessions.read().unwrap();
        sessions
            .iter()
            .map(|(id, entry)| (id.clone(), entry.clone()))
            .collect()
    }

    /// A teardown write is about to run.
    pub fn flush_started(&self) {
        self.pending_flushes.fetch_add(1, Ordering::SeqCst);
    }

    /// A teardown write finished (successfully or not).
    pub fn flush_finished(&self) {
        self.pending_flushes.fetch_sub(1, Ordering::SeqCst);
    }

    pub fn pending_flushes(&self) -> usize {
        self.pending_flushes.load(Ordering::SeqCst)
    }

    /// True when no sessions are live and no teardown writes are in flight.
    /// The shutdown path polls this before letting the process exit.
    pub fn is_idle(&self) -> bool {
        self.active_count() == 0 && self.pending_flushes() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_remove() {
        let registry = SessionRegistry::new();
        registry.insert("s1", "127.0.0.1:1000", Utc::now());
        registry.insert("s2", "127.0.0.1:1001", Utc::now());
        assert_eq!(registry.active_count(), 2);
        assert!(registry.contains("s1"));

        assert!(registry.remove("s1"));
        assert_eq!(registry.active_count(), 1);
        assert!(!registry.contains("s1"));
    }

    #[test]
    fn test_remove_is_idempotent() {
        let registry = SessionRegistry::new();
        registry.insert("s1", "127.0.0.1:1000", Utc::now());
        assert!(registry.remove("s1"));
        // Second removal is a no-op, not an error
        assert!(!registry.remove("s1"));
        assert!(!registry.remove("never-existed"));
    }

    #[test]
    fn test_idle_tracks_sessions_and_flushes() {
        let registry = SessionRegistry::new();
        assert!(registry.is_idle());

        registry.insert("s1", "127.0.0.1:1000", Utc::now());
        assert!(!registry.is_idle());

        registry.remove("s1");
        registry.flush_started();
        assert!(!registry.is_idle());

        registry.flush_finished();
        assert!(registry.is_idle());
    }

    #[test]
    fn test_concurrent_membership_changes() {
        use std::sync::Arc;

        let registry = Arc::new(SessionRegistry::new());
        let mut handles = Vec::new();

        for i in 0..8 {
            let registry = registry.clone();
            handles.push(std::thread::spawn(move || {
                let id = format!("session-{}", i);
                registry.insert(&id, "127.0.0.1:0", Utc::now());
                assert!(registry.remove(&id));
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.active_count(), 0);
    }
}
