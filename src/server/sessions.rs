//! In-memory registry of HTTP chat sessions with idle expiry and a size cap.

use crate::chat::{ChatSession, SessionView};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::debug;

struct Entry {
    session: Arc<Mutex<ChatSession>>,
    /// View as of the last completed request, served while one is in flight.
    snapshot: SessionView,
    last_active: Instant,
}

pub struct SessionRegistry {
    entries: HashMap<String, Entry>,
    idle_ttl: Duration,
    capacity: usize,
}

impl SessionRegistry {
    pub fn new(idle_ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            idle_ttl,
            capacity: capacity.max(1),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a freshly loaded session, making room first if needed.
    pub fn insert(&mut self, session: ChatSession) -> SessionView {
        let now = Instant::now();
        self.sweep_at(now);
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self
                .entries
                .iter()
                .min_by_key(|(_, e)| e.last_active)
                .map(|(id, _)| id.clone())
            else {
                break;
            };
            debug!("Evicting least recently used session {}", oldest);
            self.entries.remove(&oldest);
        }

        let view = session.view();
        self.entries.insert(
            view.session_id.clone(),
            Entry {
                session: Arc::new(Mutex::new(session)),
                snapshot: view.clone(),
                last_active: now,
            },
        );
        view
    }

    /// Look a session up and mark it active. Expired sessions are dropped.
    pub fn get(&mut self, id: &str) -> Option<Arc<Mutex<ChatSession>>> {
        self.get_at(id, Instant::now())
    }

    fn get_at(&mut self, id: &str, now: Instant) -> Option<Arc<Mutex<ChatSession>>> {
        let expired = self
            .entries
            .get(id)
            .is_some_and(|e| now.duration_since(e.last_active) >= self.idle_ttl);
        if expired {
            debug!("Session {} expired", id);
            self.entries.remove(id);
            return None;
        }
        let entry = self.entries.get_mut(id)?;
        entry.last_active = now;
        Some(entry.session.clone())
    }

    pub fn snapshot(&self, id: &str) -> Option<SessionView> {
        self.entries.get(id).map(|e| e.snapshot.clone())
    }

    /// Record the view after a request finished.
    pub fn publish(&mut self, view: &SessionView) {
        if let Some(entry) = self.entries.get_mut(&view.session_id) {
            entry.snapshot = view.clone();
            entry.last_active = Instant::now();
        }
    }

    /// Drop sessions idle for longer than the TTL. Returns how many went.
    pub fn sweep(&mut self) -> usize {
        self.sweep_at(Instant::now())
    }

    fn sweep_at(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let ttl = self.idle_ttl;
        self.entries
            .retain(|_, e| now.duration_since(e.last_active) < ttl);
        before - self.entries.len()
    }
}
