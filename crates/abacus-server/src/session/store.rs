//! Concurrent session stores, one per transport kind.

use std::sync::Arc;

use abacus_core::SessionId;
use dashmap::DashMap;

use super::{Session, SessionState, TransportKind};

/// Map from session identifier to session for one transport kind.
///
/// Inserts come only from the multiplexer and removals only from a
/// session's own supervisor; readers may enumerate concurrently.
#[derive(Clone)]
pub struct SessionStore {
    kind: TransportKind,
    sessions: Arc<DashMap<SessionId, Arc<Session>>>,
}

impl SessionStore {
    /// Empty store for `kind`.
    pub fn new(kind: TransportKind) -> Self {
        Self {
            kind,
            sessions: Arc::new(DashMap::new()),
        }
    }

    /// Transport kind this store holds.
    pub fn kind(&self) -> TransportKind {
        self.kind
    }

    /// Register a session. Returns `false` on an identifier collision.
    pub(crate) fn insert(&self, session: Arc<Session>) -> bool {
        match self.sessions.entry(session.id().clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                let _ = slot.insert(session);
                true
            }
        }
    }

    /// Remove a session by id.
    pub(crate) fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.remove(id).map(|(_, session)| session)
    }

    /// Look up a session in any state.
    pub fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Number of registered sessions (any state).
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Number of sessions in `state`.
    pub fn count_in(&self, state: SessionState) -> usize {
        self.sessions
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }

    /// Point-in-time copy of every registered session.
    pub fn snapshot(&self) -> Vec<Arc<Session>> {
        self.sessions
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }
}

/// The two independent session namespaces.
#[derive(Clone)]
pub struct SessionStores {
    /// Streamable sessions.
    pub streamable: SessionStore,
    /// Legacy event-stream sessions.
    pub legacy: SessionStore,
}

impl SessionStores {
    /// Two empty stores.
    pub fn new() -> Self {
        Self {
            streamable: SessionStore::new(TransportKind::Streamable),
            legacy: SessionStore::new(TransportKind::Legacy),
        }
    }

    /// Store for `kind`.
    pub fn for_kind(&self, kind: TransportKind) -> &SessionStore {
        match kind {
            TransportKind::Streamable => &self.streamable,
            TransportKind::Legacy => &self.legacy,
        }
    }

    /// Sessions across both stores.
    pub fn total(&self) -> usize {
        self.streamable.len() + self.legacy.len()
    }

    /// Snapshot of both stores.
    pub fn snapshot_all(&self) -> Vec<Arc<Session>> {
        let mut all = self.streamable.snapshot();
        all.extend(self.legacy.snapshot());
        all
    }
}

impl Default for SessionStores {
    fn default() -> Self {
        Self::new()
    }
}
