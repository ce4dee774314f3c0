//! Thread-affinitized session registry
//!
//! Maps a connection identifier to one session per calling thread:
//!
//! - `factories`: a concurrent map from `ConnectionId` to its
//!   `SessionFactory`, shared by every thread
//! - `THREAD_SESSIONS`: a thread-local cache of opened sessions, keyed by
//!   (registry, connection)
//!
//! The same thread asking twice gets the same session; a different thread
//! gets its own. Ordinary CRUD therefore never locks a session, at the cost
//! of one live session per active thread per connection identifier.
//!
//! Sessions cached on other threads are released when those threads exit.

use crate::session::{SessionFactory, SessionHandle};
use arbor_core::{ConnectionId, Error, Result};
use dashmap::DashMap;
use once_cell::sync::Lazy;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::debug;

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL: Lazy<Arc<SessionRegistry>> = Lazy::new(|| Arc::new(SessionRegistry::new()));

thread_local! {
    /// Sessions opened on this thread, per (registry, connection)
    static THREAD_SESSIONS: RefCell<HashMap<(u64, ConnectionId), SessionHandle>> =
        RefCell::new(HashMap::new());
}

/// Registry of per-thread sessions keyed by connection identifier
pub struct SessionRegistry {
    id: u64,
    factories: DashMap<ConnectionId, Arc<SessionFactory>>,
}

impl Default for SessionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("id", &self.id)
            .field("connections", &self.factories.len())
            .finish()
    }
}

impl SessionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            factories: DashMap::new(),
        }
    }

    /// Process-unique registry id
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The process-wide registry
    pub fn global() -> Arc<SessionRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Register a factory for its connection identifier.
    ///
    /// The first registration for an identifier wins; later ones return the
    /// factory already in place.
    pub fn register(&self, factory: SessionFactory) -> Arc<SessionFactory> {
        let connection = factory.connection_id().clone();
        let entry = self
            .factories
            .entry(connection)
            .or_insert_with(|| Arc::new(factory));
        Arc::clone(entry.value())
    }

    /// Factory registered for an identifier
    pub fn factory(&self, connection: &ConnectionId) -> Option<Arc<SessionFactory>> {
        self.factories.get(connection).map(|f| Arc::clone(f.value()))
    }

    /// Registered connection identifiers
    pub fn connection_ids(&self) -> Vec<ConnectionId> {
        self.factories.iter().map(|e| e.key().clone()).collect()
    }

    fn require_factory(&self, connection: &ConnectionId) -> Result<Arc<SessionFactory>> {
        self.factory(connection).ok_or_else(|| {
            Error::Connection(format!("no session factory registered for '{}'", connection))
        })
    }

    /// The calling thread's session for `connection`, opened on first use.
    ///
    /// A cached session that has been disposed is replaced.
    ///
    /// # Errors
    ///
    /// - `Error::Connection` if no factory is registered
    /// - connection failures from opening the session
    pub fn session(&self, connection: &ConnectionId) -> Result<SessionHandle> {
        let slot = (self.id, connection.clone());
        let cached = THREAD_SESSIONS.with(|sessions| sessions.borrow().get(&slot).cloned());
        if let Some(session) = cached {
            if !session.is_disposed() {
                return Ok(session);
            }
        }

        let session = self.require_factory(connection)?.open()?;
        THREAD_SESSIONS.with(|sessions| {
            sessions.borrow_mut().insert(slot, Rc::clone(&session));
        });
        debug!(
            target: "arbor::registry",
            registry = self.id,
            session = session.id(),
            thread = ?std::thread::current().id(),
            "Opened thread session"
        );
        Ok(session)
    }

    /// Normalize `raw` and return the calling thread's session for it
    pub fn get_session(&self, raw: &str) -> Result<SessionHandle> {
        self.session(&ConnectionId::normalize(raw))
    }

    /// Open a session that bypasses the thread cache
    pub fn open_ephemeral(&self, connection: &ConnectionId) -> Result<SessionHandle> {
        self.require_factory(connection)?.open()
    }

    /// Dispose and forget the calling thread's session for `connection`.
    ///
    /// Returns false if this thread had none.
    pub fn release_thread_session(&self, connection: &ConnectionId) -> bool {
        let slot = (self.id, connection.clone());
        let removed = THREAD_SESSIONS.with(|sessions| sessions.borrow_mut().remove(&slot));
        match removed {
            Some(session) => {
                session.dispose();
                true
            }
            None => false,
        }
    }

    /// Sessions this registry holds for the calling thread
    pub fn thread_session_count(&self) -> usize {
        THREAD_SESSIONS.with(|sessions| {
            sessions
                .borrow()
                .keys()
                .filter(|(registry, _)| *registry == self.id)
                .count()
        })
    }
}

impl Drop for SessionRegistry {
    fn drop(&mut self) {
        let id = self.id;
        let released = THREAD_SESSIONS.try_with(|sessions| {
            let mut sessions = sessions.borrow_mut();
            let before = sessions.len();
            sessions.retain(|(registry, _), _| *registry != id);
            before - sessions.len()
        });
        if let Ok(released) = released {
            if released > 0 {
                debug!(target: "arbor::registry", registry = id, released, "Released thread sessions");
            }
        }
    }
}
