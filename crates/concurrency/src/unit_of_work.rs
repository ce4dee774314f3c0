//! Caller-held scope for deferred queries
//!
//! A deferred query reads from its session only when enumerated, so the
//! session has to outlive the call that produced the query. A
//! [`UnitOfWork`] holds those sessions and closes all of them when it is
//! disposed or dropped.
//!
//! # Example
//!
//! ```ignore
//! let uow = UnitOfWork::new();
//! let pending = provider.query_in::<Invoice>(&uow, &[])?;
//! let open = pending.filter(|i| !i.paid).to_vec()?;
//! drop(uow); // every tracked session is disposed here
//! ```

use crate::session::SessionHandle;
use std::cell::RefCell;
use std::rc::Rc;
use tracing::debug;

/// Ordered set of sessions disposed together
#[derive(Default)]
pub struct UnitOfWork {
    sessions: RefCell<Vec<SessionHandle>>,
}

impl UnitOfWork {
    /// Create an empty unit of work
    pub fn new() -> Self {
        Self::default()
    }

    /// Hold `session` until disposal. Tracking the same session twice is a
    /// no-op; returns false in that case.
    pub fn track(&self, session: &SessionHandle) -> bool {
        let mut sessions = self.sessions.borrow_mut();
        if sessions.iter().any(|s| Rc::ptr_eq(s, session)) {
            return false;
        }
        sessions.push(Rc::clone(session));
        true
    }

    /// Number of sessions held
    pub fn len(&self) -> usize {
        self.sessions.borrow().len()
    }

    /// True when no session is held
    pub fn is_empty(&self) -> bool {
        self.sessions.borrow().is_empty()
    }

    /// Dispose every held session and forget them. Safe to call repeatedly;
    /// the unit of work can keep tracking sessions afterwards.
    pub fn dispose(&self) {
        let sessions = std::mem::take(&mut *self.sessions.borrow_mut());
        if sessions.is_empty() {
            return;
        }
        for session in &sessions {
            session.dispose();
        }
        debug!(target: "arbor::session", sessions = sessions.len(), "Disposed unit of work");
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        self.dispose();
    }
}
