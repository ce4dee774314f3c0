//! Thread-affinitized provider
//!
//! [`ConcurrentProvider`] is `Send + Sync` and meant to be shared. Each
//! calling thread gets its own session from the provider's
//! [`SessionRegistry`], so no session is ever touched by two threads.
//! Mutations run on the calling thread's session and clear its tracker
//! afterwards; single-shot reads use an ephemeral session.
//!
//! Session-wide operations are deliberately absent: this type does not
//! implement [`SessionOperations`](crate::SessionOperations), so they are
//! rejected at compile time.
//!
//! ```compile_fail
//! use arbor_engine::{ConcurrentProvider, SessionOperations};
//!
//! fn flush(provider: &ConcurrentProvider) {
//!     let _ = provider.save();
//! }
//! ```

use crate::bulk::UpdateOperations;
use crate::provider::{EntityProvider, ProviderCore};
use crate::query::DeferredQuery;
use arbor_concurrency::{Session, SessionHandle, SessionRegistry, UnitOfWork};
use arbor_core::{Actor, ConnectionId, Entity, RecordKey, Result};
use std::sync::Arc;
use tracing::debug;

/// Provider safe to share across threads
pub struct ConcurrentProvider {
    core: ProviderCore,
    registry: Arc<SessionRegistry>,
}

impl ConcurrentProvider {
    pub(crate) fn new(core: ProviderCore, registry: Arc<SessionRegistry>) -> Self {
        debug!(
            target: "arbor::provider",
            connection = %core.connection_id(),
            "Concurrent provider ready"
        );
        Self { core, registry }
    }

    /// Normalized connection identifier
    pub fn connection_id(&self) -> &ConnectionId {
        self.core.connection_id()
    }

    /// Registry handing out this provider's per-thread sessions
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// The calling thread's session, opened on first use
    pub fn session(&self) -> Result<SessionHandle> {
        self.registry.session(self.core.connection_id())
    }

    /// A fresh session owned by the caller
    pub fn new_session(&self) -> Result<SessionHandle> {
        self.registry.open_ephemeral(self.core.connection_id())
    }

    /// Block until detached commits from this provider have finished
    pub fn drain_pending_commits(&self) {
        self.core.drain();
    }

    /// Run `op` on the calling thread's session, then clear its tracker
    fn on_thread_session<R>(&self, op: impl FnOnce(&Session) -> Result<R>) -> Result<R> {
        let session = self.session()?;
        let result = op(session.as_ref());
        session.clear();
        result
    }
}

impl EntityProvider for ConcurrentProvider {
    fn get<T: Entity>(&self, id: impl Into<RecordKey>) -> Result<Option<T>> {
        self.new_session()?.find(id)
    }

    fn query<T: Entity>(&self, includes: &[&str]) -> Result<Vec<T>> {
        self.new_session()?.fetch(includes)
    }

    fn query_in<'u, T: Entity>(
        &self,
        unit_of_work: &'u UnitOfWork,
        includes: &[&str],
    ) -> Result<DeferredQuery<'u, T>> {
        self.core.deferred(unit_of_work, includes)
    }

    fn insert_many<T: Entity>(&self, entities: Vec<T>, safe: bool) -> Result<Vec<T>> {
        self.on_thread_session(|s| self.core.insert_in(s, entities, safe))
    }

    fn update_many<T: Entity>(&self, entities: Vec<T>, safe: bool) -> Result<Vec<T>> {
        self.on_thread_session(|s| self.core.update_in(s, entities, safe))
    }

    fn delete<T: Entity>(&self, entity: &T) -> Result<()> {
        self.on_thread_session(|s| self.core.delete_in(s, entity))
    }

    fn delete_by_id<T: Entity>(&self, id: impl Into<RecordKey>) -> Result<bool> {
        let id = id.into();
        self.on_thread_session(|s| self.core.delete_by_id_in::<T>(s, id))
    }

    fn bulk_insert<T: Entity>(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.on_thread_session(|s| self.core.bulk_insert_in(s, entities))
    }

    fn bulk_update_many<T, P>(&self, predicate: P, operations: &UpdateOperations) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        self.on_thread_session(|s| self.core.bulk_update_in::<T, P>(s, predicate, operations))
    }

    fn bulk_delete<T, P>(&self, predicate: P) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        self.on_thread_session(|s| self.core.bulk_delete_in::<T, P>(s, predicate))
    }

    fn set_current_user(&self, actor: impl Into<Actor>) {
        self.core.set_actor(actor.into());
    }

    fn current_user(&self) -> Option<Actor> {
        self.core.actor()
    }
}

impl std::fmt::Debug for ConcurrentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConcurrentProvider")
            .field("connection", self.core.connection_id())
            .field("registry", &self.registry)
            .finish()
    }
}
