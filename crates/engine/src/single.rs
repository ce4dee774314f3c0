//! Single-session provider
//!
//! [`SessionProvider`] owns one session for its whole life. Every operation
//! runs through it, so entities stay tracked between calls and the
//! session-wide operations of [`SessionOperations`] are available. The
//! session is `!Send`, and so is the provider: one thread owns both.

use crate::bulk::UpdateOperations;
use crate::provider::{EntityProvider, ProviderCore};
use crate::query::DeferredQuery;
use arbor_concurrency::{CommitOutcome, EntryId, SessionHandle, UnitOfWork};
use arbor_core::{Actor, ConnectionId, Entity, RecordKey, Result};
use tracing::debug;

/// Operations that act on the provider's whole session rather than one call
pub trait SessionOperations {
    /// The provider's session
    fn session(&self) -> &SessionHandle;

    /// Stage an insert without committing
    fn add<T: Entity>(&self, entity: T) -> Result<EntryId>;

    /// Commit everything staged, synchronously
    ///
    /// # Errors
    ///
    /// Store failures; validation failures come back as
    /// [`CommitOutcome::Rejected`].
    fn save(&self) -> Result<CommitOutcome>;

    /// Commit everything staged without waiting; failures are only logged
    fn save_async(&self);

    /// Insert `entity`, or update it if it is tracked or already stored
    fn save_entity<T: Entity>(&self, entity: T) -> Result<T>;

    /// Insert-or-update many entities, committing in batches of
    /// `save_batch_size`. Returns the number of rows written.
    fn save_all<T: Entity>(&self, entities: Vec<T>) -> Result<usize>;

    /// Stage an update of `entity`
    fn set_modified<T: Entity>(&self, entity: &T) -> Result<()>;

    /// Stop tracking `entity`; returns false if it was not tracked
    fn set_detached<T: Entity>(&self, entity: &T) -> bool;

    /// Deferred query over the provider's own session
    fn query_local<T: Entity>(&self, includes: &[&str]) -> Result<DeferredQuery<'_, T>>;
}

/// Provider bound to one long-lived session
pub struct SessionProvider {
    core: ProviderCore,
    session: SessionHandle,
}

impl SessionProvider {
    pub(crate) fn new(core: ProviderCore) -> Result<Self> {
        let session = core.factory().open()?;
        debug!(target: "arbor::provider", session = session.id(), "Single-session provider ready");
        Ok(Self { core, session })
    }

    /// Normalized connection identifier
    pub fn connection_id(&self) -> &ConnectionId {
        self.core.connection_id()
    }

    /// Entities per commit in [`SessionOperations::save_all`]
    pub fn save_batch_size(&self) -> usize {
        self.core.config().save_batch_size
    }

    /// Block until detached commits from this provider have finished
    pub fn drain_pending_commits(&self) {
        self.core.drain();
    }

    /// Close the session. Later calls fail with `Error::SessionDisposed`.
    pub fn dispose(&self) {
        self.session.dispose();
    }

    fn stage<T: Entity>(&self, entity: T) -> Result<EntryId> {
        match self.session.entry_of(&entity) {
            Some(_) => self.session.mark_modified(&entity),
            None => self.session.add(entity),
        }
    }
}

impl EntityProvider for SessionProvider {
    fn get<T: Entity>(&self, id: impl Into<RecordKey>) -> Result<Option<T>> {
        self.session.find(id)
    }

    fn query<T: Entity>(&self, includes: &[&str]) -> Result<Vec<T>> {
        self.session.fetch(includes)
    }

    fn query_in<'u, T: Entity>(
        &self,
        unit_of_work: &'u UnitOfWork,
        includes: &[&str],
    ) -> Result<DeferredQuery<'u, T>> {
        self.core.deferred(unit_of_work, includes)
    }

    fn insert_many<T: Entity>(&self, entities: Vec<T>, safe: bool) -> Result<Vec<T>> {
        self.core.insert_in(&self.session, entities, safe)
    }

    fn update_many<T: Entity>(&self, entities: Vec<T>, safe: bool) -> Result<Vec<T>> {
        self.core.update_in(&self.session, entities, safe)
    }

    fn delete<T: Entity>(&self, entity: &T) -> Result<()> {
        self.core.delete_in(&self.session, entity)
    }

    fn delete_by_id<T: Entity>(&self, id: impl Into<RecordKey>) -> Result<bool> {
        self.core.delete_by_id_in::<T>(&self.session, id.into())
    }

    fn bulk_insert<T: Entity>(&self, entities: Vec<T>) -> Result<Vec<T>> {
        self.core.bulk_insert_in(&self.session, entities)
    }

    fn bulk_update_many<T, P>(&self, predicate: P, operations: &UpdateOperations) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        self.core.bulk_update_in::<T, P>(&self.session, predicate, operations)
    }

    fn bulk_delete<T, P>(&self, predicate: P) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        self.core.bulk_delete_in::<T, P>(&self.session, predicate)
    }

    fn set_current_user(&self, actor: impl Into<Actor>) {
        self.core.set_actor(actor.into());
    }

    fn current_user(&self) -> Option<Actor> {
        self.core.actor()
    }
}

impl SessionOperations for SessionProvider {
    fn session(&self) -> &SessionHandle {
        &self.session
    }

    fn add<T: Entity>(&self, entity: T) -> Result<EntryId> {
        self.session.add(entity)
    }

    fn save(&self) -> Result<CommitOutcome> {
        let actor = self.core.actor();
        self.session.commit(actor.as_ref())
    }

    fn save_async(&self) {
        let actor = self.core.actor();
        self.session.commit_async(actor.as_ref());
    }

    fn save_entity<T: Entity>(&self, entity: T) -> Result<T> {
        let fallback = entity.clone();
        let id = self.stage(entity)?;
        self.core.commit(&self.session, true)?;
        Ok(self.session.entity(id).unwrap_or(fallback))
    }

    fn save_all<T: Entity>(&self, entities: Vec<T>) -> Result<usize> {
        let batch_size = self.core.config().save_batch_size.max(1);
        let mut written = 0;
        let mut entities = entities.into_iter().peekable();
        while entities.peek().is_some() {
            for entity in entities.by_ref().take(batch_size) {
                self.stage(entity)?;
            }
            written += self.core.commit(&self.session, true)?;
        }
        debug!(target: "arbor::provider", written, batch_size, "Saved batch");
        Ok(written)
    }

    fn set_modified<T: Entity>(&self, entity: &T) -> Result<()> {
        self.session.mark_modified(entity).map(|_| ())
    }

    fn set_detached<T: Entity>(&self, entity: &T) -> bool {
        self.session.detach(entity)
    }

    fn query_local<T: Entity>(&self, includes: &[&str]) -> Result<DeferredQuery<'_, T>> {
        DeferredQuery::new(self.session.clone(), includes)
    }
}

impl std::fmt::Debug for SessionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionProvider")
            .field("connection", self.core.connection_id())
            .field("session", &self.session.id())
            .finish()
    }
}
