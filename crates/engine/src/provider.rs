//! The provider façade
//!
//! [`EntityProvider`] is the public CRUD surface shared by both provider
//! variants. Each mutating call follows the same sequence:
//!
//! 1. acquire a session (the provider's own, or the calling thread's)
//! 2. stage the change (add / mark modified / remove)
//! 3. stamp audit fields
//! 4. commit, synchronously when `safe`, detached otherwise
//! 5. return the entity as staged, post-stamp
//!
//! Bulk calls skip change tracking. `bulk_insert` still stamps creation
//! fields; `bulk_update` and `bulk_delete` never stamp.

use crate::bulk::UpdateOperations;
use crate::config::ProviderConfig;
use crate::query::DeferredQuery;
use arbor_concurrency::{AuditStamper, EntryId, Session, SessionFactory, UnitOfWork};
use arbor_core::{Actor, ConnectionId, Entity, Error, RecordKey, Result, Value};
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

/// Generic CRUD and bulk operations over any mapped entity type
pub trait EntityProvider {
    /// Fetch one entity by identifier
    fn get<T: Entity>(&self, id: impl Into<RecordKey>) -> Result<Option<T>>;

    /// Fetch every `T`, materialized eagerly, with the named relationships
    fn query<T: Entity>(&self, includes: &[&str]) -> Result<Vec<T>>;

    /// Deferred query on a fresh session held by `unit_of_work`.
    ///
    /// Nothing is read until the query is enumerated; enumeration fails
    /// with `Error::SessionDisposed` once the unit of work is disposed.
    fn query_in<'u, T: Entity>(
        &self,
        unit_of_work: &'u UnitOfWork,
        includes: &[&str],
    ) -> Result<DeferredQuery<'u, T>>;

    /// Insert many entities in one commit
    ///
    /// # Arguments
    /// * `entities` - entities to insert; keys must already be assigned
    /// * `safe` - commit synchronously and surface errors; when false the
    ///   commit is detached and its outcome is never reported
    fn insert_many<T: Entity>(&self, entities: Vec<T>, safe: bool) -> Result<Vec<T>>;

    /// Insert one entity
    fn insert<T: Entity>(&self, entity: T, safe: bool) -> Result<T> {
        sole(self.insert_many(vec![entity], safe)?)
    }

    /// Update many entities in one commit; see [`insert_many`](Self::insert_many) for `safe`
    fn update_many<T: Entity>(&self, entities: Vec<T>, safe: bool) -> Result<Vec<T>>;

    /// Update one entity
    fn update<T: Entity>(&self, entity: T, safe: bool) -> Result<T> {
        sole(self.update_many(vec![entity], safe)?)
    }

    /// Delete an entity, committing synchronously
    fn delete<T: Entity>(&self, entity: &T) -> Result<()>;

    /// Delete by identifier; returns false if no such entity exists
    fn delete_by_id<T: Entity>(&self, id: impl Into<RecordKey>) -> Result<bool>;

    /// Stamp creation fields and insert in one set-based statement
    fn bulk_insert<T: Entity>(&self, entities: Vec<T>) -> Result<Vec<T>>;

    /// Assign several properties on every `T` matching `predicate`
    fn bulk_update_many<T, P>(&self, predicate: P, operations: &UpdateOperations) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync;

    /// Assign one property on every `T` matching `predicate`
    fn bulk_update<T, P>(&self, predicate: P, property: &str, value: impl Into<Value>) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        self.bulk_update_many(predicate, &UpdateOperations::new().set(property, value))
    }

    /// Delete every `T` matching `predicate`; returns the number removed
    fn bulk_delete<T, P>(&self, predicate: P) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync;

    /// Set the actor recorded by audit stamping. Last write wins.
    fn set_current_user(&self, actor: impl Into<Actor>);

    /// The actor recorded by audit stamping
    fn current_user(&self) -> Option<Actor>;
}

fn sole<T>(mut entities: Vec<T>) -> Result<T> {
    entities
        .pop()
        .ok_or_else(|| Error::Mapping("provider returned no entity".to_string()))
}

// ============================================================================
// Shared provider state
// ============================================================================

/// State and staged-operation helpers shared by both provider variants
pub(crate) struct ProviderCore {
    factory: Arc<SessionFactory>,
    current_user: RwLock<Option<Actor>>,
    config: ProviderConfig,
}

impl ProviderCore {
    pub(crate) fn new(factory: Arc<SessionFactory>, config: ProviderConfig) -> Self {
        let current_user = config.current_user.clone().map(Actor::from);
        Self {
            factory,
            current_user: RwLock::new(current_user),
            config,
        }
    }

    pub(crate) fn factory(&self) -> &Arc<SessionFactory> {
        &self.factory
    }

    pub(crate) fn config(&self) -> &ProviderConfig {
        &self.config
    }

    pub(crate) fn connection_id(&self) -> &ConnectionId {
        self.factory.connection_id()
    }

    pub(crate) fn actor(&self) -> Option<Actor> {
        self.current_user.read().clone()
    }

    pub(crate) fn set_actor(&self, actor: Actor) {
        *self.current_user.write() = Some(actor);
    }

    pub(crate) fn drain(&self) {
        if let Some(dispatcher) = self.factory.dispatcher() {
            dispatcher.drain();
        }
    }

    /// Commit staged changes; a failed or rejected commit discards them.
    ///
    /// Returns rows written, or 0 for a detached commit.
    pub(crate) fn commit(&self, session: &Session, safe: bool) -> Result<usize> {
        let actor = self.actor();
        if !safe {
            session.commit_async(actor.as_ref());
            return Ok(0);
        }
        let result = session.commit(actor.as_ref()).and_then(|o| o.into_result());
        if let Err(e) = &result {
            debug!(target: "arbor::provider", session = session.id(), error = %e, "Commit failed; discarding staged changes");
            session.discard_changes();
        }
        result
    }

    pub(crate) fn deferred<'u, T: Entity>(
        &self,
        unit_of_work: &'u UnitOfWork,
        includes: &[&str],
    ) -> Result<DeferredQuery<'u, T>> {
        let session = self.factory.open()?;
        let query = DeferredQuery::new(session.clone(), includes)?;
        unit_of_work.track(&session);
        Ok(query)
    }

    pub(crate) fn insert_in<T: Entity>(
        &self,
        session: &Session,
        entities: Vec<T>,
        safe: bool,
    ) -> Result<Vec<T>> {
        let fallback = entities.clone();
        let ids = entities
            .into_iter()
            .map(|e| session.add(e))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| {
                session.discard_changes();
                e
            })?;
        self.commit(session, safe)?;
        Ok(tracked(session, &ids, fallback))
    }

    pub(crate) fn update_in<T: Entity>(
        &self,
        session: &Session,
        entities: Vec<T>,
        safe: bool,
    ) -> Result<Vec<T>> {
        let ids = entities
            .iter()
            .map(|e| session.mark_modified(e))
            .collect::<Result<Vec<_>>>()
            .map_err(|e| {
                session.discard_changes();
                e
            })?;
        self.commit(session, safe)?;
        Ok(tracked(session, &ids, entities))
    }

    pub(crate) fn delete_in<T: Entity>(&self, session: &Session, entity: &T) -> Result<()> {
        session.remove(entity)?;
        self.commit(session, true).map(|_| ())
    }

    pub(crate) fn delete_by_id_in<T: Entity>(&self, session: &Session, id: RecordKey) -> Result<bool> {
        match session.find::<T>(id)? {
            Some(entity) => {
                self.delete_in(session, &entity)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub(crate) fn bulk_insert_in<T: Entity>(&self, session: &Session, mut entities: Vec<T>) -> Result<Vec<T>> {
        let actor = self.actor();
        let now = Utc::now();
        for entity in entities.iter_mut() {
            AuditStamper::stamp_new(entity, actor.as_ref(), now);
        }
        let written = session.bulk_insert(&entities)?;
        debug!(target: "arbor::provider", written, entity = T::descriptor().name, "Bulk insert");
        Ok(entities)
    }

    pub(crate) fn bulk_update_in<T, P>(
        &self,
        session: &Session,
        predicate: P,
        operations: &UpdateOperations,
    ) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        let updated = session.bulk_update::<T, P>(predicate, operations.assignments())?;
        debug!(target: "arbor::provider", updated, entity = T::descriptor().name, "Bulk update");
        Ok(updated)
    }

    pub(crate) fn bulk_delete_in<T, P>(&self, session: &Session, predicate: P) -> Result<usize>
    where
        T: Entity,
        P: Fn(&T) -> bool + Send + Sync,
    {
        let deleted = session.bulk_delete::<T, P>(predicate)?;
        debug!(target: "arbor::provider", deleted, entity = T::descriptor().name, "Bulk delete");
        Ok(deleted)
    }
}

/// Read staged entities back out of a session, post-stamp.
///
/// A detached commit rejected by validation untracks its entries; those
/// come back as passed in.
fn tracked<T: Entity>(session: &Session, ids: &[EntryId], fallback: Vec<T>) -> Vec<T> {
    ids.iter()
        .zip(fallback)
        .map(|(id, original)| session.entity::<T>(*id).unwrap_or(original))
        .collect()
}
