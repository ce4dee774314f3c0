//! Deferred queries
//!
//! A [`DeferredQuery`] reads nothing when it is built. Each enumeration
//! (`to_vec`, `iter`, `count`, `first`) scans the store through the owning
//! session, so a query can be enumerated repeatedly and sees current data
//! every time. Once the session is disposed, enumeration fails with
//! `Error::SessionDisposed` instead of touching a closed connection.

use arbor_concurrency::SessionHandle;
use arbor_core::{Entity, Error, Result};
use std::fmt;
use std::marker::PhantomData;
use std::rc::Rc;

type Predicate<'u, T> = Rc<dyn Fn(&T) -> bool + 'u>;

/// A lazy, restartable query over one entity type
///
/// The `'u` lifetime ties the query to whatever keeps its session alive:
/// the [`UnitOfWork`](arbor_concurrency::UnitOfWork) for
/// [`EntityProvider::query_in`](crate::EntityProvider::query_in), or the
/// provider itself for
/// [`SessionOperations::query_local`](crate::SessionOperations::query_local).
pub struct DeferredQuery<'u, T: Entity> {
    session: SessionHandle,
    includes: Vec<String>,
    filters: Vec<Predicate<'u, T>>,
    _owner: PhantomData<&'u ()>,
}

impl<'u, T: Entity> DeferredQuery<'u, T> {
    /// Build a query, resolving `includes` against `T`'s relationships
    pub(crate) fn new(session: SessionHandle, includes: &[&str]) -> Result<Self> {
        let descriptor = session.model().descriptor::<T>()?;
        for include in includes {
            descriptor.relationship(include)?;
        }
        Ok(Self {
            session,
            includes: includes.iter().map(|s| s.to_string()).collect(),
            filters: Vec::new(),
            _owner: PhantomData,
        })
    }

    /// Narrow the query. Predicates run in memory, in the order added.
    pub fn filter(mut self, predicate: impl Fn(&T) -> bool + 'u) -> Self {
        self.filters.push(Rc::new(predicate));
        self
    }

    /// Id of the session this query reads through
    pub fn session_id(&self) -> u64 {
        self.session.id()
    }

    /// Names of the relationships embedded in each result
    pub fn includes(&self) -> &[String] {
        &self.includes
    }

    /// Enumerate into a vector
    pub fn to_vec(&self) -> Result<Vec<T>> {
        if self.session.is_disposed() {
            return Err(Error::SessionDisposed(self.session.id()));
        }
        let includes: Vec<&str> = self.includes.iter().map(String::as_str).collect();
        let mut rows = self.session.fetch::<T>(&includes)?;
        rows.retain(|row| self.filters.iter().all(|keep| keep(row)));
        Ok(rows)
    }

    /// Enumerate into an owning iterator
    pub fn iter(&self) -> Result<std::vec::IntoIter<T>> {
        Ok(self.to_vec()?.into_iter())
    }

    /// Number of matching entities
    pub fn count(&self) -> Result<usize> {
        Ok(self.to_vec()?.len())
    }

    /// First matching entity in key order
    pub fn first(&self) -> Result<Option<T>> {
        Ok(self.to_vec()?.into_iter().next())
    }
}

impl<'u, T: Entity> Clone for DeferredQuery<'u, T> {
    fn clone(&self) -> Self {
        Self {
            session: self.session.clone(),
            includes: self.includes.clone(),
            filters: self.filters.clone(),
            _owner: PhantomData,
        }
    }
}

impl<'u, T: Entity> fmt::Debug for DeferredQuery<'u, T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredQuery")
            .field("entity", &T::descriptor().name)
            .field("session", &self.session.id())
            .field("includes", &self.includes)
            .field("filters", &self.filters.len())
            .finish()
    }
}
