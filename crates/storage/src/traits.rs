//! Store client contracts
//!
//! The store is an external collaborator: it opens connections, executes
//! change sets atomically, runs predicate-based bulk statements, and
//! reports uniqueness violations as `Error::ConstraintViolation` so callers
//! can tell them apart from other failures.

use crate::changeset::ChangeSet;
use arbor_core::{ConnectionId, Record, RecordKey, Result};
use std::sync::Arc;

/// Row predicate evaluated by the store
pub type RecordFilter<'a> = dyn Fn(&Record) -> bool + Send + Sync + 'a;

/// Opens connections to a store
pub trait StoreClient: Send + Sync {
    /// Open a connection for a normalized connection string.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the store cannot be reached.
    fn connect(&self, connection: &ConnectionId) -> Result<Arc<dyn StoreConnection>>;
}

/// An open store connection.
///
/// Dropping the last handle releases the connection.
pub trait StoreConnection: Send + Sync {
    /// Read one row by key
    fn find(&self, collection: &str, key: &RecordKey) -> Result<Option<Record>>;

    /// Read every row matching `filter` (all rows when `None`)
    fn scan(&self, collection: &str, filter: Option<&RecordFilter<'_>>) -> Result<Vec<Record>>;

    /// Apply a change set atomically; returns the number of rows written.
    ///
    /// # Errors
    ///
    /// - `Error::ConstraintViolation` if an insert hits an existing key
    /// - `Error::StaleEntity` if an update or delete misses
    ///
    /// Nothing is written when an error is returned.
    fn execute(&self, changes: &ChangeSet) -> Result<usize>;

    /// Insert many rows in one statement
    fn bulk_insert(&self, collection: &str, rows: Vec<(RecordKey, Record)>) -> Result<usize>;

    /// Assign `assignments` to every row matching `filter`
    ///
    /// `filter` may read from the store; it is never called with a table lock held.
    fn bulk_update(&self, collection: &str, filter: &RecordFilter<'_>, assignments: &Record)
        -> Result<usize>;

    /// Delete every row matching `filter`
    ///
    /// `filter` may read from the store, as for `bulk_update`.
    fn bulk_delete(&self, collection: &str, filter: &RecordFilter<'_>) -> Result<usize>;
}
