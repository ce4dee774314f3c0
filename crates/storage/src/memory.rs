//! In-memory reference store
//!
//! `MemoryStore` implements [`StoreClient`] over process memory:
//!
//! - DashMap of databases, keyed by the connection's `Database` setting
//! - Per-database `RwLock` over collection tables
//! - Atomic change sets: every op is validated before any is applied
//! - Bulk filters run on a snapshot, outside the table lock
//!
//! Connections are counted so tests can observe session disposal.

use crate::changeset::{ChangeOp, ChangeSet};
use crate::traits::{RecordFilter, StoreClient, StoreConnection};
use arbor_core::{ConnectionId, Error, Record, RecordKey, Result};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::trace;

/// Database used when the connection string names none
pub const DEFAULT_DATABASE: &str = "default";

type Table = BTreeMap<RecordKey, Record>;

#[derive(Default)]
struct MemoryDatabase {
    tables: RwLock<HashMap<String, Table>>,
}

#[derive(Default)]
struct StoreCounters {
    open_connections: AtomicUsize,
    connections_opened: AtomicU64,
    statements: AtomicU64,
}

/// Thread-safe in-memory store
#[derive(Default)]
pub struct MemoryStore {
    databases: DashMap<String, Arc<MemoryDatabase>>,
    counters: Arc<StoreCounters>,
    offline: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Refuse new connections while `offline` is true
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::Release);
    }

    /// Connections currently open
    pub fn open_connections(&self) -> usize {
        self.counters.open_connections.load(Ordering::Acquire)
    }

    /// Connections opened since creation
    pub fn connections_opened(&self) -> u64 {
        self.counters.connections_opened.load(Ordering::Relaxed)
    }

    /// Statements executed since creation
    pub fn statements_executed(&self) -> u64 {
        self.counters.statements.load(Ordering::Relaxed)
    }

    /// Rows currently stored in a collection
    pub fn row_count(&self, database: &str, collection: &str) -> usize {
        self.databases
            .get(database)
            .map(|db| db.tables.read().get(collection).map_or(0, BTreeMap::len))
            .unwrap_or(0)
    }

    fn database(&self, name: &str) -> Arc<MemoryDatabase> {
        Arc::clone(self.databases.entry(name.to_string()).or_default().value())
    }
}

impl StoreClient for MemoryStore {
    fn connect(&self, connection: &ConnectionId) -> Result<Arc<dyn StoreConnection>> {
        if self.offline.load(Ordering::Acquire) {
            return Err(Error::Connection(format!(
                "store is offline; cannot open '{}'",
                connection
            )));
        }
        let name = connection.database().unwrap_or(DEFAULT_DATABASE);
        self.counters.open_connections.fetch_add(1, Ordering::AcqRel);
        self.counters.connections_opened.fetch_add(1, Ordering::Relaxed);
        trace!(target: "arbor::store", database = name, "Opened connection");
        Ok(Arc::new(MemoryConnection {
            database: self.database(name),
            counters: Arc::clone(&self.counters),
        }))
    }
}

struct MemoryConnection {
    database: Arc<MemoryDatabase>,
    counters: Arc<StoreCounters>,
}

impl MemoryConnection {
    fn statement(&self) {
        self.counters.statements.fetch_add(1, Ordering::Relaxed);
    }

    /// Keys of the rows matching `filter`, evaluated on a snapshot with no lock held
    fn matching_keys(&self, collection: &str, filter: &RecordFilter<'_>) -> Vec<RecordKey> {
        let snapshot: Vec<(RecordKey, Record)> = {
            let tables = self.database.tables.read();
            match tables.get(collection) {
                Some(table) => table.iter().map(|(k, r)| (k.clone(), r.clone())).collect(),
                None => return Vec::new(),
            }
        };
        snapshot
            .into_iter()
            .filter(|(_, record)| filter(record))
            .map(|(key, _)| key)
            .collect()
    }
}

impl Drop for MemoryConnection {
    fn drop(&mut self) {
        self.counters.open_connections.fetch_sub(1, Ordering::AcqRel);
        trace!(target: "arbor::store", "Closed connection");
    }
}

impl StoreConnection for MemoryConnection {
    fn find(&self, collection: &str, key: &RecordKey) -> Result<Option<Record>> {
        self.statement();
        let tables = self.database.tables.read();
        Ok(tables.get(collection).and_then(|t| t.get(key)).cloned())
    }

    fn scan(&self, collection: &str, filter: Option<&RecordFilter<'_>>) -> Result<Vec<Record>> {
        self.statement();
        let tables = self.database.tables.read();
        let Some(table) = tables.get(collection) else {
            return Ok(Vec::new());
        };
        Ok(table
            .values()
            .filter(|r| filter.map_or(true, |f| f(r)))
            .cloned()
            .collect())
    }

    fn execute(&self, changes: &ChangeSet) -> Result<usize> {
        self.statement();
        let mut tables = self.database.tables.write();

        // Validate the whole set against the current rows plus the
        // effect of earlier ops in the same set.
        let mut overlay: HashMap<(&str, &RecordKey), bool> = HashMap::new();
        for op in changes {
            let slot = (op.collection(), op.key());
            let exists = match overlay.get(&slot) {
                Some(exists) => *exists,
                None => tables
                    .get(op.collection())
                    .map_or(false, |t| t.contains_key(op.key())),
            };
            match op {
                ChangeOp::Insert { collection, key, .. } if exists => {
                    return Err(Error::ConstraintViolation {
                        collection: collection.to_string(),
                        key: key.clone(),
                        message: "duplicate key".to_string(),
                    });
                }
                ChangeOp::Update { collection, key, .. } | ChangeOp::Delete { collection, key }
                    if !exists =>
                {
                    return Err(Error::StaleEntity {
                        collection: collection.to_string(),
                        key: key.clone(),
                    });
                }
                ChangeOp::Delete { .. } => {
                    overlay.insert(slot, false);
                }
                _ => {
                    overlay.insert(slot, true);
                }
            }
        }

        for op in changes {
            match op {
                ChangeOp::Insert { collection, key, record }
                | ChangeOp::Update { collection, key, record } => {
                    tables
                        .entry(collection.to_string())
                        .or_default()
                        .insert(key.clone(), record.clone());
                }
                ChangeOp::Delete { collection, key } => {
                    if let Some(table) = tables.get_mut(*collection) {
                        table.remove(key);
                    }
                }
            }
        }
        Ok(changes.len())
    }

    fn bulk_insert(&self, collection: &str, rows: Vec<(RecordKey, Record)>) -> Result<usize> {
        self.statement();
        let mut tables = self.database.tables.write();
        let table = tables.entry(collection.to_string()).or_default();

        let mut seen = std::collections::HashSet::with_capacity(rows.len());
        for (key, _) in &rows {
            if table.contains_key(key) || !seen.insert(key) {
                return Err(Error::ConstraintViolation {
                    collection: collection.to_string(),
                    key: key.clone(),
                    message: "duplicate key in bulk insert".to_string(),
                });
            }
        }

        let count = rows.len();
        table.extend(rows);
        Ok(count)
    }

    fn bulk_update(
        &self,
        collection: &str,
        filter: &RecordFilter<'_>,
        assignments: &Record,
    ) -> Result<usize> {
        self.statement();
        let keys = self.matching_keys(collection, filter);
        let mut tables = self.database.tables.write();
        let Some(table) = tables.get_mut(collection) else {
            return Ok(0);
        };
        let mut count = 0;
        for key in &keys {
            if let Some(record) = table.get_mut(key) {
                record.merge(assignments);
                count += 1;
            }
        }
        Ok(count)
    }

    fn bulk_delete(&self, collection: &str, filter: &RecordFilter<'_>) -> Result<usize> {
        self.statement();
        let keys = self.matching_keys(collection, filter);
        let mut tables = self.database.tables.write();
        let Some(table) = tables.get_mut(collection) else {
            return Ok(0);
        };
        Ok(keys.iter().filter(|key| table.remove(*key).is_some()).count())
    }
}
