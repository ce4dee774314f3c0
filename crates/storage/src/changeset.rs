//! Ordered change sets
//!
//! A `ChangeSet` is the unit a store executes atomically: the staged
//! inserts, updates and deletes of one session commit, in staging order.

use arbor_core::{Record, RecordKey};
use std::fmt;

/// One staged write
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeOp {
    /// Create a row; fails on an existing key
    Insert {
        /// Target collection
        collection: &'static str,
        /// Row key
        key: RecordKey,
        /// Full row
        record: Record,
    },
    /// Replace an existing row
    Update {
        /// Target collection
        collection: &'static str,
        /// Row key
        key: RecordKey,
        /// Full row
        record: Record,
    },
    /// Remove an existing row
    Delete {
        /// Target collection
        collection: &'static str,
        /// Row key
        key: RecordKey,
    },
}

impl ChangeOp {
    /// Collection this op targets
    pub fn collection(&self) -> &'static str {
        match self {
            ChangeOp::Insert { collection, .. }
            | ChangeOp::Update { collection, .. }
            | ChangeOp::Delete { collection, .. } => collection,
        }
    }

    /// Key this op targets
    pub fn key(&self) -> &RecordKey {
        match self {
            ChangeOp::Insert { key, .. } | ChangeOp::Update { key, .. } | ChangeOp::Delete { key, .. } => {
                key
            }
        }
    }
}

impl fmt::Display for ChangeOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeOp::Insert { collection, key, record } => {
                write!(f, "INSERT {} [{}] ({} fields)", collection, key, record.len())
            }
            ChangeOp::Update { collection, key, record } => {
                write!(f, "UPDATE {} [{}] ({} fields)", collection, key, record.len())
            }
            ChangeOp::Delete { collection, key } => write!(f, "DELETE {} [{}]", collection, key),
        }
    }
}

/// Ordered, atomically-executed list of writes
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeSet {
    ops: Vec<ChangeOp>,
}

impl ChangeSet {
    /// Create an empty change set
    pub fn new() -> Self {
        Self::default()
    }

    /// Append an op
    pub fn push(&mut self, op: ChangeOp) {
        self.ops.push(op);
    }

    /// Number of ops
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// True when there is nothing to execute
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterate ops in staging order
    pub fn iter(&self) -> impl Iterator<Item = &ChangeOp> {
        self.ops.iter()
    }

    /// Turn the insert of `key` into an update of the same row.
    ///
    /// Returns false when no insert for that key is present.
    pub fn demote_insert(&mut self, collection: &str, key: &RecordKey) -> bool {
        for op in self.ops.iter_mut() {
            if let ChangeOp::Insert {
                collection: c,
                key: k,
                record,
            } = op
            {
                if *c == collection && k == key {
                    *op = ChangeOp::Update {
                        collection: c,
                        key: k.clone(),
                        record: std::mem::take(record),
                    };
                    return true;
                }
            }
        }
        false
    }
}

impl<'a> IntoIterator for &'a ChangeSet {
    type Item = &'a ChangeOp;
    type IntoIter = std::slice::Iter<'a, ChangeOp>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.iter()
    }
}
