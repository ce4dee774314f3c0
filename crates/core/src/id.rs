//! Identifier generation
//!
//! Callers use a generator to assign keys before insertion; the provider
//! itself never invents identifiers.

use crate::value::RecordKey;
use std::sync::atomic::{AtomicI64, Ordering};
use uuid::Uuid;

/// Source of fresh entity identifiers
pub trait IdGenerator: Send + Sync {
    /// Produce a key never returned before by this generator
    fn next_key(&self) -> RecordKey;
}

/// Random v4 UUID keys, rendered as strings
#[derive(Debug, Default, Clone, Copy)]
pub struct UuidGenerator;

impl UuidGenerator {
    /// A fresh UUID string
    pub fn next_string(&self) -> String {
        Uuid::new_v4().to_string()
    }
}

impl IdGenerator for UuidGenerator {
    fn next_key(&self) -> RecordKey {
        RecordKey::String(self.next_string())
    }
}

/// Monotonic integer keys
#[derive(Debug)]
pub struct SequentialGenerator {
    next: AtomicI64,
}

impl SequentialGenerator {
    /// Start issuing keys at `start`
    pub fn starting_at(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start),
        }
    }

    /// Next integer identifier
    pub fn next_int(&self) -> i64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }
}

impl Default for SequentialGenerator {
    fn default() -> Self {
        Self::starting_at(1)
    }
}

impl IdGenerator for SequentialGenerator {
    fn next_key(&self) -> RecordKey {
        RecordKey::Int(self.next_int())
    }
}
