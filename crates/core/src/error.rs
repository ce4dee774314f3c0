//! Error types for the data-access layer
//!
//! This module defines all error types used throughout the system.
//! We use `thiserror` for automatic `Display` and `Error` trait implementations.

use crate::value::RecordKey;
use std::io;
use thiserror::Error;

/// Result type alias for arbor operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for the data-access layer
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error (config files, worker threads)
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// The store refused or lost a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// A uniqueness constraint rejected a write
    #[error("Constraint violation on {collection} [{key}]: {message}")]
    ConstraintViolation {
        /// Collection the write targeted
        collection: String,
        /// Key of the conflicting row
        key: RecordKey,
        /// Store-provided detail
        message: String,
    },

    /// Update or delete of a row that no longer exists
    #[error("Stale entity: {collection} [{key}] no longer exists")]
    StaleEntity {
        /// Collection the write targeted
        collection: String,
        /// Key of the missing row
        key: RecordKey,
    },

    /// Entity validation failed before commit
    #[error("Validation failed for {entity}: {}", errors.join("; "))]
    Validation {
        /// Entity type name
        entity: String,
        /// Individual validation messages
        errors: Vec<String>,
    },

    /// The entity type is not part of the configured model
    #[error("Entity type not mapped: {0}")]
    UnmappedEntity(String),

    /// An include hint names a relationship the entity does not declare
    #[error("Unknown include '{include}' on {entity}")]
    UnknownInclude {
        /// Entity type name
        entity: String,
        /// Requested relationship name
        include: String,
    },

    /// A bulk assignment names a field the entity does not map
    #[error("Unknown field '{field}' on {entity}")]
    UnknownField {
        /// Entity type name
        entity: String,
        /// Requested field name
        field: String,
    },

    /// Record/entity conversion or model configuration failed
    #[error("Mapping error: {0}")]
    Mapping(String),

    /// The session was used after disposal
    #[error("Session {0} has been disposed")]
    SessionDisposed(u64),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage layer error
    #[error("Storage error: {0}")]
    Storage(String),
}

impl Error {
    /// True for the uniqueness violation an insert can recover from.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(self, Error::ConstraintViolation { .. })
    }

    /// Build a mapping error for a field that failed to decode.
    pub fn field(entity: &str, field: &str, detail: impl std::fmt::Display) -> Self {
        Error::Mapping(format!("{}.{}: {}", entity, field, detail))
    }
}
