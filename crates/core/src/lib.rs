//! Core types and traits for arbor
//!
//! This crate defines the foundational types used throughout the system:
//! - Error: Error type hierarchy
//! - Value / Record / RecordKey: the row model exchanged with the store
//! - Entity: the persistable-type trait, with Createable/Modifyable capabilities
//! - Actor: the identity recorded in audit fields
//! - ConnectionId: normalized connection strings
//! - IdGenerator: identifier sources used by callers before insertion

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod entity;
pub mod error;
pub mod id;
pub mod types;
pub mod value;

pub use entity::{
    CreateStamp, Entity, EntityDescriptor, ModifyStamp, Relationship, CREATED_AT, CREATED_BY,
    MODIFIED_AT, MODIFIED_BY,
};
pub use error::{Error, Result};
pub use id::{IdGenerator, SequentialGenerator, UuidGenerator};
pub use types::{Actor, ConnectionId, MULTIPLE_ACTIVE_RESULT_SETS};
pub use value::{FromValue, Record, RecordKey, Value};
