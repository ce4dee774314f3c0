//! Storage collaborators for arbor
//!
//! This crate defines what the data-access layer needs from a store:
//! - StoreClient / StoreConnection: connection and statement contracts
//! - ChangeSet: ordered, atomically-executed writes
//! - Model / ModelBuilder: schema mapping, configured once per process
//! - MemoryStore: thread-safe in-memory reference store

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod changeset;
pub mod memory;
pub mod model;
pub mod traits;

#[cfg(test)]
mod testing;

pub use changeset::{ChangeOp, ChangeSet};
pub use memory::{MemoryStore, DEFAULT_DATABASE};
pub use model::{configure_model, EntityFilter, Model, ModelBuilder, ModelKey};
pub use traits::{RecordFilter, StoreClient, StoreConnection};
