//! Arbor - audited, thread-aware data access over a relational store
//!
//! Arbor offers generic create/read/update/delete and bulk operations over
//! any mapped entity type, stamps creation and modification metadata on every
//! write, and manages store sessions so that many threads can share one
//! provider without ever sharing a session.
//!
//! # Quick Start
//!
//! ```ignore
//! use arbor::{EntityProvider, MemoryStore, ProviderBuilder};
//! use std::sync::Arc;
//!
//! let provider = ProviderBuilder::new()
//!     .client(Arc::new(MemoryStore::new()))
//!     .connection("Database=orders")
//!     .register::<Order>()
//!     .build_concurrent()?;
//!
//! provider.set_current_user("importer");
//! let order = provider.insert(Order::new(42), true)?;
//! assert!(order.created.created_at.is_some());
//! ```
//!
//! # Architecture
//!
//! - `arbor-core`: values, records, the `Entity` trait, errors
//! - `arbor-storage`: store client traits, change sets, schema models
//! - `arbor-concurrency`: sessions, audit stamping, the session registry
//! - `arbor-engine`: providers, deferred queries, configuration

pub use arbor_concurrency::{
    AuditStamper, CommitDispatcher, CommitOutcome, EntryId, EntryState, PendingChanges, Session,
    SessionFactory, SessionHandle, SessionRegistry, StampReport, StatementLog, UnitOfWork,
};
pub use arbor_core::*;
pub use arbor_engine::*;
pub use arbor_storage::{
    configure_model, ChangeOp, ChangeSet, MemoryStore, Model, ModelBuilder, StoreClient,
    StoreConnection, DEFAULT_DATABASE,
};
