//! Session lifecycle and concurrency layer for arbor
//!
//! This crate implements how sessions are created, shared and released:
//! - Session: connection-scoped unit of work with change tracking
//! - AuditStamper: creation/modification metadata applied before commit
//! - UnitOfWork: caller-held scope keeping deferred-query sessions alive
//! - SessionRegistry: one session per (connection identifier, thread)
//! - CommitDispatcher: worker pool behind fire-and-forget commits

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod dispatcher;
pub mod registry;
pub mod session;
pub mod stamper;
pub mod unit_of_work;

#[cfg(test)]
mod testing;

pub use dispatcher::{BackpressureError, CommitDispatcher, DispatcherStats};
pub use registry::SessionRegistry;
pub use session::{
    Collection, CommitOutcome, EntryId, EntryState, PendingChanges, Session, SessionFactory,
    SessionHandle, StatementLog,
};
pub use stamper::{AuditStamper, StampReport};
pub use unit_of_work::UnitOfWork;
