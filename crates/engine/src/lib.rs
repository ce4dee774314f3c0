//! Provider façade for arbor
//!
//! This crate is the public entry point over the session layer:
//! - `EntityProvider`: generic CRUD and bulk operations for any mapped entity
//! - `SessionProvider`: one long-lived session, with session-wide operations
//! - `ConcurrentProvider`: `Send + Sync`, one session per calling thread
//! - `DeferredQuery`: lazy queries bound to a unit of work
//! - `ProviderConfig` / `ProviderBuilder`: configuration and construction
//!
//! Every insert and update is audit-stamped before it reaches the store.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod builder;
pub mod bulk;
pub mod concurrent;
pub mod config;
pub mod provider;
pub mod query;
pub mod single;

#[cfg(test)]
mod testing;

pub use builder::ProviderBuilder;
pub use bulk::UpdateOperations;
pub use concurrent::ConcurrentProvider;
pub use config::{ProviderConfig, CONFIG_FILE_NAME};
pub use provider::EntityProvider;
pub use query::DeferredQuery;
pub use single::{SessionOperations, SessionProvider};
