//! Provider integration tests
//!
//! Exercises both provider variants end to end against the in-memory store.

#[path = "../common/mod.rs"]
mod common;

mod audit;
mod crud;
mod fire_and_forget;
mod related;
mod unit_of_work;
