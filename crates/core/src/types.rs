//! Identity and connection types
//!
//! - Actor: the acting user or process recorded in audit fields
//! - ConnectionId: a normalized connection string, the session registry key

use crate::value::{FromValue, Value};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Setting that enables multiple concurrent result sets on one connection.
pub const MULTIPLE_ACTIVE_RESULT_SETS: &str = "MultipleActiveResultSets";

/// Setting keys that name the target database, in lookup order.
const DATABASE_KEYS: [&str; 2] = ["Database", "Initial Catalog"];

// ============================================================================
// Actor
// ============================================================================

/// Identity of the user or process performing an operation
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Actor(String);

impl Actor {
    /// Create a new actor identity
    pub fn new(id: impl Into<String>) -> Self {
        Actor(id.into())
    }

    /// Borrow the identity text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// An empty identity counts as unset for audit purposes
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Display for Actor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Actor {
    fn from(s: &str) -> Self {
        Actor::new(s)
    }
}

impl From<String> for Actor {
    fn from(s: String) -> Self {
        Actor(s)
    }
}

impl From<Actor> for Value {
    fn from(a: Actor) -> Self {
        Value::String(a.0)
    }
}

impl FromValue for Actor {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(Actor::new)
    }
}

// ============================================================================
// ConnectionId
// ============================================================================

/// A normalized connection string.
///
/// Normalization guarantees a trailing `;` and that
/// `MultipleActiveResultSets` is enabled. A setting with that key (keys
/// compare case-insensitively) is kept only if its value is `true`; any
/// other value is dropped and `MultipleActiveResultSets=true;` appended,
/// so normalizing twice yields the same identifier.
///
/// Equality after normalization is exact.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ConnectionId(String);

impl ConnectionId {
    /// Normalize a raw connection string
    pub fn normalize(raw: &str) -> Self {
        let trimmed = raw.trim();
        let enabled = setting_in(trimmed, MULTIPLE_ACTIVE_RESULT_SETS)
            .map(|value| value.eq_ignore_ascii_case("true"));
        let mut normalized = match enabled {
            Some(false) => trimmed
                .split(';')
                .filter(|pair| !is_flag(pair))
                .collect::<Vec<_>>()
                .join(";"),
            _ => trimmed.to_string(),
        };
        if !normalized.is_empty() && !normalized.ends_with(';') {
            normalized.push(';');
        }
        if enabled != Some(true) {
            normalized.push_str(MULTIPLE_ACTIVE_RESULT_SETS);
            normalized.push_str("=true;");
        }
        ConnectionId(normalized)
    }

    /// Borrow the normalized text
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Look up a setting value by key, case-insensitively
    pub fn setting(&self, key: &str) -> Option<&str> {
        setting_in(&self.0, key)
    }

    /// Name of the target database, if the string carries one
    pub fn database(&self) -> Option<&str> {
        DATABASE_KEYS
            .iter()
            .find_map(|key| self.setting(key))
            .filter(|name| !name.is_empty())
    }

    /// Iterate `(key, value)` pairs in order of appearance
    pub fn settings(&self) -> impl Iterator<Item = (&str, &str)> {
        parse_settings(&self.0)
    }
}

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for ConnectionId {
    fn from(raw: &str) -> Self {
        ConnectionId::normalize(raw)
    }
}

impl From<String> for ConnectionId {
    fn from(raw: String) -> Self {
        ConnectionId::normalize(&raw)
    }
}

fn parse_settings(raw: &str) -> impl Iterator<Item = (&str, &str)> {
    raw.split(';').filter_map(|pair| {
        let (key, value) = pair.split_once('=')?;
        let key = key.trim();
        (!key.is_empty()).then(|| (key, value.trim()))
    })
}

fn is_flag(pair: &str) -> bool {
    pair.split_once('=')
        .map_or(false, |(key, _)| key.trim().eq_ignore_ascii_case(MULTIPLE_ACTIVE_RESULT_SETS))
}

fn setting_in<'a>(raw: &'a str, key: &str) -> Option<&'a str> {
    parse_settings(raw)
        .find(|(k, _)| k.eq_ignore_ascii_case(key))
        .map(|(_, v)| v)
}
