//! Value types for arbor
//!
//! This module defines:
//! - Value: the field value carried between entities and the store
//! - Record: an ordered field map, the row shape the store persists
//! - RecordKey: the primary key of a row
//! - FromValue: typed extraction of fields from a record
//!
//! ## Type Rules
//!
//! - No implicit coercions: `Int(1) != Float(1.0)`
//! - `Timestamp` is always UTC
//! - A missing field reads as `Null`

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Field value stored in a [`Record`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// 64-bit floating point (IEEE-754)
    Float(f64),
    /// UTF-8 string
    String(String),
    /// UTC point in time
    Timestamp(DateTime<Utc>),
    /// Array of values (used for included related records)
    Array(Vec<Value>),
    /// Nested record
    Record(Record),
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Float(_) => "Float",
            Value::String(_) => "String",
            Value::Timestamp(_) => "Timestamp",
            Value::Array(_) => "Array",
            Value::Record(_) => "Record",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as &str if this is a String value
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get as a timestamp if this is a Timestamp value
    pub fn as_timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            Value::Timestamp(t) => Some(*t),
            _ => None,
        }
    }

    /// Get as a slice if this is an Array value
    pub fn as_array(&self) -> Option<&[Value]> {
        match self {
            Value::Array(a) => Some(a),
            _ => None,
        }
    }

    /// Get as a record if this is a Record value
    pub fn as_record(&self) -> Option<&Record> {
        match self {
            Value::Record(r) => Some(r),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(t: DateTime<Utc>) -> Self {
        Value::Timestamp(t)
    }
}

impl From<Vec<Value>> for Value {
    fn from(a: Vec<Value>) -> Self {
        Value::Array(a)
    }
}

impl From<Record> for Value {
    fn from(r: Record) -> Self {
        Value::Record(r)
    }
}

impl From<RecordKey> for Value {
    fn from(k: RecordKey) -> Self {
        match k {
            RecordKey::Int(i) => Value::Int(i),
            RecordKey::String(s) => Value::String(s),
        }
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Value::Null, Into::into)
    }
}

// ============================================================================
// Record
// ============================================================================

/// An ordered map of field name to value.
///
/// Records are what the store persists and what entities convert to and from.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record(BTreeMap<String, Value>);

impl Record {
    /// Create an empty record
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style field assignment
    pub fn with(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(field, value);
        self
    }

    /// Set a field, replacing any previous value
    pub fn set(&mut self, field: impl Into<String>, value: impl Into<Value>) {
        self.0.insert(field.into(), value.into());
    }

    /// Raw field access
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Remove a field, returning its value
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// Check whether a field is present
    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    /// Typed field access; a missing field decodes as `Null`.
    ///
    /// # Errors
    ///
    /// Returns `Error::Mapping` if the stored value does not decode as `T`.
    pub fn field<T: FromValue>(&self, field: &str) -> Result<T> {
        let value = self.0.get(field).unwrap_or(&Value::Null);
        T::from_value(value).ok_or_else(|| {
            Error::Mapping(format!(
                "field '{}' holds {} which does not decode as {}",
                field,
                value.type_name(),
                std::any::type_name::<T>()
            ))
        })
    }

    /// Copy every field of `other` into this record
    pub fn merge(&mut self, other: &Record) {
        for (k, v) in other.iter() {
            self.0.insert(k.clone(), v.clone());
        }
    }

    /// Iterate fields in name order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True if the record has no fields
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Record(iter.into_iter().collect())
    }
}

// ============================================================================
// RecordKey
// ============================================================================

/// Primary key of a stored row
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RecordKey {
    /// Integer key
    Int(i64),
    /// String key (including UUID text)
    String(String),
}

impl RecordKey {
    /// Read a key out of a field value
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(i) => Some(RecordKey::Int(*i)),
            Value::String(s) => Some(RecordKey::String(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordKey::Int(i) => write!(f, "{}", i),
            RecordKey::String(s) => f.write_str(s),
        }
    }
}

impl From<i64> for RecordKey {
    fn from(i: i64) -> Self {
        RecordKey::Int(i)
    }
}

impl From<i32> for RecordKey {
    fn from(i: i32) -> Self {
        RecordKey::Int(i as i64)
    }
}

impl From<String> for RecordKey {
    fn from(s: String) -> Self {
        RecordKey::String(s)
    }
}

impl From<&str> for RecordKey {
    fn from(s: &str) -> Self {
        RecordKey::String(s.to_string())
    }
}

impl From<&String> for RecordKey {
    fn from(s: &String) -> Self {
        RecordKey::String(s.clone())
    }
}

impl From<Uuid> for RecordKey {
    fn from(u: Uuid) -> Self {
        RecordKey::String(u.to_string())
    }
}

// ============================================================================
// FromValue
// ============================================================================

/// Typed extraction from a [`Value`]
pub trait FromValue: Sized {
    /// Decode, or `None` if the value has the wrong shape
    fn from_value(value: &Value) -> Option<Self>;
}

impl FromValue for Value {
    fn from_value(value: &Value) -> Option<Self> {
        Some(value.clone())
    }
}

impl FromValue for bool {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_bool()
    }
}

impl FromValue for i64 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int()
    }
}

impl FromValue for i32 {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_int().and_then(|i| i32::try_from(i).ok())
    }
}

impl FromValue for f64 {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl FromValue for String {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_str().map(str::to_string)
    }
}

impl FromValue for DateTime<Utc> {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_timestamp()
    }
}

impl FromValue for RecordKey {
    fn from_value(value: &Value) -> Option<Self> {
        RecordKey::from_value(value)
    }
}

impl FromValue for Record {
    fn from_value(value: &Value) -> Option<Self> {
        value.as_record().cloned()
    }
}

impl<T: FromValue> FromValue for Option<T> {
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(None),
            other => T::from_value(other).map(Some),
        }
    }
}
