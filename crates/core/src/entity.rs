//! Entity trait and audit capabilities
//!
//! An entity is any record type the provider can persist. Its mapping is
//! declared statically through an [`EntityDescriptor`], and its audit
//! capabilities through two optional accessors:
//!
//! - `create_stamp()`: Createable entities expose their [`CreateStamp`]
//! - `modify_stamp()`: Modifyable entities expose their [`ModifyStamp`]
//!
//! Both default to `None`, so an entity opts in per capability and the
//! stamper never needs a runtime type check.

use crate::error::{Error, Result};
use crate::types::Actor;
use crate::value::{Record, RecordKey, Value};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Column holding the creating actor.
pub const CREATED_BY: &str = "created_by";
/// Column holding the creation time.
pub const CREATED_AT: &str = "created_at";
/// Column holding the last modifying actor.
pub const MODIFIED_BY: &str = "modified_by";
/// Column holding the last modification time.
pub const MODIFIED_AT: &str = "modified_at";

/// A persistable record type
pub trait Entity: Clone + Send + 'static {
    /// Identifier type, convertible to the stored key
    type Id: Clone + Into<RecordKey>;

    /// Static mapping for this type
    fn descriptor() -> &'static EntityDescriptor;

    /// The entity's identifier
    fn id(&self) -> Self::Id;

    /// The identifier as a stored key
    fn key(&self) -> RecordKey {
        self.id().into()
    }

    /// Convert to the stored row shape
    fn to_record(&self) -> Record;

    /// Rebuild from a stored row (plus any included relationships)
    fn from_record(record: &Record) -> Result<Self>;

    /// Creation audit fields, for Createable entities
    fn create_stamp(&mut self) -> Option<&mut CreateStamp> {
        None
    }

    /// Modification audit fields, for Modifyable entities
    fn modify_stamp(&mut self) -> Option<&mut ModifyStamp> {
        None
    }

    /// Check business rules before commit
    fn validate(&self) -> std::result::Result<(), Vec<String>> {
        Ok(())
    }
}

// ============================================================================
// Descriptors
// ============================================================================

/// Static mapping of an entity type onto a stored collection
#[derive(Debug)]
pub struct EntityDescriptor {
    /// Entity type name, used in errors and logs
    pub name: &'static str,
    /// Stored collection name
    pub collection: &'static str,
    /// Primary key column
    pub key: &'static str,
    /// Persisted columns, including the key
    pub columns: &'static [&'static str],
    /// Navigable one-to-many relationships
    pub relationships: &'static [Relationship],
}

/// A one-to-many relationship from a parent to a child collection
#[derive(Debug)]
pub struct Relationship {
    /// Include name; also the field the related rows land in
    pub name: &'static str,
    /// Child collection
    pub collection: &'static str,
    /// Child column holding the parent's key
    pub foreign_key: &'static str,
}

impl EntityDescriptor {
    /// Check whether a column is mapped
    pub fn has_column(&self, column: &str) -> bool {
        self.columns.contains(&column)
    }

    /// Look up a relationship by include name
    pub fn relationship(&self, name: &str) -> Result<&'static Relationship> {
        self.relationships
            .iter()
            .find(|r| r.name == name)
            .ok_or_else(|| Error::UnknownInclude {
                entity: self.name.to_string(),
                include: name.to_string(),
            })
    }

    /// Keep only mapped columns of a record
    pub fn project(&self, record: &Record) -> Record {
        record
            .iter()
            .filter(|(field, _)| self.has_column(field))
            .map(|(field, value)| (field.clone(), value.clone()))
            .collect()
    }
}

impl Record {
    /// Decode related rows embedded under an include name.
    ///
    /// Absent includes decode as an empty list.
    pub fn related<T: Entity>(&self, name: &str) -> Result<Vec<T>> {
        match self.get(name) {
            None | Some(Value::Null) => Ok(Vec::new()),
            Some(Value::Array(rows)) => rows
                .iter()
                .map(|row| match row {
                    Value::Record(r) => T::from_record(r),
                    other => Err(Error::field(
                        T::descriptor().name,
                        name,
                        format!("expected Record, found {}", other.type_name()),
                    )),
                })
                .collect(),
            Some(other) => Err(Error::field(
                T::descriptor().name,
                name,
                format!("expected Array, found {}", other.type_name()),
            )),
        }
    }
}

// ============================================================================
// Audit stamps
// ============================================================================

/// Creation audit fields; set once, only while unset
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CreateStamp {
    /// Creating actor
    pub created_by: Option<Actor>,
    /// Creation time (UTC)
    pub created_at: Option<DateTime<Utc>>,
}

impl CreateStamp {
    /// True once both fields hold non-default values
    pub fn is_set(&self) -> bool {
        self.created_at.is_some() && self.created_by.as_ref().map_or(false, |a| !a.is_empty())
    }

    /// Write both columns into a record
    pub fn write_to(&self, record: &mut Record) {
        record.set(CREATED_BY, self.created_by.clone());
        record.set(CREATED_AT, self.created_at);
    }

    /// Read both columns from a record
    pub fn read_from(record: &Record) -> Result<Self> {
        Ok(CreateStamp {
            created_by: record.field(CREATED_BY)?,
            created_at: record.field(CREATED_AT)?,
        })
    }
}

/// Modification audit fields; refreshed on every modification
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModifyStamp {
    /// Last modifying actor
    pub modified_by: Option<Actor>,
    /// Last modification time (UTC)
    pub modified_at: Option<DateTime<Utc>>,
}

impl ModifyStamp {
    /// Write both columns into a record
    pub fn write_to(&self, record: &mut Record) {
        record.set(MODIFIED_BY, self.modified_by.clone());
        record.set(MODIFIED_AT, self.modified_at);
    }

    /// Read both columns from a record
    pub fn read_from(record: &Record) -> Result<Self> {
        Ok(ModifyStamp {
            modified_by: record.field(MODIFIED_BY)?,
            modified_at: record.field(MODIFIED_AT)?,
        })
    }
}
