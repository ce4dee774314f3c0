//! Multi-property assignments for set-based updates

use arbor_core::{Record, Value};

/// Property assignments applied by
/// [`EntityProvider::bulk_update_many`](crate::EntityProvider::bulk_update_many)
///
/// ```
/// use arbor_engine::UpdateOperations;
///
/// let ops = UpdateOperations::new()
///     .set("label", "archived")
///     .set("bool_property", true);
/// assert_eq!(ops.len(), 2);
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateOperations {
    assignments: Record,
}

impl UpdateOperations {
    /// No assignments
    pub fn new() -> Self {
        Self::default()
    }

    /// Assign `value` to `property`; a later assignment to the same property wins
    pub fn set(mut self, property: impl Into<String>, value: impl Into<Value>) -> Self {
        self.assignments.set(property, value);
        self
    }

    /// Assigned property names, sorted
    pub fn properties(&self) -> impl Iterator<Item = &str> {
        self.assignments.iter().map(|(name, _)| name.as_str())
    }

    /// Assignments as a partial record
    pub fn assignments(&self) -> &Record {
        &self.assignments
    }

    /// Consume into the partial record
    pub fn into_record(self) -> Record {
        self.assignments
    }

    /// Number of assigned properties
    pub fn len(&self) -> usize {
        self.assignments.len()
    }

    /// True if nothing is assigned
    pub fn is_empty(&self) -> bool {
        self.assignments.is_empty()
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for UpdateOperations {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Self::new(), |ops, (property, value)| ops.set(property, value))
    }
}
