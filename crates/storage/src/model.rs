//! Schema model configuration
//!
//! A [`Model`] maps entity types onto stored collections. Building one is
//! done through [`ModelBuilder`] and the process-wide [`configure_model`],
//! which builds each distinct configuration exactly once: concurrent first
//! use from many threads yields one shared `Arc<Model>`.

use arbor_core::{Entity, EntityDescriptor, Error, Result};
use once_cell::sync::Lazy;
use parking_lot::Mutex;
use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Predicate classifying which registered types are entities
pub type EntityFilter = Arc<dyn Fn(&EntityDescriptor) -> bool + Send + Sync>;

// =============================================================================
// Global Model Cache
// =============================================================================
//
// Keyed by schema name plus the sorted collection names of the mapped
// types. Uses parking_lot::Mutex so a panicking builder cannot poison it.

static MODELS: Lazy<Mutex<HashMap<ModelKey, Arc<Model>>>> =
    Lazy::new(|| Mutex::new(HashMap::new()));

/// Identity of a schema configuration
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModelKey {
    schema: String,
    collections: Vec<&'static str>,
}

/// A built schema mapping
#[derive(Debug)]
pub struct Model {
    schema: String,
    by_type: HashMap<TypeId, &'static EntityDescriptor>,
    by_collection: HashMap<&'static str, &'static EntityDescriptor>,
}

impl Model {
    /// Schema name
    pub fn schema(&self) -> &str {
        &self.schema
    }

    /// Descriptor for a mapped entity type
    ///
    /// # Errors
    ///
    /// Returns `Error::UnmappedEntity` if `T` was not registered, was
    /// ignored, or was rejected by the entity filter.
    pub fn descriptor<T: Entity>(&self) -> Result<&'static EntityDescriptor> {
        self.by_type
            .get(&TypeId::of::<T>())
            .copied()
            .ok_or_else(|| Error::UnmappedEntity(std::any::type_name::<T>().to_string()))
    }

    /// Check whether `T` is mapped
    pub fn contains<T: Entity>(&self) -> bool {
        self.by_type.contains_key(&TypeId::of::<T>())
    }

    /// Descriptor by collection name
    pub fn collection(&self, name: &str) -> Option<&'static EntityDescriptor> {
        self.by_collection.get(name).copied()
    }

    /// Number of mapped entity types
    pub fn len(&self) -> usize {
        self.by_type.len()
    }

    /// True when nothing is mapped
    pub fn is_empty(&self) -> bool {
        self.by_type.is_empty()
    }
}

struct Registration {
    type_id: TypeId,
    type_name: &'static str,
    descriptor: &'static EntityDescriptor,
}

/// Collects entity registrations for one schema
pub struct ModelBuilder {
    schema: String,
    registrations: Vec<Registration>,
    ignored: HashSet<TypeId>,
    filter: Option<EntityFilter>,
}

impl Default for ModelBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ModelBuilder {
    /// Empty builder for the `default` schema
    pub fn new() -> Self {
        Self {
            schema: "default".to_string(),
            registrations: Vec::new(),
            ignored: HashSet::new(),
            filter: None,
        }
    }

    /// Set the schema name
    pub fn schema(mut self, name: impl Into<String>) -> Self {
        self.schema = name.into();
        self
    }

    /// Register an entity type
    pub fn register<T: Entity>(mut self) -> Self {
        let type_id = TypeId::of::<T>();
        if !self.registrations.iter().any(|r| r.type_id == type_id) {
            self.registrations.push(Registration {
                type_id,
                type_name: std::any::type_name::<T>(),
                descriptor: T::descriptor(),
            });
        }
        self
    }

    /// Exclude a type even if registered
    pub fn ignore<T: Entity>(mut self) -> Self {
        self.ignored.insert(TypeId::of::<T>());
        self
    }

    /// Replace the entity classification predicate.
    ///
    /// By default every registered, non-ignored type is an entity.
    pub fn entity_filter(
        mut self,
        filter: impl Fn(&EntityDescriptor) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    fn selected(&self) -> impl Iterator<Item = &Registration> {
        self.registrations.iter().filter(move |r| {
            !self.ignored.contains(&r.type_id)
                && self.filter.as_ref().map_or(true, |f| f(r.descriptor))
        })
    }

    /// Identity of the configuration this builder describes
    pub fn key(&self) -> ModelKey {
        let mut collections: Vec<&'static str> =
            self.selected().map(|r| r.descriptor.collection).collect();
        collections.sort_unstable();
        ModelKey {
            schema: self.schema.clone(),
            collections,
        }
    }

    /// Build the model without consulting the process-wide cache.
    ///
    /// # Errors
    ///
    /// Returns `Error::Mapping` if two types share a collection, a key column
    /// is not among the mapped columns, or a relationship targets an
    /// unmapped collection.
    pub fn build(&self) -> Result<Model> {
        let mut by_type = HashMap::new();
        let mut by_collection: HashMap<&'static str, &'static EntityDescriptor> = HashMap::new();

        for registration in self.selected() {
            let descriptor = registration.descriptor;
            if !descriptor.has_column(descriptor.key) {
                return Err(Error::Mapping(format!(
                    "{}: key column '{}' is not mapped",
                    registration.type_name, descriptor.key
                )));
            }
            if by_collection.insert(descriptor.collection, descriptor).is_some() {
                return Err(Error::Mapping(format!(
                    "collection '{}' is mapped by more than one type",
                    descriptor.collection
                )));
            }
            by_type.insert(registration.type_id, descriptor);
        }

        for descriptor in by_collection.values() {
            for relationship in descriptor.relationships {
                let target = by_collection.get(relationship.collection).ok_or_else(|| {
                    Error::Mapping(format!(
                        "{}.{} targets unmapped collection '{}'",
                        descriptor.name, relationship.name, relationship.collection
                    ))
                })?;
                if !target.has_column(relationship.foreign_key) {
                    return Err(Error::Mapping(format!(
                        "{}.{}: '{}' is not a column of {}",
                        descriptor.name, relationship.name, relationship.foreign_key, target.name
                    )));
                }
            }
        }

        Ok(Model {
            schema: self.schema.clone(),
            by_type,
            by_collection,
        })
    }
}

/// Build (or reuse) the model for a configuration.
///
/// Runs under a process-wide lock so concurrent first use configures once.
pub fn configure_model(builder: ModelBuilder) -> Result<Arc<Model>> {
    let key = builder.key();
    let mut models = MODELS.lock();
    if let Some(model) = models.get(&key) {
        return Ok(Arc::clone(model));
    }

    let model = Arc::new(builder.build()?);
    debug!(
        target: "arbor::model",
        schema = %key.schema,
        entities = model.len(),
        "Configured model"
    );
    models.insert(key, Arc::clone(&model));
    Ok(model)
}
