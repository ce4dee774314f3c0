//! Entities and fixtures shared by this crate's unit tests

use crate::session::SessionFactory;
use arbor_core::{
    ConnectionId, CreateStamp, Entity, EntityDescriptor, ModifyStamp, Record, Result, CREATED_AT,
    CREATED_BY, MODIFIED_AT, MODIFIED_BY,
};
use arbor_storage::{MemoryStore, ModelBuilder};
use std::sync::Arc;

/// Createable + Modifyable entity with a validation rule
#[derive(Debug, Clone, PartialEq)]
pub struct Widget {
    pub id: String,
    pub name: String,
    pub created: CreateStamp,
    pub modified: ModifyStamp,
}

impl Widget {
    pub fn new(id: &str, name: &str) -> Self {
        Widget {
            id: id.to_string(),
            name: name.to_string(),
            created: CreateStamp::default(),
            modified: ModifyStamp::default(),
        }
    }
}

static WIDGET: EntityDescriptor = EntityDescriptor {
    name: "Widget",
    collection: "widgets",
    key: "id",
    columns: &["id", "name", CREATED_BY, CREATED_AT, MODIFIED_BY, MODIFIED_AT],
    relationships: &[],
};

impl Entity for Widget {
    type Id = String;

    fn descriptor() -> &'static EntityDescriptor {
        &WIDGET
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id.as_str())
            .with("name", self.name.as_str());
        self.created.write_to(&mut record);
        self.modified.write_to(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Widget {
            id: record.field("id")?,
            name: record.field("name")?,
            created: CreateStamp::read_from(record)?,
            modified: ModifyStamp::read_from(record)?,
        })
    }

    fn create_stamp(&mut self) -> Option<&mut CreateStamp> {
        Some(&mut self.created)
    }

    fn modify_stamp(&mut self) -> Option<&mut ModifyStamp> {
        Some(&mut self.modified)
    }

    fn validate(&self) -> std::result::Result<(), Vec<String>> {
        if self.name.is_empty() {
            Err(vec!["name is required".to_string()])
        } else {
            Ok(())
        }
    }
}

/// Entity with no audit capabilities
#[derive(Debug, Clone, PartialEq)]
pub struct Gadget {
    pub id: i64,
}

static GADGET: EntityDescriptor = EntityDescriptor {
    name: "Gadget",
    collection: "gadgets",
    key: "id",
    columns: &["id"],
    relationships: &[],
};

impl Entity for Gadget {
    type Id = i64;

    fn descriptor() -> &'static EntityDescriptor {
        &GADGET
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn to_record(&self) -> Record {
        Record::new().with("id", self.id)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Gadget {
            id: record.field("id")?,
        })
    }
}

/// A fresh store and a factory for `Database=<database>`
pub fn factory(database: &str) -> (Arc<MemoryStore>, SessionFactory) {
    let store = Arc::new(MemoryStore::new());
    let model = ModelBuilder::new()
        .register::<Widget>()
        .register::<Gadget>()
        .build()
        .unwrap();
    let factory = SessionFactory::new(
        store.clone(),
        ConnectionId::normalize(&format!("Database={}", database)),
        Arc::new(model),
    );
    (store, factory)
}
