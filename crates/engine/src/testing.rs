//! Fixtures shared by this crate's unit tests

use crate::{ConcurrentProvider, ProviderBuilder, SessionProvider};
use arbor_core::{
    CreateStamp, Entity, EntityDescriptor, ModifyStamp, Record, Result, CREATED_AT, CREATED_BY,
    MODIFIED_AT, MODIFIED_BY,
};
use arbor_storage::MemoryStore;
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq)]
pub struct Ticket {
    pub id: i64,
    pub title: String,
    pub created: CreateStamp,
    pub modified: ModifyStamp,
}

impl Ticket {
    pub fn new(id: i64, title: &str) -> Self {
        Ticket {
            id,
            title: title.to_string(),
            created: CreateStamp::default(),
            modified: ModifyStamp::default(),
        }
    }
}

static TICKET: EntityDescriptor = EntityDescriptor {
    name: "Ticket",
    collection: "tickets",
    key: "id",
    columns: &["id", "title", CREATED_BY, CREATED_AT, MODIFIED_BY, MODIFIED_AT],
    relationships: &[],
};

impl Entity for Ticket {
    type Id = i64;

    fn descriptor() -> &'static EntityDescriptor {
        &TICKET
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id)
            .with("title", self.title.as_str());
        self.created.write_to(&mut record);
        self.modified.write_to(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Ticket {
            id: record.field("id")?,
            title: record.field("title")?,
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
        if self.title.is_empty() {
            Err(vec!["title is required".to_string()])
        } else {
            Ok(())
        }
    }
}

pub fn builder(store: &Arc<MemoryStore>, database: &str) -> ProviderBuilder {
    ProviderBuilder::new()
        .client(store.clone())
        .connection(format!("Database={}", database))
        .register::<Ticket>()
}

pub fn provider(database: &str) -> (Arc<MemoryStore>, SessionProvider) {
    let store = Arc::new(MemoryStore::new());
    let provider = builder(&store, database).build_single().unwrap();
    (store, provider)
}

pub fn concurrent(database: &str) -> (Arc<MemoryStore>, ConcurrentProvider) {
    let store = Arc::new(MemoryStore::new());
    let provider = builder(&store, database).build_concurrent().unwrap();
    (store, provider)
}
