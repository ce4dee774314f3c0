//! Shared test utilities for all integration test suites.
//!
//! Import via `#[path = "../common/mod.rs"] mod common;` from any suite's main.rs.

#![allow(dead_code)]
#![allow(unused_imports)]

pub use arbor::{
    Actor, ConcurrentProvider, CreateStamp, Entity, EntityDescriptor, EntityProvider, Error,
    IdGenerator, MemoryStore, ModifyStamp, ProviderBuilder, Record, Relationship, Result,
    SessionOperations, SessionProvider, UnitOfWork, UuidGenerator, CREATED_AT, CREATED_BY,
    MODIFIED_AT, MODIFIED_BY,
};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Once};

// ============================================================================
// Initialization
// ============================================================================

static INIT_TRACING: Once = Once::new();

/// Route `tracing` output through the test harness writer.
pub fn init_tracing() {
    INIT_TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_test_writer()
            .with_max_level(tracing::Level::WARN)
            .try_init();
    });
}

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// A database name no other test uses
pub fn unique_database(prefix: &str) -> String {
    format!("{}_{}", prefix, COUNTER.fetch_add(1, Ordering::Relaxed))
}

/// Fresh string identifier
pub fn new_id() -> String {
    UuidGenerator.next_string()
}

// ============================================================================
// TestStore - one in-memory database per test
// ============================================================================

/// An in-memory store plus the database name a test writes to.
pub struct TestStore {
    pub store: Arc<MemoryStore>,
    pub database: String,
}

impl TestStore {
    pub fn new(prefix: &str) -> Self {
        init_tracing();
        TestStore {
            store: Arc::new(MemoryStore::new()),
            database: unique_database(prefix),
        }
    }

    /// Builder with every test entity registered
    pub fn builder(&self) -> ProviderBuilder {
        ProviderBuilder::new()
            .client(self.store.clone())
            .connection(format!("Database={}", self.database))
            .register::<DescribedThing>()
            .register::<TransactionItem>()
            .register::<TransactionItemAmendment>()
    }

    pub fn single(&self) -> SessionProvider {
        self.builder().build_single().unwrap()
    }

    pub fn concurrent(&self) -> ConcurrentProvider {
        self.builder().build_concurrent().unwrap()
    }

    pub fn rows(&self, collection: &str) -> usize {
        self.store.row_count(&self.database, collection)
    }
}

// ============================================================================
// DescribedThing - Createable + Modifyable, string key
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct DescribedThing {
    pub id: String,
    pub name: String,
    pub label: String,
    pub description: String,
    pub nullable_int: Option<i64>,
    pub bool_property: bool,
    pub text_property: String,
    pub created: CreateStamp,
    pub modified: ModifyStamp,
}

impl DescribedThing {
    pub fn new(name: &str) -> Self {
        DescribedThing {
            id: new_id(),
            name: name.to_string(),
            label: String::new(),
            description: format!("{} description", name),
            nullable_int: None,
            bool_property: false,
            text_property: String::new(),
            created: CreateStamp::default(),
            modified: ModifyStamp::default(),
        }
    }

    pub fn tagged(name: &str, text: &str) -> Self {
        DescribedThing {
            text_property: text.to_string(),
            ..DescribedThing::new(name)
        }
    }
}

static DESCRIBED_THING: EntityDescriptor = EntityDescriptor {
    name: "DescribedThing",
    collection: "described_things",
    key: "id",
    columns: &[
        "id",
        "name",
        "label",
        "description",
        "nullable_int",
        "bool_property",
        "text_property",
        CREATED_BY,
        CREATED_AT,
        MODIFIED_BY,
        MODIFIED_AT,
    ],
    relationships: &[],
};

impl Entity for DescribedThing {
    type Id = String;

    fn descriptor() -> &'static EntityDescriptor {
        &DESCRIBED_THING
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id.as_str())
            .with("name", self.name.as_str())
            .with("label", self.label.as_str())
            .with("description", self.description.as_str())
            .with("nullable_int", self.nullable_int)
            .with("bool_property", self.bool_property)
            .with("text_property", self.text_property.as_str());
        self.created.write_to(&mut record);
        self.modified.write_to(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(DescribedThing {
            id: record.field("id")?,
            name: record.field("name")?,
            label: record.field("label")?,
            description: record.field("description")?,
            nullable_int: record.field("nullable_int")?,
            bool_property: record.field("bool_property")?,
            text_property: record.field("text_property")?,
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
        if self.name.trim().is_empty() {
            Err(vec!["name is required".to_string()])
        } else {
            Ok(())
        }
    }
}

// ============================================================================
// TransactionItem / TransactionItemAmendment - parent with related rows
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct TransactionItem {
    pub id: String,
    pub amount_cents: i64,
    pub memo: String,
    pub amendments: Vec<TransactionItemAmendment>,
    pub created: CreateStamp,
    pub modified: ModifyStamp,
}

impl TransactionItem {
    pub fn new(amount_cents: i64) -> Self {
        TransactionItem {
            id: new_id(),
            amount_cents,
            memo: String::new(),
            amendments: Vec::new(),
            created: CreateStamp::default(),
            modified: ModifyStamp::default(),
        }
    }
}

static TRANSACTION_ITEM: EntityDescriptor = EntityDescriptor {
    name: "TransactionItem",
    collection: "transaction_items",
    key: "id",
    columns: &[
        "id",
        "amount_cents",
        "memo",
        CREATED_BY,
        CREATED_AT,
        MODIFIED_BY,
        MODIFIED_AT,
    ],
    relationships: &[Relationship {
        name: "amendments",
        collection: "transaction_item_amendments",
        foreign_key: "transaction_item_id",
    }],
};

impl Entity for TransactionItem {
    type Id = String;

    fn descriptor() -> &'static EntityDescriptor {
        &TRANSACTION_ITEM
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id.as_str())
            .with("amount_cents", self.amount_cents)
            .with("memo", self.memo.as_str());
        self.created.write_to(&mut record);
        self.modified.write_to(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(TransactionItem {
            id: record.field("id")?,
            amount_cents: record.field("amount_cents")?,
            memo: record.field("memo")?,
            amendments: record.related("amendments")?,
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
}

/// Createable only
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionItemAmendment {
    pub id: String,
    pub transaction_item_id: String,
    pub item_amount: i64,
    pub reason: String,
    pub created: CreateStamp,
}

impl TransactionItemAmendment {
    pub fn new(item: &TransactionItem, item_amount: i64, reason: &str) -> Self {
        TransactionItemAmendment {
            id: new_id(),
            transaction_item_id: item.id.clone(),
            item_amount,
            reason: reason.to_string(),
            created: CreateStamp::default(),
        }
    }
}

static TRANSACTION_ITEM_AMENDMENT: EntityDescriptor = EntityDescriptor {
    name: "TransactionItemAmendment",
    collection: "transaction_item_amendments",
    key: "id",
    columns: &[
        "id",
        "transaction_item_id",
        "item_amount",
        "reason",
        CREATED_BY,
        CREATED_AT,
    ],
    relationships: &[],
};

impl Entity for TransactionItemAmendment {
    type Id = String;

    fn descriptor() -> &'static EntityDescriptor {
        &TRANSACTION_ITEM_AMENDMENT
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn to_record(&self) -> Record {
        let mut record = Record::new()
            .with("id", self.id.as_str())
            .with("transaction_item_id", self.transaction_item_id.as_str())
            .with("item_amount", self.item_amount)
            .with("reason", self.reason.as_str());
        self.created.write_to(&mut record);
        record
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(TransactionItemAmendment {
            id: record.field("id")?,
            transaction_item_id: record.field("transaction_item_id")?,
            item_amount: record.field("item_amount")?,
            reason: record.field("reason")?,
            created: CreateStamp::read_from(record)?,
        })
    }

    fn create_stamp(&mut self) -> Option<&mut CreateStamp> {
        Some(&mut self.created)
    }
}
