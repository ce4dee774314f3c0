//! Entities shared by this crate's unit tests

use arbor_core::{Entity, EntityDescriptor, Record, Relationship, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct Parent {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Child {
    pub id: i64,
    pub parent_id: i64,
}

static PARENT: EntityDescriptor = EntityDescriptor {
    name: "Parent",
    collection: "parents",
    key: "id",
    columns: &["id", "name"],
    relationships: &[Relationship {
        name: "children",
        collection: "children",
        foreign_key: "parent_id",
    }],
};

static CHILD: EntityDescriptor = EntityDescriptor {
    name: "Child",
    collection: "children",
    key: "id",
    columns: &["id", "parent_id"],
    relationships: &[],
};

impl Entity for Parent {
    type Id = i64;

    fn descriptor() -> &'static EntityDescriptor {
        &PARENT
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn to_record(&self) -> Record {
        Record::new().with("id", self.id).with("name", self.name.as_str())
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Parent {
            id: record.field("id")?,
            name: record.field("name")?,
        })
    }
}

impl Entity for Child {
    type Id = i64;

    fn descriptor() -> &'static EntityDescriptor {
        &CHILD
    }

    fn id(&self) -> i64 {
        self.id
    }

    fn to_record(&self) -> Record {
        Record::new().with("id", self.id).with("parent_id", self.parent_id)
    }

    fn from_record(record: &Record) -> Result<Self> {
        Ok(Child {
            id: record.field("id")?,
            parent_id: record.field("parent_id")?,
        })
    }
}
