//! Single-entity create/read/update/delete through both providers

use crate::common::*;

#[test]
fn insert_then_get_round_trips_fields() {
    let env = TestStore::new("crud_get");
    let provider = env.single();
    let mut thing = DescribedThing::new("alpha");
    thing.nullable_int = Some(7);
    thing.bool_property = true;
    let id = thing.id.clone();
    provider.insert(thing, true).unwrap();

    let reader = env.concurrent();
    let read: DescribedThing = reader.get(id.as_str()).unwrap().unwrap();
    assert_eq!(read.name, "alpha");
    assert_eq!(read.nullable_int, Some(7));
    assert!(read.bool_property);
}

#[test]
fn get_missing_returns_none() {
    let env = TestStore::new("crud_missing");
    let provider = env.concurrent();
    assert!(provider.get::<DescribedThing>("nope").unwrap().is_none());
}

#[test]
fn update_is_visible_to_other_providers() {
    let env = TestStore::new("crud_update");
    let provider = env.concurrent();
    let thing = provider.insert(DescribedThing::new("before"), true).unwrap();

    let mut edited = thing.clone();
    edited.label = "after".to_string();
    provider.update(edited, true).unwrap();

    let read: DescribedThing = env.single().get(thing.id.as_str()).unwrap().unwrap();
    assert_eq!(read.label, "after");
    assert_eq!(env.rows("described_things"), 1);
}

#[test]
fn delete_and_delete_by_id() {
    let env = TestStore::new("crud_delete");
    let provider = env.concurrent();
    let a = provider.insert(DescribedThing::new("a"), true).unwrap();
    let b = provider.insert(DescribedThing::new("b"), true).unwrap();

    provider.delete(&a).unwrap();
    assert!(provider.delete_by_id::<DescribedThing>(b.id.as_str()).unwrap());
    assert!(!provider.delete_by_id::<DescribedThing>(b.id.as_str()).unwrap());
    assert_eq!(env.rows("described_things"), 0);
}

#[test]
fn delete_of_vanished_row_is_stale() {
    let env = TestStore::new("crud_stale");
    let provider = env.concurrent();
    let thing = provider.insert(DescribedThing::new("gone"), true).unwrap();
    provider.delete(&thing).unwrap();
    let err = provider.delete(&thing).unwrap_err();
    assert!(matches!(err, Error::StaleEntity { .. }));
}

#[test]
fn query_returns_every_row() {
    let env = TestStore::new("crud_query");
    let provider = env.single();
    let things: Vec<_> = (0..5).map(|i| DescribedThing::new(&format!("n{}", i))).collect();
    provider.insert_many(things, true).unwrap();
    assert_eq!(provider.query::<DescribedThing>(&[]).unwrap().len(), 5);
}

#[test]
fn invalid_insert_is_rejected_without_writing() {
    let env = TestStore::new("crud_invalid");
    let provider = env.concurrent();
    let err = provider.insert(DescribedThing::new("  "), true).unwrap_err();
    match err {
        Error::Validation { entity, errors } => {
            assert_eq!(entity, "DescribedThing");
            assert_eq!(errors, vec!["name is required".to_string()]);
        }
        other => panic!("unexpected error: {}", other),
    }
    assert_eq!(env.rows("described_things"), 0);
}

#[test]
fn duplicate_insert_becomes_update() {
    let env = TestStore::new("crud_duplicate");
    let first = env.concurrent();
    let thing = first.insert(DescribedThing::new("original"), true).unwrap();

    let second = env.single();
    let mut again = DescribedThing::new("replacement");
    again.id = thing.id.clone();
    second.insert(again, true).unwrap();

    assert_eq!(env.rows("described_things"), 1);
    let read: DescribedThing = first.get(thing.id.as_str()).unwrap().unwrap();
    assert_eq!(read.name, "replacement");
}

#[test]
fn unregistered_entity_is_unmapped() {
    let env = TestStore::new("crud_unmapped");
    let provider = env
        .builder()
        .schema("crud_unmapped")
        .ignore::<DescribedThing>()
        .build_concurrent()
        .unwrap();
    let err = provider.insert(DescribedThing::new("x"), true).unwrap_err();
    assert!(matches!(err, Error::UnmappedEntity(_)));
}
