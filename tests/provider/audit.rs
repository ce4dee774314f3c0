//! Audit stamping on insert and update

use crate::common::*;
use chrono::{TimeZone, Utc};

#[test]
fn insert_stamps_creator_and_time() {
    let env = TestStore::new("audit_insert");
    let provider = env.concurrent();
    provider.set_current_user("alice");

    let before = Utc::now();
    let thing = provider.insert(DescribedThing::new("stamped"), true).unwrap();
    let after = Utc::now();

    assert_eq!(thing.created.created_by, Some(Actor::new("alice")));
    let at = thing.created.created_at.unwrap();
    assert!(at >= before && at <= after);
    assert_eq!(thing.modified, ModifyStamp::default());

    let stored: DescribedThing = provider.get(thing.id.as_str()).unwrap().unwrap();
    assert_eq!(stored.created, thing.created);
}

#[test]
fn update_stamps_modifier_and_keeps_creation() {
    let env = TestStore::new("audit_update");
    let provider = env.single();
    provider.set_current_user("creator");
    let thing = provider.insert(DescribedThing::new("doc"), true).unwrap();

    provider.set_current_user("editor");
    let mut edited = thing.clone();
    edited.label = "v2".to_string();
    let updated = provider.update(edited, true).unwrap();

    assert_eq!(updated.created, thing.created);
    assert_eq!(updated.modified.modified_by, Some(Actor::new("editor")));
    assert!(updated.modified.modified_at.unwrap() >= thing.created.created_at.unwrap());
}

#[test]
fn preset_creation_stamp_is_kept() {
    let env = TestStore::new("audit_preset");
    let provider = env.concurrent();
    provider.set_current_user("importer");

    let original_time = Utc.with_ymd_and_hms(2014, 3, 1, 12, 0, 0).unwrap();
    let mut thing = DescribedThing::new("migrated");
    thing.created.created_by = Some(Actor::new("legacy"));
    thing.created.created_at = Some(original_time);

    let saved = provider.insert(thing, true).unwrap();
    assert_eq!(saved.created.created_by, Some(Actor::new("legacy")));
    assert_eq!(saved.created.created_at, Some(original_time));
}

#[test]
fn missing_actor_still_stamps_time() {
    let env = TestStore::new("audit_anonymous");
    let provider = env.concurrent();
    assert!(provider.current_user().is_none());
    let thing = provider.insert(DescribedThing::new("anon"), true).unwrap();
    assert!(thing.created.created_by.is_none());
    assert!(thing.created.created_at.is_some());
}

#[test]
fn current_user_last_write_wins() {
    let env = TestStore::new("audit_user");
    let provider = env.concurrent();
    provider.set_current_user("first");
    provider.set_current_user("second");
    assert_eq!(provider.current_user(), Some(Actor::new("second")));
}

#[test]
fn createable_only_entity_is_not_modify_stamped() {
    let env = TestStore::new("audit_createable");
    let provider = env.concurrent();
    provider.set_current_user("clerk");
    let item = provider.insert(TransactionItem::new(100), true).unwrap();
    let amendment = provider
        .insert(TransactionItemAmendment::new(&item, 5, "typo"), true)
        .unwrap();
    let created = amendment.created.clone();

    let mut edited = amendment;
    edited.reason = "rounding".to_string();
    let updated = provider.update(edited, true).unwrap();
    assert_eq!(updated.created, created);
    assert_eq!(updated.reason, "rounding");
}

#[test]
fn repeated_updates_never_move_creation() {
    let env = TestStore::new("audit_repeat");
    let provider = env.concurrent();
    provider.set_current_user("owner");
    let thing = provider.insert(DescribedThing::new("counter"), true).unwrap();
    let created = thing.created.clone();

    let mut current = thing;
    let before = Utc::now();
    for i in 0..5 {
        provider.set_current_user(format!("editor{}", i));
        current.nullable_int = Some(i);
        current = provider.update(current, true).unwrap();
        assert_eq!(current.created, created);
    }
    let stored: DescribedThing = provider.get(current.id.as_str()).unwrap().unwrap();
    assert_eq!(stored.created, created);
    assert_eq!(stored.modified.modified_by, Some(Actor::new("editor4")));
    assert!(stored.modified.modified_at.unwrap() >= before);
}

#[test]
fn update_of_unstamped_copy_keeps_stored_creation() {
    let env = TestStore::new("audit_unstamped_copy");
    let provider = env.concurrent();
    provider.set_current_user("creator");
    let thing = provider.insert(DescribedThing::new("original"), true).unwrap();

    provider.set_current_user("editor");
    let replacement = DescribedThing {
        id: thing.id.clone(),
        ..DescribedThing::new("replacement")
    };
    assert_eq!(replacement.created, CreateStamp::default());
    provider.update(replacement, true).unwrap();

    let stored: DescribedThing = provider.get(thing.id.as_str()).unwrap().unwrap();
    assert_eq!(stored.name, "replacement");
    assert_eq!(stored.created, thing.created);
    assert_eq!(stored.modified.modified_by, Some(Actor::new("editor")));
}

#[test]
fn update_on_single_session_keeps_stored_creation() {
    let env = TestStore::new("audit_unstamped_single");
    let provider = env.single();
    provider.set_current_user("creator");
    let thing = provider.insert(DescribedThing::new("original"), true).unwrap();

    provider.set_current_user("editor");
    let mut forged = thing.clone();
    forged.created.created_by = Some(Actor::new("someone else"));
    forged.created.created_at = Some(Utc.with_ymd_and_hms(2001, 1, 1, 0, 0, 0).unwrap());
    provider.update(forged, true).unwrap();

    let stored: DescribedThing = provider.get(thing.id.as_str()).unwrap().unwrap();
    assert_eq!(stored.created, thing.created);
}

#[test]
fn anonymous_creation_time_survives_update() {
    let env = TestStore::new("audit_anonymous_update");
    let provider = env.concurrent();
    let thing = provider.insert(DescribedThing::new("anon"), true).unwrap();
    let created_at = thing.created.created_at;
    assert!(created_at.is_some());

    provider.set_current_user("editor");
    let replacement = DescribedThing {
        id: thing.id.clone(),
        ..DescribedThing::new("named later")
    };
    provider.update(replacement, true).unwrap();

    let stored: DescribedThing = provider.get(thing.id.as_str()).unwrap().unwrap();
    assert_eq!(stored.created.created_at, created_at);
    assert!(stored.created.created_by.is_none());
    assert_eq!(stored.modified.modified_by, Some(Actor::new("editor")));
}
