//! Unsafe (detached) commits

use crate::common::*;

#[test]
fn detached_insert_returns_stamped_entity_and_lands() {
    let env = TestStore::new("faf_insert");
    let provider = env.concurrent();
    provider.set_current_user("async");

    let thing = provider.insert(DescribedThing::new("later"), false).unwrap();
    assert_eq!(thing.created.created_by, Some(Actor::new("async")));

    provider.drain_pending_commits();
    assert_eq!(env.rows("described_things"), 1);
}

#[test]
fn detached_validation_failure_is_swallowed() {
    let env = TestStore::new("faf_invalid");
    let provider = env.single();
    let returned = provider.insert(DescribedThing::new(""), false).unwrap();
    assert_eq!(returned.name, "");
    provider.drain_pending_commits();
    assert_eq!(env.rows("described_things"), 0);
    assert!(!provider.session().has_changes());
}

#[test]
fn detached_duplicate_falls_back_to_update() {
    let env = TestStore::new("faf_duplicate");
    let provider = env.concurrent();
    let original = provider.insert(DescribedThing::new("v1"), true).unwrap();

    let mut again = DescribedThing::new("v2");
    again.id = original.id.clone();
    provider.insert(again, false).unwrap();
    provider.drain_pending_commits();

    let stored: DescribedThing = provider.get(original.id.as_str()).unwrap().unwrap();
    assert_eq!(stored.name, "v2");
    assert_eq!(env.rows("described_things"), 1);
}

#[test]
fn detached_store_failure_is_not_reported() {
    let env = TestStore::new("faf_stale");
    let provider = env.concurrent();
    let thing = provider.insert(DescribedThing::new("gone"), true).unwrap();
    provider.delete(&thing).unwrap();

    // Updating a deleted row fails in the background only
    let mut edited = thing;
    edited.label = "ghost".to_string();
    assert!(provider.update(edited, false).is_ok());
    provider.drain_pending_commits();
    assert_eq!(env.rows("described_things"), 0);
}

#[test]
fn save_async_commits_staged_changes() {
    let env = TestStore::new("faf_save_async");
    let provider = env.single();
    provider.add(DescribedThing::new("a")).unwrap();
    provider.add(DescribedThing::new("b")).unwrap();
    provider.save_async();
    assert!(!provider.session().has_changes());
    provider.drain_pending_commits();
    assert_eq!(env.rows("described_things"), 2);
}
