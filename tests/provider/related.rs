//! Relationship includes

use crate::common::*;

fn item_with_amendments(provider: &ConcurrentProvider, count: i64) -> TransactionItem {
    let item = provider.insert(TransactionItem::new(1_000), true).unwrap();
    for i in 0..count {
        provider
            .insert(
                TransactionItemAmendment::new(&item, i * 10, &format!("change {}", i)),
                true,
            )
            .unwrap();
    }
    item
}

#[test]
fn include_embeds_related_rows() {
    let env = TestStore::new("related_include");
    let provider = env.concurrent();
    let item = item_with_amendments(&provider, 3);
    item_with_amendments(&provider, 1);

    let items = provider.query::<TransactionItem>(&["amendments"]).unwrap();
    let loaded = items.iter().find(|i| i.id == item.id).unwrap();
    assert_eq!(loaded.amendments.len(), 3);
    assert!(loaded
        .amendments
        .iter()
        .all(|a| a.transaction_item_id == item.id));
}

#[test]
fn without_include_related_rows_are_absent() {
    let env = TestStore::new("related_absent");
    let provider = env.concurrent();
    item_with_amendments(&provider, 2);
    let items = provider.query::<TransactionItem>(&[]).unwrap();
    assert_eq!(items.len(), 1);
    assert!(items[0].amendments.is_empty());
}

#[test]
fn unknown_include_is_an_error() {
    let env = TestStore::new("related_unknown");
    let provider = env.concurrent();
    let err = provider
        .query::<TransactionItem>(&["refunds"])
        .unwrap_err();
    assert!(matches!(err, Error::UnknownInclude { .. }));
}

#[test]
fn deferred_include_sees_later_children() {
    let env = TestStore::new("related_deferred");
    let provider = env.concurrent();
    let item = item_with_amendments(&provider, 1);

    let uow = UnitOfWork::new();
    let query = provider
        .query_in::<TransactionItem>(&uow, &["amendments"])
        .unwrap();
    assert_eq!(query.first().unwrap().unwrap().amendments.len(), 1);

    provider
        .insert(TransactionItemAmendment::new(&item, 99, "late"), true)
        .unwrap();
    assert_eq!(query.first().unwrap().unwrap().amendments.len(), 2);
}
