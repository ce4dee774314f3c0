//! Deferred queries scoped to a unit of work

use crate::common::*;

#[test]
fn deferred_query_reads_on_enumeration() {
    let env = TestStore::new("uow_lazy");
    let provider = env.concurrent();
    let uow = UnitOfWork::new();
    let query = provider
        .query_in::<DescribedThing>(&uow, &[])
        .unwrap()
        .filter(|t| t.bool_property);

    let mut flagged = DescribedThing::new("flagged");
    flagged.bool_property = true;
    provider.insert(flagged, true).unwrap();
    provider.insert(DescribedThing::new("plain"), true).unwrap();

    let results = query.to_vec().unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].name, "flagged");
    // Restartable
    assert_eq!(query.count().unwrap(), 1);
}

#[test]
fn disposing_unit_of_work_ends_queries() {
    let env = TestStore::new("uow_dispose");
    let provider = env.single();
    provider.insert(DescribedThing::new("row"), true).unwrap();

    let uow = UnitOfWork::new();
    let first = provider.query_in::<DescribedThing>(&uow, &[]).unwrap();
    let second = provider.query_in::<TransactionItem>(&uow, &[]).unwrap();
    assert_eq!(uow.len(), 2);
    assert_eq!(first.count().unwrap(), 1);

    uow.dispose();
    assert!(matches!(first.to_vec(), Err(Error::SessionDisposed(_))));
    assert!(matches!(second.first(), Err(Error::SessionDisposed(_))));
}

#[test]
fn dropping_unit_of_work_closes_connections() {
    let env = TestStore::new("uow_drop");
    let provider = env.concurrent();
    let baseline = env.store.open_connections();
    {
        let uow = UnitOfWork::new();
        let query = provider.query_in::<DescribedThing>(&uow, &[]).unwrap();
        assert_eq!(query.count().unwrap(), 0);
        assert_eq!(env.store.open_connections(), baseline + 1);
        drop(query);
    }
    assert_eq!(env.store.open_connections(), baseline);
}

#[test]
fn unit_of_work_is_reusable_after_dispose() {
    let env = TestStore::new("uow_reuse");
    let provider = env.concurrent();
    provider.insert(DescribedThing::new("row"), true).unwrap();

    let uow = UnitOfWork::new();
    provider.query_in::<DescribedThing>(&uow, &[]).unwrap();
    uow.dispose();
    assert!(uow.is_empty());

    let query = provider.query_in::<DescribedThing>(&uow, &[]).unwrap();
    assert_eq!(query.count().unwrap(), 1);
}

#[test]
fn local_query_tracks_provider_session() {
    let env = TestStore::new("uow_local");
    let provider = env.single();
    provider.insert(DescribedThing::new("mine"), true).unwrap();
    let query = provider.query_local::<DescribedThing>(&[]).unwrap();
    assert_eq!(query.first().unwrap().unwrap().name, "mine");
}
