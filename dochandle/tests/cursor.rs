mod common;

use dochandle::{
    memory::{InMemoryClient, InMemoryDriver},
    prelude::*,
};

/// The registry must outlive the collection handle, which only holds a weak client reference.
async fn seeded() -> (InMemoryDriver, ClientRegistry<InMemoryDriver>, CollectionHandle<InMemoryClient>) {
    let (driver, registry, accounts) = common::accounts().await;
    QueryHelper::insert_many(&accounts, (1..=3).map(|n| doc! { "n": n }).collect())
        .await
        .unwrap();

    (driver, registry, accounts)
}

#[tokio::test]
async fn closing_twice_is_a_no_op() {
    let (driver, _registry, accounts) = seeded().await;

    let mut cursor = QueryHelper::find_iterator(&accounts, &Filter::all()).await.unwrap();
    assert!(cursor.next().await.unwrap().is_some());

    cursor.close().await.unwrap();
    cursor.close().await.unwrap();

    assert!(cursor.is_closed());
    assert_eq!(cursor.next().await.unwrap(), None);
    assert_eq!(driver.tracker().closed(), 1);
    driver.tracker().check().unwrap();
}

#[tokio::test]
async fn open_cursors_are_reported() {
    let (driver, _registry, accounts) = seeded().await;

    let mut cursor = QueryHelper::find_iterator(&accounts, &Filter::all()).await.unwrap();
    let remaining = cursor.collect_remaining().await.unwrap();
    assert_eq!(remaining.len(), 3);

    assert!(matches!(
        driver.tracker().check(),
        Err(DocumentStoreError::ResourceLeak { open: 1, leaked: 0 })
    ));

    cursor.close().await.unwrap();
    driver.tracker().check().unwrap();
}

#[tokio::test]
async fn dropped_cursors_are_detected_as_leaks() {
    let (driver, _registry, accounts) = seeded().await;

    {
        let mut cursor = QueryHelper::find_iterator(&accounts, &Filter::eq("n", 2)).await.unwrap();
        assert!(cursor.next().await.unwrap().is_some());
    }

    assert_eq!(driver.tracker().abandoned(), 1);
    assert!(matches!(
        driver.tracker().check(),
        Err(DocumentStoreError::ResourceLeak { open: 0, leaked: 1 })
    ));
}

#[tokio::test]
async fn cursors_read_in_insertion_order() {
    let (driver, _registry, accounts) = seeded().await;

    let cursor = QueryHelper::find_iterator(&accounts, &Filter::all()).await.unwrap();
    let values = cursor
        .drain()
        .await
        .unwrap()
        .iter()
        .filter_map(|d| d.get("n").cloned())
        .collect::<Vec<_>>();

    assert_eq!(values, vec![Bson::Int32(1), Bson::Int32(2), Bson::Int32(3)]);
    driver.tracker().check().unwrap();
}
