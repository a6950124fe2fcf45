mod common;

use std::time::Duration;

use dochandle::{memory::InMemoryDriver, prelude::*};
use futures::future::join_all;

#[tokio::test]
async fn concurrent_first_calls_share_one_client() {
    let driver = InMemoryDriver::builder()
        .connect_latency(Duration::from_millis(25))
        .build();
    let registry = common::registry(&driver);

    let handles = join_all((0..16).map(|_| registry.get_client())).await;
    let handles = handles.into_iter().collect::<DocumentStoreResult<Vec<_>>>().unwrap();

    assert_eq!(driver.connect_count(), 1);
    assert!(handles.iter().all(|handle| handle.same_as(&handles[0])));
    assert!(registry.is_initialized().await);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_tasks_share_one_client() {
    let driver = InMemoryDriver::builder()
        .connect_latency(Duration::from_millis(25))
        .build();
    let registry = std::sync::Arc::new(common::registry(&driver));

    let tasks = (0..8)
        .map(|_| {
            let registry = registry.clone();
            tokio::spawn(async move { registry.get_client().await })
        })
        .collect::<Vec<_>>();

    let mut handles = Vec::new();
    for task in tasks {
        handles.push(task.await.unwrap().unwrap());
    }

    assert_eq!(driver.connect_count(), 1);
    assert!(handles.iter().all(|handle| handle.same_as(&handles[0])));
}

#[tokio::test]
async fn failed_connect_leaves_the_registry_retryable() {
    let driver = InMemoryDriver::builder().fail_connects(1).build();
    let registry = common::registry(&driver);

    let err = registry.get_client().await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Connection(_)));
    assert!(err.is_retryable());
    assert!(!registry.is_initialized().await);

    let first = registry.get_client().await.unwrap();
    let second = registry.get_client().await.unwrap();
    assert!(first.same_as(&second));
    assert_eq!(driver.connect_count(), 1);
}

#[tokio::test]
async fn concurrent_callers_share_a_failed_connect() {
    let driver = InMemoryDriver::builder()
        .connect_latency(Duration::from_millis(50))
        .fail_connects(1)
        .build();
    let registry = common::registry(&driver);

    let results = join_all((0..8).map(|_| registry.get_client())).await;

    assert!(results.iter().all(|result| matches!(result, Err(DocumentStoreError::Connection(_)))));
    assert_eq!(driver.connect_attempts(), 1);
    assert_eq!(driver.connect_count(), 0);
    assert!(!registry.is_initialized().await);

    let client = registry.get_client().await.unwrap();
    assert!(client.same_as(&registry.get_client().await.unwrap()));
    assert_eq!(driver.connect_attempts(), 2);
    assert_eq!(driver.connect_count(), 1);
}

#[tokio::test]
async fn shutdown_is_idempotent_and_rejects_later_use() {
    let driver = InMemoryDriver::new();
    let registry = common::registry(&driver);
    let client = registry.get_client().await.unwrap();
    let database = registry.get_database("bank").await.unwrap();
    let accounts = registry.get_collection(&database, "accounts");

    registry.shutdown().await.unwrap();
    registry.shutdown().await.unwrap();

    assert_eq!(driver.shutdown_count(), 1);
    assert!(registry.is_closed().await);
    assert!(client.is_released());
    assert!(matches!(client.client(), Err(DocumentStoreError::RegistryClosed)));
    assert!(matches!(registry.get_client().await, Err(DocumentStoreError::RegistryClosed)));
    assert!(matches!(
        QueryHelper::find_all(&accounts, &Filter::all()).await,
        Err(DocumentStoreError::RegistryClosed)
    ));
    assert!(matches!(database.list_collection_names().await, Err(DocumentStoreError::RegistryClosed)));
}

#[tokio::test]
async fn shutdown_before_first_use_never_connects() {
    let driver = InMemoryDriver::new();
    let registry = common::registry(&driver);

    registry.shutdown().await.unwrap();

    assert!(matches!(registry.get_client().await, Err(DocumentStoreError::RegistryClosed)));
    assert_eq!(driver.connect_count(), 0);
    assert_eq!(driver.shutdown_count(), 0);
}

#[tokio::test]
async fn reinitialize_policy_connects_a_fresh_client() {
    let driver = InMemoryDriver::new();
    let config = ConnectionConfig::builder("mongodb://localhost:27017")
        .shutdown_policy(ShutdownPolicy::Reinitialize)
        .build()
        .unwrap();
    let registry = ClientRegistry::new(driver.clone(), config);

    let first = registry.get_client().await.unwrap();
    let stale = registry
        .get_collection(&registry.get_database("bank").await.unwrap(), "accounts");
    QueryHelper::insert_one(&stale, doc! { "accountHolder": "A" }).await.unwrap();

    registry.shutdown().await.unwrap();
    let second = registry.get_client().await.unwrap();

    assert!(!first.same_as(&second));
    assert_eq!(driver.connect_count(), 2);
    assert!(matches!(
        QueryHelper::insert_one(&stale, doc! { "accountHolder": "B" }).await,
        Err(DocumentStoreError::RegistryClosed)
    ));

    let fresh = registry
        .get_collection(&registry.get_database("bank").await.unwrap(), "accounts");
    assert_eq!(QueryHelper::count_documents(&fresh, &Filter::all()).await.unwrap(), 1);
}

#[tokio::test]
async fn databases_appear_once_they_hold_a_collection() {
    let driver = InMemoryDriver::new();
    let registry = common::registry(&driver);

    let database = registry.create_database("sample_restaurants").await.unwrap();
    assert_eq!(database.name(), "sample_restaurants");
    assert!(registry.list_database_names().await.unwrap().is_empty());

    let inspections = database.create_collection("inspections").await.unwrap();
    assert_eq!(inspections.namespace(), "sample_restaurants.inspections");

    let err = database.create_collection("inspections").await.unwrap_err();
    assert!(matches!(err, DocumentStoreError::Write { operation: Operation::CreateCollection, .. }));

    assert_eq!(registry.list_database_names().await.unwrap(), vec!["sample_restaurants".to_string()]);
    assert_eq!(database.list_collection_names().await.unwrap(), vec!["inspections".to_string()]);

    inspections.drop().await.unwrap();
    assert!(database.list_collection_names().await.unwrap().is_empty());
}

#[tokio::test]
async fn get_database_does_not_validate_existence() {
    let driver = InMemoryDriver::new();
    let registry = common::registry(&driver);

    let missing = registry.get_database("does-not-exist").await.unwrap();
    let collection = registry.get_collection(&missing, "nothing");

    assert!(QueryHelper::find_all(&collection, &Filter::all()).await.unwrap().is_empty());
}
