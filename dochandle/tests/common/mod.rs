#![allow(dead_code)]

use dochandle::{
    memory::{InMemoryClient, InMemoryDriver},
    prelude::*,
};

pub fn config() -> ConnectionConfig {
    ConnectionConfig::from_uri("mongodb://localhost:27017/?retryWrites=true&w=majority&appName=dochandle-tests")
        .unwrap()
}

pub fn registry(driver: &InMemoryDriver) -> ClientRegistry<InMemoryDriver> {
    ClientRegistry::new(driver.clone(), config())
}

/// A fresh driver, its registry and a handle to `bank.accounts`.
pub async fn accounts() -> (InMemoryDriver, ClientRegistry<InMemoryDriver>, CollectionHandle<InMemoryClient>) {
    let driver = InMemoryDriver::new();
    let registry = registry(&driver);
    let database = registry.get_database("bank").await.unwrap();
    let accounts = registry.get_collection(&database, "accounts");

    (driver, registry, accounts)
}
