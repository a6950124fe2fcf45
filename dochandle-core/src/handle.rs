//! Client, database and collection handles.
//!
//! A [`ClientHandle`] is the shared handle to the single live client owned by the
//! [`ClientRegistry`](crate::registry::ClientRegistry). [`DatabaseHandle`] and
//! [`CollectionHandle`] are lightweight derived views: they store names plus a weak
//! reference to the client, so they never keep a released client alive. Using a view
//! after the registry shut its client down fails with [`DocumentStoreError::RegistryClosed`].

use std::{
    fmt,
    sync::{
        Arc, Weak,
        atomic::{AtomicBool, Ordering},
    },
};

use tracing::debug;

use crate::{
    driver::{DriverClient, DriverDatabase},
    error::{DocumentStoreError, DocumentStoreResult, Operation},
};

/// The driver collection type reachable from a client type.
pub type CollectionOf<C> = <<C as DriverClient>::Database as DriverDatabase>::Collection;

/// The driver cursor type reachable from a client type.
pub type CursorOf<C> = <CollectionOf<C> as crate::driver::DriverCollection>::Cursor;

#[derive(Debug)]
pub(crate) struct ClientCell<C> {
    client: C,
    released: AtomicBool,
}

/// Shared handle to the registry's client.
///
/// Clones refer to the same client; [`ClientHandle::same_as`] compares identity.
#[derive(Debug)]
pub struct ClientHandle<C> {
    cell: Arc<ClientCell<C>>,
}

impl<C> Clone for ClientHandle<C> {
    fn clone(&self) -> Self {
        Self { cell: Arc::clone(&self.cell) }
    }
}

impl<C: DriverClient> ClientHandle<C> {
    pub(crate) fn new(client: C) -> Self {
        Self {
            cell: Arc::new(ClientCell { client, released: AtomicBool::new(false) }),
        }
    }

    /// Returns the driver client, or `RegistryClosed` once the registry released it.
    pub fn client(&self) -> DocumentStoreResult<&C> {
        if self.is_released() {
            return Err(DocumentStoreError::RegistryClosed);
        }

        Ok(&self.cell.client)
    }

    /// Whether both handles refer to the same underlying client.
    pub fn same_as(&self, other: &ClientHandle<C>) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    pub fn is_released(&self) -> bool {
        self.cell.released.load(Ordering::Acquire)
    }

    /// Derives a database view. No I/O is performed and existence is not checked.
    pub fn database(&self, name: &str) -> DatabaseHandle<C> {
        debug!(database = name, "deriving database handle");

        DatabaseHandle { name: name.to_string(), client: Arc::downgrade(&self.cell) }
    }

    pub async fn list_database_names(&self) -> DocumentStoreResult<Vec<String>> {
        self.client()?
            .list_database_names()
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::ListDatabases, "<client>", e))
    }

    /// Marks the client released and shuts it down. Only the registry calls this, once.
    pub(crate) async fn release(&self) -> DocumentStoreResult<()> {
        if self.cell.released.swap(true, Ordering::AcqRel) {
            return Ok(());
        }

        self.cell
            .client
            .shutdown()
            .await
            .map_err(|e| DocumentStoreError::Connection(format!("shutdown failed: {e}")))
    }
}

fn upgrade<C>(client: &Weak<ClientCell<C>>) -> DocumentStoreResult<Arc<ClientCell<C>>> {
    match client.upgrade() {
        Some(cell) if !cell.released.load(Ordering::Acquire) => Ok(cell),
        _ => Err(DocumentStoreError::RegistryClosed),
    }
}

/// A database view derived from a [`ClientHandle`].
pub struct DatabaseHandle<C> {
    name: String,
    client: Weak<ClientCell<C>>,
}

impl<C> Clone for DatabaseHandle<C> {
    fn clone(&self) -> Self {
        Self { name: self.name.clone(), client: Weak::clone(&self.client) }
    }
}

impl<C> fmt::Debug for DatabaseHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseHandle").field("name", &self.name).finish()
    }
}

impl<C: DriverClient> DatabaseHandle<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Derives a collection view. Pure: no network call, never fails.
    pub fn collection(&self, name: &str) -> CollectionHandle<C> {
        CollectionHandle {
            database: self.name.clone(),
            name: name.to_string(),
            client: Weak::clone(&self.client),
        }
    }

    /// Resolves the driver database through the live client.
    pub fn resolve(&self) -> DocumentStoreResult<C::Database> {
        Ok(upgrade(&self.client)?.client.database(&self.name))
    }

    /// Explicitly creates a collection and returns a view of it.
    pub async fn create_collection(&self, name: &str) -> DocumentStoreResult<CollectionHandle<C>> {
        self.resolve()?
            .create_collection(name)
            .await
            .map_err(|e| {
                DocumentStoreError::from_driver(
                    Operation::CreateCollection,
                    format!("{}.{}", self.name, name),
                    e,
                )
            })?;

        Ok(self.collection(name))
    }

    pub async fn list_collection_names(&self) -> DocumentStoreResult<Vec<String>> {
        self.resolve()?
            .list_collection_names()
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::ListCollections, self.name.as_str(), e))
    }

    /// Drops the database and everything in it.
    pub async fn drop(&self) -> DocumentStoreResult<()> {
        self.resolve()?
            .drop()
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::DropDatabase, self.name.as_str(), e))
    }
}

/// A collection view derived from a [`DatabaseHandle`].
pub struct CollectionHandle<C> {
    database: String,
    name: String,
    client: Weak<ClientCell<C>>,
}

impl<C> Clone for CollectionHandle<C> {
    fn clone(&self) -> Self {
        Self {
            database: self.database.clone(),
            name: self.name.clone(),
            client: Weak::clone(&self.client),
        }
    }
}

impl<C> fmt::Debug for CollectionHandle<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CollectionHandle")
            .field("database", &self.database)
            .field("name", &self.name)
            .finish()
    }
}

impl<C: DriverClient> CollectionHandle<C> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn database_name(&self) -> &str {
        &self.database
    }

    /// `database.collection`, used to label errors and log lines.
    pub fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// Resolves the driver collection through the live client.
    pub fn resolve(&self) -> DocumentStoreResult<CollectionOf<C>> {
        Ok(upgrade(&self.client)?
            .client
            .database(&self.database)
            .collection(&self.name))
    }

    pub async fn drop(&self) -> DocumentStoreResult<()> {
        use crate::driver::DriverCollection;

        self.resolve()?
            .drop()
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::DropCollection, self.namespace(), e))
    }
}
