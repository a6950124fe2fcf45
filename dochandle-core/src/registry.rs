//! The client registry: one lazily created, shared client per registry.
//!
//! # Initialization
//!
//! The first [`ClientRegistry::get_client`] call connects through the [`Driver`]. Concurrent
//! first callers are serialized by an initialization mutex and re-check the cached state once
//! they hold it (double-checked initialization), so exactly one connect call happens and every
//! caller receives the same [`ClientHandle`]. The handle is only published after the connect
//! call completed, so no caller ever observes a partially constructed client.
//!
//! A failed connect leaves the slot empty. Callers that were already waiting on that attempt
//! receive its error instead of connecting again; only calls made after the failure retry.
//!
//! Once initialized, `get_client` only takes the read side of the state lock.
//!
//! # Shutdown
//!
//! [`ClientRegistry::shutdown`] releases the client exactly once; further calls are no-ops.
//! What happens afterwards depends on the configured [`ShutdownPolicy`].
//!
//! # Example
//!
//! ```ignore
//! use dochandle::{prelude::*, memory::InMemoryDriver};
//!
//! let config = ConnectionConfig::from_uri("mongodb://localhost:27017")?;
//! let registry = ClientRegistry::new(InMemoryDriver::new(), config);
//!
//! let database = registry.get_database("sample-training").await?;
//! let inspections = registry.get_collection(&database, "inspections");
//! ```

use std::{
    fmt,
    sync::atomic::{AtomicU64, Ordering},
};

use mea::{mutex::Mutex, rwlock::RwLock};
use tracing::{debug, info, warn};

use crate::{
    config::{ConnectionConfig, ShutdownPolicy},
    driver::Driver,
    error::{DocumentStoreError, DocumentStoreResult},
    handle::{ClientHandle, CollectionHandle, DatabaseHandle},
};

enum RegistryState<C> {
    Empty,
    Ready(ClientHandle<C>),
    Closed,
}

/// Owns the single shared client for a driver and hands out derived handles.
///
/// Construct one registry per process (or per logical connection target) and pass it by
/// reference, or inside an `Arc`, to every call site.
pub struct ClientRegistry<D: Driver> {
    driver: D,
    config: ConnectionConfig,
    state: RwLock<RegistryState<D::Client>>,
    init: Mutex<LastAttempt>,
    /// Bumped after every finished connect attempt.
    attempts: AtomicU64,
}

#[derive(Default)]
struct LastAttempt {
    failure: Option<String>,
}

impl<D: Driver> ClientRegistry<D> {
    pub fn new(driver: D, config: ConnectionConfig) -> Self {
        Self {
            driver,
            config,
            state: RwLock::new(RegistryState::Empty),
            init: Mutex::new(LastAttempt::default()),
            attempts: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    pub fn driver(&self) -> &D {
        &self.driver
    }

    pub async fn is_initialized(&self) -> bool {
        matches!(&*self.state.read().await, RegistryState::Ready(_))
    }

    pub async fn is_closed(&self) -> bool {
        matches!(&*self.state.read().await, RegistryState::Closed)
    }

    async fn cached(&self) -> DocumentStoreResult<Option<ClientHandle<D::Client>>> {
        match &*self.state.read().await {
            RegistryState::Ready(handle) => Ok(Some(handle.clone())),
            RegistryState::Closed if self.config.shutdown_policy() == ShutdownPolicy::Reject => {
                Err(DocumentStoreError::RegistryClosed)
            }
            _ => Ok(None),
        }
    }

    /// Returns the shared client, connecting on first use.
    ///
    /// # Errors
    ///
    /// - [`DocumentStoreError::Connection`] if the connect call fails; the registry stays
    ///   uninitialized so a later call may retry. Calls that were waiting on the failed
    ///   attempt share its error.
    /// - [`DocumentStoreError::RegistryClosed`] after [`shutdown`](Self::shutdown) under
    ///   [`ShutdownPolicy::Reject`].
    pub async fn get_client(&self) -> DocumentStoreResult<ClientHandle<D::Client>> {
        if let Some(handle) = self.cached().await? {
            return Ok(handle);
        }

        let seen = self.attempts.load(Ordering::SeqCst);
        let mut last = self.init.lock().await;

        // Another caller may have finished connecting while we waited.
        if let Some(handle) = self.cached().await? {
            return Ok(handle);
        }

        if self.attempts.load(Ordering::SeqCst) != seen {
            if let Some(failure) = &last.failure {
                debug!(endpoint = %self.config.redacted_uri(), "sharing failed connect attempt");
                return Err(DocumentStoreError::Connection(failure.clone()));
            }
        }

        info!(
            endpoint = %self.config.redacted_uri(),
            api_version = ?self.config.api_version(),
            "connecting client"
        );

        let connected = self.driver.connect(&self.config).await;
        self.attempts.fetch_add(1, Ordering::SeqCst);

        let client = match connected {
            Ok(client) => {
                last.failure = None;
                client
            }
            Err(e) => {
                warn!(endpoint = %self.config.redacted_uri(), error = %e, "connect failed");
                last.failure = Some(e.to_string());
                return Err(DocumentStoreError::Connection(e.to_string()));
            }
        };

        let handle = ClientHandle::new(client);
        *self.state.write().await = RegistryState::Ready(handle.clone());

        info!(endpoint = %self.config.redacted_uri(), "client ready");

        Ok(handle)
    }

    /// Returns a view of the named database, connecting first if needed.
    ///
    /// Fails only when [`get_client`](Self::get_client) fails; the database itself is not
    /// validated.
    pub async fn get_database(&self, name: &str) -> DocumentStoreResult<DatabaseHandle<D::Client>> {
        Ok(self.get_client().await?.database(name))
    }

    /// Same as [`get_database`](Self::get_database). Databases come into existence on the
    /// first write, so "creating" one only derives the handle.
    pub async fn create_database(&self, name: &str) -> DocumentStoreResult<DatabaseHandle<D::Client>> {
        self.get_database(name).await
    }

    /// Derives a collection view from a database view. Pure, never fails.
    pub fn get_collection(
        &self,
        database: &DatabaseHandle<D::Client>,
        name: &str,
    ) -> CollectionHandle<D::Client> {
        database.collection(name)
    }

    pub async fn list_database_names(&self) -> DocumentStoreResult<Vec<String>> {
        self.get_client().await?.list_database_names().await
    }

    /// Releases the client and everything it holds. Idempotent.
    ///
    /// Handles derived before the shutdown fail with [`DocumentStoreError::RegistryClosed`]
    /// from then on, even under [`ShutdownPolicy::Reinitialize`].
    pub async fn shutdown(&self) -> DocumentStoreResult<()> {
        let _guard = self.init.lock().await;

        let previous = std::mem::replace(&mut *self.state.write().await, RegistryState::Closed);

        match previous {
            RegistryState::Ready(handle) => {
                info!(endpoint = %self.config.redacted_uri(), "shutting down client");
                handle.release().await
            }
            RegistryState::Empty => {
                debug!("shutdown before any client was created");
                Ok(())
            }
            RegistryState::Closed => Ok(()),
        }
    }
}

impl<D: Driver> fmt::Debug for ClientRegistry<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ClientRegistry")
            .field("driver", &self.driver)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}
