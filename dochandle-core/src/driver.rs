//! The driver boundary.
//!
//! The registry and the query helper never talk to a database directly. They are generic
//! over a [`Driver`], whose associated types model the client, database, collection and
//! cursor of the underlying client library. Any implementation exposing this capability
//! set can be plugged in, from a production database driver to an in-memory fake.
//!
//! # Thread Safety
//!
//! Clients, databases and collections must be `Send + Sync`: one client is shared by every
//! caller of the registry. Cursors only need to be `Send`; a cursor has exactly one holder.
//!
//! # Filters and updates
//!
//! Filters, updates and pipelines cross the boundary as [`FilterSpec`], [`UpdateSpec`]
//! and [`Stage`] values. Each driver translates them into its native representation,
//! typically by implementing [`FilterVisitor`](crate::filter::FilterVisitor).

use std::fmt::Debug;

use async_trait::async_trait;
use bson::{Bson, Document};

use crate::{
    config::ConnectionConfig,
    error::DriverResult,
    filter::{FilterSpec, Query},
    pipeline::Stage,
    update::UpdateSpec,
};

/// Counts reported by an update.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateResult {
    /// Documents matched by the filter.
    pub matched_count: u64,
    /// Documents actually changed. A matched document already in the target state is not counted.
    pub modified_count: u64,
}

/// Establishes clients. Connecting is the only operation that performs the handshake.
#[async_trait]
pub trait Driver: Send + Sync + Debug + 'static {
    type Client: DriverClient;

    /// Opens a client for the given configuration. Implementations should complete the
    /// handshake here so that connection failures surface from this call.
    async fn connect(&self, config: &ConnectionConfig) -> DriverResult<Self::Client>;
}

#[async_trait]
pub trait DriverClient: Send + Sync + Debug + 'static {
    type Database: DriverDatabase;

    /// Derives a database view. Performs no I/O and does not validate existence.
    fn database(&self, name: &str) -> Self::Database;

    async fn list_database_names(&self) -> DriverResult<Vec<String>>;

    /// Releases every resource held by the client. Called at most once per client.
    async fn shutdown(&self) -> DriverResult<()>;
}

#[async_trait]
pub trait DriverDatabase: Send + Sync + Debug {
    type Collection: DriverCollection;

    fn name(&self) -> &str;

    /// Derives a collection view. Performs no I/O.
    fn collection(&self, name: &str) -> Self::Collection;

    async fn create_collection(&self, name: &str) -> DriverResult<()>;

    async fn list_collection_names(&self) -> DriverResult<Vec<String>>;

    async fn drop(&self) -> DriverResult<()>;
}

#[async_trait]
pub trait DriverCollection: Send + Sync + Debug {
    type Cursor: DriverCursor;

    fn name(&self) -> &str;

    /// Inserts one document and returns its `_id`, generating one if absent.
    async fn insert_one(&self, document: Document) -> DriverResult<Bson>;

    /// Inserts documents in order, stopping at the first failure. Documents inserted before
    /// the failure stay persisted; the error reports how many via [`DriverError::inserted`](crate::error::DriverError).
    async fn insert_many(&self, documents: Vec<Document>) -> DriverResult<Vec<Bson>>;

    async fn find(&self, query: &Query) -> DriverResult<Self::Cursor>;

    async fn count_documents(&self, filter: &FilterSpec) -> DriverResult<u64>;

    async fn update_one(&self, filter: &FilterSpec, update: &UpdateSpec) -> DriverResult<UpdateResult>;

    async fn update_many(&self, filter: &FilterSpec, update: &UpdateSpec) -> DriverResult<UpdateResult>;

    /// Returns the number of deleted documents (zero or one).
    async fn delete_one(&self, filter: &FilterSpec) -> DriverResult<u64>;

    async fn delete_many(&self, filter: &FilterSpec) -> DriverResult<u64>;

    async fn aggregate(&self, pipeline: &[Stage]) -> DriverResult<Self::Cursor>;

    async fn drop(&self) -> DriverResult<()>;
}

/// A forward-only, single-pass stream of documents backed by releasable state.
#[async_trait]
pub trait DriverCursor: Send + Debug {
    /// Returns the next document, or `None` once exhausted.
    async fn next_document(&mut self) -> DriverResult<Option<Document>>;

    /// Releases client and server side state. Must be safe to call more than once.
    async fn close(&mut self) -> DriverResult<()>;
}
