//! In-memory driver implementation.
//!
//! [`InMemoryDriver`] plays the role of a database server plus its client library. Every
//! client it connects shares the same server state, so data outlives a client shutdown just
//! like it would on a real server. Documents are kept per collection in insertion order.
//!
//! The driver also carries knobs for exercising the registry: a connect counter, injected
//! connect failures and an artificial connect latency.

use std::{
    collections::{BTreeMap, VecDeque},
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use bson::{Bson, Document, oid::ObjectId};
use mea::rwlock::RwLock;
use tracing::{debug, warn};

use dochandle_core::{
    config::ConnectionConfig,
    driver::{Driver, DriverClient, DriverCollection, DriverCursor, DriverDatabase, UpdateResult},
    error::{DriverError, DriverErrorKind, DriverResult},
    filter::{FilterSpec, Query},
    pipeline::Stage,
    update::UpdateSpec,
};

use crate::{aggregator, evaluator::{DocumentEvaluator, sort_documents}, tracker::ResourceTracker, updater};

type CollectionData = Vec<Document>;
type DatabaseData = BTreeMap<String, CollectionData>;
type ServerData = BTreeMap<String, DatabaseData>;

#[derive(Debug, Default)]
struct DriverState {
    attempts: AtomicUsize,
    connects: AtomicUsize,
    shutdowns: AtomicUsize,
    pending_failures: AtomicUsize,
}

/// In-memory stand-in for a document database and its client library.
///
/// Clones share the same server data, counters and [`ResourceTracker`].
///
/// # Example
///
/// ```ignore
/// use dochandle_memory::InMemoryDriver;
///
/// let driver = InMemoryDriver::builder()
///     .connect_latency(Duration::from_millis(20))
///     .build();
/// let registry = ClientRegistry::new(driver.clone(), config);
/// ```
#[derive(Debug, Clone, Default)]
pub struct InMemoryDriver {
    server: Arc<RwLock<ServerData>>,
    state: Arc<DriverState>,
    tracker: ResourceTracker,
    connect_latency: Option<Duration>,
}

impl InMemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn builder() -> InMemoryDriverBuilder {
        InMemoryDriverBuilder::default()
    }

    /// Number of connect calls so far, failed ones included.
    pub fn connect_attempts(&self) -> usize {
        self.state.attempts.load(Ordering::SeqCst)
    }

    /// Number of successful connects performed so far.
    pub fn connect_count(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    /// Number of clients shut down so far.
    pub fn shutdown_count(&self) -> usize {
        self.state.shutdowns.load(Ordering::SeqCst)
    }

    /// Makes the next `count` connects fail with a connection error.
    pub fn fail_next_connects(&self, count: usize) {
        self.state.pending_failures.store(count, Ordering::SeqCst);
    }

    pub fn tracker(&self) -> &ResourceTracker {
        &self.tracker
    }

    fn take_failure(&self) -> bool {
        self.state
            .pending_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryDriverBuilder {
    connect_latency: Option<Duration>,
    failed_connects: usize,
    tracker: Option<ResourceTracker>,
}

impl InMemoryDriverBuilder {
    /// Delays every connect, widening the window in which concurrent callers race.
    pub fn connect_latency(mut self, latency: Duration) -> Self {
        self.connect_latency = Some(latency);
        self
    }

    pub fn fail_connects(mut self, count: usize) -> Self {
        self.failed_connects = count;
        self
    }

    pub fn tracker(mut self, tracker: ResourceTracker) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn build(self) -> InMemoryDriver {
        let driver = InMemoryDriver {
            connect_latency: self.connect_latency,
            tracker: self.tracker.unwrap_or_default(),
            ..InMemoryDriver::default()
        };
        driver.fail_next_connects(self.failed_connects);
        driver
    }
}

#[async_trait]
impl Driver for InMemoryDriver {
    type Client = InMemoryClient;

    async fn connect(&self, config: &ConnectionConfig) -> DriverResult<Self::Client> {
        self.state.attempts.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.connect_latency {
            tokio::time::sleep(latency).await;
        }

        if self.take_failure() {
            warn!(uri = %config.redacted_uri(), "injected connect failure");
            return Err(DriverError::new(
                DriverErrorKind::Connection,
                format!("server selection failed for {}", config.redacted_uri()),
            ));
        }

        let id = self.state.connects.fetch_add(1, Ordering::SeqCst) + 1;
        debug!(client = id, app_name = config.app_name(), "in-memory client connected");

        Ok(InMemoryClient {
            id,
            server: self.server.clone(),
            state: self.state.clone(),
            tracker: self.tracker.clone(),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }
}

fn ensure_open(closed: &AtomicBool) -> DriverResult<()> {
    if closed.load(Ordering::SeqCst) {
        return Err(DriverError::new(DriverErrorKind::Connection, "client has been shut down"));
    }

    Ok(())
}

#[derive(Debug, Clone)]
pub struct InMemoryClient {
    id: usize,
    server: Arc<RwLock<ServerData>>,
    state: Arc<DriverState>,
    tracker: ResourceTracker,
    closed: Arc<AtomicBool>,
}

impl InMemoryClient {
    /// Sequence number of the connect that produced this client, starting at 1.
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DriverClient for InMemoryClient {
    type Database = InMemoryDatabase;

    fn database(&self, name: &str) -> Self::Database {
        InMemoryDatabase {
            name: name.to_string(),
            server: self.server.clone(),
            tracker: self.tracker.clone(),
            closed: self.closed.clone(),
        }
    }

    async fn list_database_names(&self) -> DriverResult<Vec<String>> {
        ensure_open(&self.closed)?;

        let server = self.server.read().await;
        Ok(server
            .iter()
            .filter(|(_, collections)| !collections.is_empty())
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn shutdown(&self) -> DriverResult<()> {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.shutdowns.fetch_add(1, Ordering::SeqCst);
            debug!(client = self.id, "in-memory client shut down");
        }

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryDatabase {
    name: String,
    server: Arc<RwLock<ServerData>>,
    tracker: ResourceTracker,
    closed: Arc<AtomicBool>,
}

#[async_trait]
impl DriverDatabase for InMemoryDatabase {
    type Collection = InMemoryCollection;

    fn name(&self) -> &str {
        &self.name
    }

    fn collection(&self, name: &str) -> Self::Collection {
        InMemoryCollection {
            database: self.name.clone(),
            name: name.to_string(),
            server: self.server.clone(),
            tracker: self.tracker.clone(),
            closed: self.closed.clone(),
        }
    }

    async fn create_collection(&self, name: &str) -> DriverResult<()> {
        ensure_open(&self.closed)?;

        let mut server = self.server.write().await;
        let database = server.entry(self.name.clone()).or_default();

        if database.contains_key(name) {
            return Err(DriverError::new(
                DriverErrorKind::Other,
                format!("Collection already exists. NS: {}.{}", self.name, name),
            ));
        }

        database.insert(name.to_string(), CollectionData::new());
        Ok(())
    }

    async fn list_collection_names(&self) -> DriverResult<Vec<String>> {
        ensure_open(&self.closed)?;

        let server = self.server.read().await;
        Ok(server
            .get(&self.name)
            .map(|database| database.keys().cloned().collect())
            .unwrap_or_default())
    }

    async fn drop(&self) -> DriverResult<()> {
        ensure_open(&self.closed)?;

        self.server.write().await.remove(&self.name);
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct InMemoryCollection {
    database: String,
    name: String,
    server: Arc<RwLock<ServerData>>,
    tracker: ResourceTracker,
    closed: Arc<AtomicBool>,
}

impl InMemoryCollection {
    fn namespace(&self) -> String {
        format!("{}.{}", self.database, self.name)
    }

    /// Copies the documents currently stored, in insertion order.
    async fn snapshot(&self) -> DriverResult<Vec<Document>> {
        ensure_open(&self.closed)?;

        let server = self.server.read().await;
        Ok(server
            .get(&self.database)
            .and_then(|database| database.get(&self.name))
            .cloned()
            .unwrap_or_default())
    }

    fn matching(&self, documents: Vec<Document>, filter: &FilterSpec) -> DriverResult<Vec<Document>> {
        DocumentEvaluator::validate(filter)?;

        let mut matched = Vec::with_capacity(documents.len());
        for document in documents {
            if DocumentEvaluator::matches(&document, filter)? {
                matched.push(document);
            }
        }

        Ok(matched)
    }

    /// Positions of the first `limit` documents matching `filter`.
    fn matching_indexes(collection: &[Document], filter: &FilterSpec, limit: usize) -> DriverResult<Vec<usize>> {
        let mut indexes = Vec::new();

        for (index, document) in collection.iter().enumerate() {
            if indexes.len() == limit {
                break;
            }
            if DocumentEvaluator::matches(document, filter)? {
                indexes.push(index);
            }
        }

        Ok(indexes)
    }

    fn cursor(&self, documents: Vec<Document>) -> InMemoryCursor {
        InMemoryCursor::new(documents, self.tracker.clone())
    }

    /// Assigns an `_id` (placed first) when the document has none.
    fn with_id(document: Document) -> (Bson, Document) {
        if let Some(id) = document.get("_id") {
            return (id.clone(), document);
        }

        let id = Bson::ObjectId(ObjectId::new());
        let mut identified = Document::new();
        identified.insert("_id", id.clone());
        for (key, value) in document {
            identified.insert(key, value);
        }
        (id, identified)
    }

    fn insert_into(&self, collection: &mut CollectionData, document: Document) -> DriverResult<Bson> {
        let (id, document) = Self::with_id(document);

        if collection.iter().any(|existing| existing.get("_id") == Some(&id)) {
            return Err(DriverError::new(
                DriverErrorKind::DuplicateKey,
                format!(
                    "E11000 duplicate key error collection: {} index: _id_ dup key: {{ _id: {id} }}",
                    self.namespace()
                ),
            ));
        }

        collection.push(document);
        Ok(id)
    }

    async fn update(&self, filter: &FilterSpec, update: &UpdateSpec, many: bool) -> DriverResult<UpdateResult> {
        ensure_open(&self.closed)?;
        DocumentEvaluator::validate(filter)?;

        let mut server = self.server.write().await;
        let Some(collection) = server.get_mut(&self.database).and_then(|database| database.get_mut(&self.name)) else {
            return Ok(UpdateResult::default());
        };

        let indexes = Self::matching_indexes(collection, filter, if many { usize::MAX } else { 1 })?;

        // Stage every change first so a failing document leaves the collection untouched.
        let mut staged = Vec::with_capacity(indexes.len());
        for &index in &indexes {
            let mut document = collection[index].clone();
            if updater::apply(&mut document, update)? {
                staged.push((index, document));
            }
        }

        let result = UpdateResult {
            matched_count: indexes.len() as u64,
            modified_count: staged.len() as u64,
        };

        for (index, document) in staged {
            collection[index] = document;
        }

        Ok(result)
    }

    async fn delete(&self, filter: &FilterSpec, many: bool) -> DriverResult<u64> {
        ensure_open(&self.closed)?;
        DocumentEvaluator::validate(filter)?;

        let mut server = self.server.write().await;
        let Some(collection) = server.get_mut(&self.database).and_then(|database| database.get_mut(&self.name)) else {
            return Ok(0);
        };

        let indexes = Self::matching_indexes(collection, filter, if many { usize::MAX } else { 1 })?;

        for &index in indexes.iter().rev() {
            collection.remove(index);
        }

        Ok(indexes.len() as u64)
    }
}

#[async_trait]
impl DriverCollection for InMemoryCollection {
    type Cursor = InMemoryCursor;

    fn name(&self) -> &str {
        &self.name
    }

    async fn insert_one(&self, document: Document) -> DriverResult<Bson> {
        ensure_open(&self.closed)?;

        let mut server = self.server.write().await;
        let collection = server
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();

        self.insert_into(collection, document)
    }

    async fn insert_many(&self, documents: Vec<Document>) -> DriverResult<Vec<Bson>> {
        ensure_open(&self.closed)?;

        let mut server = self.server.write().await;
        let collection = server
            .entry(self.database.clone())
            .or_default()
            .entry(self.name.clone())
            .or_default();

        let mut ids = Vec::with_capacity(documents.len());
        for document in documents {
            match self.insert_into(collection, document) {
                Ok(id) => ids.push(id),
                Err(e) => return Err(e.with_inserted(ids.len())),
            }
        }

        Ok(ids)
    }

    async fn find(&self, query: &Query) -> DriverResult<Self::Cursor> {
        let mut documents = self.matching(self.snapshot().await?, &query.filter_or_all())?;

        if let Some(sort) = &query.sort {
            sort_documents(&mut documents, &sort.field, sort.direction);
        }

        let documents = documents
            .into_iter()
            .skip(query.offset.unwrap_or(0))
            .take(query.limit.unwrap_or(usize::MAX))
            .collect();

        Ok(self.cursor(documents))
    }

    async fn count_documents(&self, filter: &FilterSpec) -> DriverResult<u64> {
        Ok(self.matching(self.snapshot().await?, filter)?.len() as u64)
    }

    async fn update_one(&self, filter: &FilterSpec, update: &UpdateSpec) -> DriverResult<UpdateResult> {
        self.update(filter, update, false).await
    }

    async fn update_many(&self, filter: &FilterSpec, update: &UpdateSpec) -> DriverResult<UpdateResult> {
        self.update(filter, update, true).await
    }

    async fn delete_one(&self, filter: &FilterSpec) -> DriverResult<u64> {
        self.delete(filter, false).await
    }

    async fn delete_many(&self, filter: &FilterSpec) -> DriverResult<u64> {
        self.delete(filter, true).await
    }

    async fn aggregate(&self, pipeline: &[Stage]) -> DriverResult<Self::Cursor> {
        let documents = aggregator::run(self.snapshot().await?, pipeline)?;
        Ok(self.cursor(documents))
    }

    async fn drop(&self) -> DriverResult<()> {
        ensure_open(&self.closed)?;

        let mut server = self.server.write().await;
        if let Some(database) = server.get_mut(&self.database) {
            database.remove(&self.name);
        }

        Ok(())
    }
}

/// Cursor over a materialized result set, registered with the driver's [`ResourceTracker`].
#[derive(Debug)]
pub struct InMemoryCursor {
    documents: VecDeque<Document>,
    tracker: ResourceTracker,
    closed: bool,
}

impl InMemoryCursor {
    fn new(documents: Vec<Document>, tracker: ResourceTracker) -> Self {
        tracker.cursor_opened();

        Self { documents: documents.into(), tracker, closed: false }
    }
}

#[async_trait]
impl DriverCursor for InMemoryCursor {
    async fn next_document(&mut self) -> DriverResult<Option<Document>> {
        if self.closed {
            return Err(DriverError::new(DriverErrorKind::CursorClosed, "cursor has been closed"));
        }

        Ok(self.documents.pop_front())
    }

    async fn close(&mut self) -> DriverResult<()> {
        if !self.closed {
            self.closed = true;
            self.documents.clear();
            self.tracker.cursor_closed();
        }

        Ok(())
    }
}

impl Drop for InMemoryCursor {
    fn drop(&mut self) {
        if !self.closed {
            warn!(remaining = self.documents.len(), "in-memory cursor dropped without being closed");
            self.tracker.cursor_abandoned();
        }
    }
}
