use std::fmt;

use async_trait::async_trait;
use bson::{Bson, Document, doc};
use futures::TryStreamExt;
use mongodb::{
    Client, Collection as MongoCollection, Cursor as MongoCursor, Database as MongoDatabase,
    options::{
        Acknowledgment, ClientOptions, FindOptions, ServerApi, ServerApiVersion as MongoServerApiVersion,
        WriteConcern as MongoWriteConcern,
    },
};
use tracing::{debug, info};

use dochandle_core::{
    config::{ConnectionConfig, ServerApiVersion, WriteConcern},
    driver::{Driver, DriverClient, DriverCollection, DriverCursor, DriverDatabase, UpdateResult},
    error::{DriverError, DriverErrorKind, DriverResult},
    filter::{FilterSpec, Query},
    pipeline::Stage,
    update::UpdateSpec,
};

use crate::{
    command::{translate_pipeline, translate_sort, translate_update},
    error::driver_error,
    query::MongoQueryTranslator,
};

fn write_concern(write_concern: WriteConcern) -> MongoWriteConcern {
    let w = match write_concern {
        WriteConcern::Majority => Acknowledgment::Majority,
        WriteConcern::Acknowledged => Acknowledgment::Nodes(1),
        WriteConcern::Unacknowledged => Acknowledgment::Nodes(0),
        WriteConcern::Nodes(n) => Acknowledgment::Nodes(n),
    };

    MongoWriteConcern::builder().w(w).build()
}

/// Builds driver options from a [`ConnectionConfig`]. Explicit config values take precedence
/// over the ones embedded in the URI.
pub(crate) async fn client_options(config: &ConnectionConfig) -> DriverResult<ClientOptions> {
    let mut options = ClientOptions::parse(config.endpoint_uri())
        .await
        .map_err(|e| DriverError::new(DriverErrorKind::Connection, e.to_string()))?;

    options.server_api = Some(
        ServerApi::builder()
            .version(match config.api_version() {
                ServerApiVersion::V1 => MongoServerApiVersion::V1,
            })
            .build(),
    );
    options.retry_writes = Some(config.retry_writes());
    options.write_concern = Some(write_concern(config.write_concern()));

    if let Some(app_name) = config.app_name() {
        options.app_name = Some(app_name.to_string());
    }

    Ok(options)
}

/// Driver backed by the official MongoDB client.
///
/// ```ignore
/// use dochandle::{prelude::*, mongodb::MongoDriver};
///
/// let registry = ClientRegistry::new(MongoDriver, ConnectionConfig::from_env()?);
/// let database = registry.get_database("sample_restaurants").await?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct MongoDriver;

#[async_trait]
impl Driver for MongoDriver {
    type Client = MongoClient;

    async fn connect(&self, config: &ConnectionConfig) -> DriverResult<Self::Client> {
        let client = Client::with_options(client_options(config).await?)
            .map_err(|e| DriverError::new(DriverErrorKind::Connection, e.to_string()))?;

        // The client connects lazily; ping so handshake failures surface here.
        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| DriverError::new(DriverErrorKind::Connection, e.to_string()))?;

        info!(uri = %config.redacted_uri(), "pinged deployment");

        Ok(MongoClient { client })
    }
}

#[derive(Debug, Clone)]
pub struct MongoClient {
    client: Client,
}

impl MongoClient {
    /// The underlying client, for operations outside the driver boundary.
    pub fn inner(&self) -> &Client {
        &self.client
    }
}

#[async_trait]
impl DriverClient for MongoClient {
    type Database = MongoDbDatabase;

    fn database(&self, name: &str) -> Self::Database {
        MongoDbDatabase { database: self.client.database(name) }
    }

    async fn list_database_names(&self) -> DriverResult<Vec<String>> {
        self.client.list_database_names().await.map_err(driver_error)
    }

    async fn shutdown(&self) -> DriverResult<()> {
        self.client.clone().shutdown().await;

        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct MongoDbDatabase {
    database: MongoDatabase,
}

#[async_trait]
impl DriverDatabase for MongoDbDatabase {
    type Collection = MongoDbCollection;

    fn name(&self) -> &str {
        self.database.name()
    }

    fn collection(&self, name: &str) -> Self::Collection {
        MongoDbCollection { collection: self.database.collection(name) }
    }

    async fn create_collection(&self, name: &str) -> DriverResult<()> {
        self.database.create_collection(name).await.map_err(driver_error)
    }

    async fn list_collection_names(&self) -> DriverResult<Vec<String>> {
        self.database.list_collection_names().await.map_err(driver_error)
    }

    async fn drop(&self) -> DriverResult<()> {
        self.database.drop().await.map_err(driver_error)
    }
}

#[derive(Debug, Clone)]
pub struct MongoDbCollection {
    collection: MongoCollection<Document>,
}

#[async_trait]
impl DriverCollection for MongoDbCollection {
    type Cursor = MongoDbCursor;

    fn name(&self) -> &str {
        self.collection.name()
    }

    async fn insert_one(&self, document: Document) -> DriverResult<Bson> {
        Ok(self
            .collection
            .insert_one(document)
            .await
            .map_err(driver_error)?
            .inserted_id)
    }

    async fn insert_many(&self, documents: Vec<Document>) -> DriverResult<Vec<Bson>> {
        let mut inserted = self
            .collection
            .insert_many(documents)
            .await
            .map_err(driver_error)?
            .inserted_ids
            .into_iter()
            .collect::<Vec<_>>();

        inserted.sort_by_key(|(index, _)| *index);

        Ok(inserted.into_iter().map(|(_, id)| id).collect())
    }

    async fn find(&self, query: &Query) -> DriverResult<Self::Cursor> {
        let mut options = FindOptions::default();

        if let Some(limit) = query.limit {
            options.limit = Some(limit as i64);
        }
        if let Some(skip) = query.offset {
            options.skip = Some(skip as u64);
        }
        if let Some(sort) = &query.sort {
            options.sort = Some(translate_sort(&sort.field, sort.direction));
        }

        let filter = MongoQueryTranslator::translate(&query.filter_or_all())?;
        debug!(namespace = %self.collection.namespace(), %filter, "find");

        let cursor = self
            .collection
            .find(filter)
            .with_options(options)
            .await
            .map_err(driver_error)?;

        Ok(MongoDbCursor { cursor: Some(cursor) })
    }

    async fn count_documents(&self, filter: &FilterSpec) -> DriverResult<u64> {
        self.collection
            .count_documents(MongoQueryTranslator::translate(filter)?)
            .await
            .map_err(driver_error)
    }

    async fn update_one(&self, filter: &FilterSpec, update: &UpdateSpec) -> DriverResult<UpdateResult> {
        let result = self
            .collection
            .update_one(MongoQueryTranslator::translate(filter)?, translate_update(update))
            .await
            .map_err(driver_error)?;

        Ok(UpdateResult { matched_count: result.matched_count, modified_count: result.modified_count })
    }

    async fn update_many(&self, filter: &FilterSpec, update: &UpdateSpec) -> DriverResult<UpdateResult> {
        let result = self
            .collection
            .update_many(MongoQueryTranslator::translate(filter)?, translate_update(update))
            .await
            .map_err(driver_error)?;

        Ok(UpdateResult { matched_count: result.matched_count, modified_count: result.modified_count })
    }

    async fn delete_one(&self, filter: &FilterSpec) -> DriverResult<u64> {
        Ok(self
            .collection
            .delete_one(MongoQueryTranslator::translate(filter)?)
            .await
            .map_err(driver_error)?
            .deleted_count)
    }

    async fn delete_many(&self, filter: &FilterSpec) -> DriverResult<u64> {
        Ok(self
            .collection
            .delete_many(MongoQueryTranslator::translate(filter)?)
            .await
            .map_err(driver_error)?
            .deleted_count)
    }

    async fn aggregate(&self, pipeline: &[Stage]) -> DriverResult<Self::Cursor> {
        let cursor = self
            .collection
            .aggregate(translate_pipeline(pipeline)?)
            .await
            .map_err(driver_error)?;

        Ok(MongoDbCursor { cursor: Some(cursor) })
    }

    async fn drop(&self) -> DriverResult<()> {
        self.collection.drop().await.map_err(driver_error)
    }
}

/// Wraps a server cursor. Closing drops it, which kills the server-side cursor.
pub struct MongoDbCursor {
    cursor: Option<MongoCursor<Document>>,
}

impl fmt::Debug for MongoDbCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MongoDbCursor")
            .field("open", &self.cursor.is_some())
            .finish()
    }
}

#[async_trait]
impl DriverCursor for MongoDbCursor {
    async fn next_document(&mut self) -> DriverResult<Option<Document>> {
        match self.cursor.as_mut() {
            Some(cursor) => cursor.try_next().await.map_err(driver_error),
            None => Err(DriverError::new(DriverErrorKind::CursorClosed, "cursor has been closed")),
        }
    }

    async fn close(&mut self) -> DriverResult<()> {
        self.cursor = None;

        Ok(())
    }
}
