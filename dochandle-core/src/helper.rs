//! Query helper: stateless operations over a [`CollectionHandle`].
//!
//! Every function resolves the collection through the registry's live client, issues one
//! driver call and normalizes the result. Nothing is retried. Driver failures come back as
//! [`DocumentStoreError::Read`] or [`DocumentStoreError::Write`], tagged with the operation
//! and the filter, update or pipeline involved. A query matching nothing is not an error.
//!
//! # Example
//!
//! ```ignore
//! use dochandle::prelude::*;
//!
//! QueryHelper::insert_one(&accounts, doc! { "accountHolder": "A", "balance": 100 }).await?;
//!
//! let result = QueryHelper::update_one(
//!     &accounts,
//!     &Filter::eq("accountHolder", "A"),
//!     &Update::inc("balance", 50),
//! )
//! .await?;
//! assert_eq!(result.modified_count, 1);
//! ```

use bson::{Bson, Document};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::{
    cursor::ResultCursor,
    driver::{DriverClient, DriverCollection, UpdateResult},
    error::{DocumentStoreError, DocumentStoreResult, DriverError, DriverErrorKind, Operation},
    filter::{FilterSpec, Query},
    handle::{CollectionHandle, CursorOf},
    pipeline::{self, Stage},
    update::UpdateSpec,
};

/// Ids assigned to inserted documents, in insertion order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InsertResult {
    pub inserted_ids: Vec<Bson>,
}

impl InsertResult {
    pub fn inserted_id(&self) -> Option<&Bson> {
        self.inserted_ids.first()
    }

    pub fn inserted_count(&self) -> usize {
        self.inserted_ids.len()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeleteResult {
    pub deleted_count: u64,
}

/// Explicit consent required by [`QueryHelper::delete_many`] before an always-true filter
/// may empty a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteGuard {
    /// The filter is expected to constrain the delete. Unconstrained filters are refused.
    Constrained,
    /// The caller deliberately deletes every document the filter matches, including all of them.
    ConfirmUnconstrained,
}

fn target(collection: &CollectionHandle<impl DriverClient>, detail: impl std::fmt::Display) -> String {
    format!("{} {}", collection.namespace(), detail)
}

pub struct QueryHelper;

impl QueryHelper {
    /// Inserts one document. Duplicate keys and validation failures surface as write errors.
    pub async fn insert_one<C: DriverClient>(
        collection: &CollectionHandle<C>,
        document: Document,
    ) -> DocumentStoreResult<InsertResult> {
        debug!(namespace = %collection.namespace(), "insert_one");

        let id = collection
            .resolve()?
            .insert_one(document)
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::InsertOne, collection.namespace(), e))?;

        Ok(InsertResult { inserted_ids: vec![id] })
    }

    /// Inserts documents in order. On failure, documents inserted before the failing one stay
    /// persisted; the error's [`DriverError::inserted`] reports how many.
    pub async fn insert_many<C: DriverClient>(
        collection: &CollectionHandle<C>,
        documents: Vec<Document>,
    ) -> DocumentStoreResult<InsertResult> {
        debug!(namespace = %collection.namespace(), count = documents.len(), "insert_many");

        if documents.is_empty() {
            return Ok(InsertResult::default());
        }

        let inserted_ids = collection
            .resolve()?
            .insert_many(documents)
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::InsertMany, collection.namespace(), e))?;

        Ok(InsertResult { inserted_ids })
    }

    /// Returns the first matching document in server order, or `None` when nothing matches.
    pub async fn find_first<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
    ) -> DocumentStoreResult<Option<Document>> {
        let query = Query { limit: Some(1), ..Query::filtered(filter) };

        Ok(Self::find_all_with(collection, &query).await?.into_iter().next())
    }

    /// Like [`find_first`](Self::find_first), deserializing the document into `T`.
    pub async fn find_first_as<C: DriverClient, T: DeserializeOwned>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
    ) -> DocumentStoreResult<Option<T>> {
        Self::find_first(collection, filter)
            .await?
            .map(|document| bson::deserialize_from_document(document).map_err(Into::into))
            .transpose()
    }

    /// Materializes every matching document. No implicit limit is applied.
    pub async fn find_all<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
    ) -> DocumentStoreResult<Vec<Document>> {
        Self::find_all_with(collection, &Query::filtered(filter)).await
    }

    pub async fn find_all_as<C: DriverClient, T: DeserializeOwned>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
    ) -> DocumentStoreResult<Vec<T>> {
        Self::find_all(collection, filter)
            .await?
            .into_iter()
            .map(|document| bson::deserialize_from_document(document).map_err(Into::into))
            .collect()
    }

    /// Materializes the documents selected by a full query (filter, sort, skip, limit).
    pub async fn find_all_with<C: DriverClient>(
        collection: &CollectionHandle<C>,
        query: &Query,
    ) -> DocumentStoreResult<Vec<Document>> {
        Self::find_iterator_with(collection, query).await?.drain().await
    }

    /// Opens a cursor over the matching documents. The caller must close it.
    pub async fn find_iterator<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
    ) -> DocumentStoreResult<ResultCursor<CursorOf<C>>> {
        Self::find_iterator_with(collection, &Query::filtered(filter)).await
    }

    pub async fn find_iterator_with<C: DriverClient>(
        collection: &CollectionHandle<C>,
        query: &Query,
    ) -> DocumentStoreResult<ResultCursor<CursorOf<C>>> {
        let target = target(collection, query);
        debug!(query = %target, "find");

        let cursor = collection
            .resolve()?
            .find(query)
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::Find, target.as_str(), e))?;

        Ok(ResultCursor::new(cursor, target))
    }

    /// Visits every matching document, closing the cursor on every exit path. Stops at the
    /// first error returned by `visit`. Returns the number of documents visited.
    pub async fn for_each<C, F>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
        mut visit: F,
    ) -> DocumentStoreResult<usize>
    where
        C: DriverClient,
        F: FnMut(Document) -> DocumentStoreResult<()>,
    {
        let mut cursor = Self::find_iterator(collection, filter).await?;
        let mut visited = 0;

        let outcome = loop {
            match cursor.next().await {
                Ok(Some(document)) => {
                    if let Err(e) = visit(document) {
                        break Err(e);
                    }
                    visited += 1;
                }
                Ok(None) => break Ok(visited),
                Err(e) => break Err(e),
            }
        };

        let closed = cursor.close().await;
        let visited = outcome?;
        closed?;

        Ok(visited)
    }

    pub async fn count_documents<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
    ) -> DocumentStoreResult<u64> {
        collection
            .resolve()?
            .count_documents(filter)
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::CountDocuments, target(collection, filter), e))
    }

    /// Applies `update` to the first matching document. Matching nothing is not an error.
    pub async fn update_one<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
        update: &UpdateSpec,
    ) -> DocumentStoreResult<UpdateResult> {
        Self::update(collection, filter, update, Operation::UpdateOne).await
    }

    pub async fn update_many<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
        update: &UpdateSpec,
    ) -> DocumentStoreResult<UpdateResult> {
        Self::update(collection, filter, update, Operation::UpdateMany).await
    }

    async fn update<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
        update: &UpdateSpec,
        operation: Operation,
    ) -> DocumentStoreResult<UpdateResult> {
        let target = target(collection, format!("{filter} {update}"));
        debug!(query = %target, %operation, "update");

        if update.is_empty() {
            return Err(DocumentStoreError::from_driver(
                operation,
                target,
                DriverError::new(DriverErrorKind::Validation, "update has no operations"),
            ));
        }

        let resolved = collection.resolve()?;
        let result = match operation {
            Operation::UpdateMany => resolved.update_many(filter, update).await,
            _ => resolved.update_one(filter, update).await,
        };

        result.map_err(|e| DocumentStoreError::from_driver(operation, target, e))
    }

    pub async fn delete_one<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
    ) -> DocumentStoreResult<DeleteResult> {
        debug!(query = %target(collection, filter), "delete_one");

        let deleted_count = collection
            .resolve()?
            .delete_one(filter)
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::DeleteOne, target(collection, filter), e))?;

        Ok(DeleteResult { deleted_count })
    }

    /// Deletes every matching document.
    ///
    /// An unconstrained filter (see [`FilterSpec::is_unconstrained`]) empties the collection
    /// and is refused with [`DocumentStoreError::UnconstrainedDelete`] unless `guard` is
    /// [`DeleteGuard::ConfirmUnconstrained`].
    pub async fn delete_many<C: DriverClient>(
        collection: &CollectionHandle<C>,
        filter: &FilterSpec,
        guard: DeleteGuard,
    ) -> DocumentStoreResult<DeleteResult> {
        if filter.is_unconstrained() && guard != DeleteGuard::ConfirmUnconstrained {
            return Err(DocumentStoreError::UnconstrainedDelete(collection.namespace()));
        }

        debug!(query = %target(collection, filter), ?guard, "delete_many");

        let deleted_count = collection
            .resolve()?
            .delete_many(filter)
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::DeleteMany, target(collection, filter), e))?;

        Ok(DeleteResult { deleted_count })
    }

    /// Runs an aggregation pipeline and returns a cursor over its output. The caller must close it.
    pub async fn aggregate<C: DriverClient>(
        collection: &CollectionHandle<C>,
        stages: &[Stage],
    ) -> DocumentStoreResult<ResultCursor<CursorOf<C>>> {
        let target = target(collection, pipeline::describe(stages));
        debug!(pipeline = %target, "aggregate");

        let cursor = collection
            .resolve()?
            .aggregate(stages)
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::Aggregate, target.as_str(), e))?;

        Ok(ResultCursor::new(cursor, target))
    }

    /// Runs an aggregation pipeline and materializes its output.
    pub async fn aggregate_all<C: DriverClient>(
        collection: &CollectionHandle<C>,
        stages: &[Stage],
    ) -> DocumentStoreResult<Vec<Document>> {
        Self::aggregate(collection, stages).await?.drain().await
    }
}
