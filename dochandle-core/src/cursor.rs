//! Scoped cursors over query results.
//!
//! A [`ResultCursor`] is forward-only and single-pass. Exactly one holder owns it and is
//! expected to call [`ResultCursor::close`] on every exit path; closing twice is a no-op.
//! Dropping an unclosed cursor logs a warning, and drivers that track resources record
//! it as abandoned. Prefer [`QueryHelper::for_each`](crate::helper::QueryHelper::for_each)
//! or the materializing helpers when the whole result is consumed in one place.

use bson::Document;
use tracing::warn;

use crate::{
    driver::DriverCursor,
    error::{DocumentStoreError, DocumentStoreResult, Operation},
};

#[derive(Debug)]
pub struct ResultCursor<K: DriverCursor> {
    inner: K,
    target: String,
    closed: bool,
}

impl<K: DriverCursor> ResultCursor<K> {
    pub(crate) fn new(inner: K, target: String) -> Self {
        Self { inner, target, closed: false }
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Returns the next document, or `None` once the cursor is exhausted or closed.
    pub async fn next(&mut self) -> DocumentStoreResult<Option<Document>> {
        if self.closed {
            return Ok(None);
        }

        self.inner
            .next_document()
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::CursorNext, self.target.as_str(), e))
    }

    /// Reads every remaining document. The cursor stays open; close it afterwards.
    pub async fn collect_remaining(&mut self) -> DocumentStoreResult<Vec<Document>> {
        let mut documents = Vec::new();

        while let Some(document) = self.next().await? {
            documents.push(document);
        }

        Ok(documents)
    }

    /// Reads every remaining document and closes the cursor, whether or not reading failed.
    pub async fn drain(mut self) -> DocumentStoreResult<Vec<Document>> {
        let documents = self.collect_remaining().await;
        let closed = self.close().await;

        let documents = documents?;
        closed?;

        Ok(documents)
    }

    /// Releases the cursor. Safe to call more than once.
    pub async fn close(&mut self) -> DocumentStoreResult<()> {
        if self.closed {
            return Ok(());
        }
        self.closed = true;

        self.inner
            .close()
            .await
            .map_err(|e| DocumentStoreError::from_driver(Operation::CursorClose, self.target.as_str(), e))
    }
}

impl<K: DriverCursor> Drop for ResultCursor<K> {
    fn drop(&mut self) {
        if !self.closed {
            warn!(target_query = %self.target, "cursor dropped without being closed");
        }
    }
}
