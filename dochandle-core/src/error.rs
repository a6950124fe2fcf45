//! Error types and result types for registry and query operations.
//!
//! Failures raised at the driver boundary are [`DriverError`]s. The query helper wraps
//! them into [`DocumentStoreError::Read`] or [`DocumentStoreError::Write`], tagged with the
//! originating [`Operation`] and a rendering of the filter or update that triggered them.
//! Use [`DocumentStoreResult<T>`] as the return type for fallible operations.

use std::fmt;

use bson::error::Error as BsonError;
use serde_json::Error as SerdeJsonError;
use thiserror::Error;

/// Whether an operation reads from or writes to the database.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationKind {
    Read,
    Write,
}

/// Every operation the query helper and the handles can issue against a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    InsertOne,
    InsertMany,
    Find,
    CountDocuments,
    UpdateOne,
    UpdateMany,
    DeleteOne,
    DeleteMany,
    Aggregate,
    CursorNext,
    CursorClose,
    CreateCollection,
    ListCollections,
    ListDatabases,
    DropCollection,
    DropDatabase,
}

impl Operation {
    /// Returns the kind of this operation, so callers can pick a retry policy per kind.
    pub fn kind(&self) -> OperationKind {
        match self {
            Operation::Find
            | Operation::CountDocuments
            | Operation::Aggregate
            | Operation::CursorNext
            | Operation::CursorClose
            | Operation::ListCollections
            | Operation::ListDatabases => OperationKind::Read,
            Operation::InsertOne
            | Operation::InsertMany
            | Operation::UpdateOne
            | Operation::UpdateMany
            | Operation::DeleteOne
            | Operation::DeleteMany
            | Operation::CreateCollection
            | Operation::DropCollection
            | Operation::DropDatabase => OperationKind::Write,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Operation::InsertOne => "insert_one",
            Operation::InsertMany => "insert_many",
            Operation::Find => "find",
            Operation::CountDocuments => "count_documents",
            Operation::UpdateOne => "update_one",
            Operation::UpdateMany => "update_many",
            Operation::DeleteOne => "delete_one",
            Operation::DeleteMany => "delete_many",
            Operation::Aggregate => "aggregate",
            Operation::CursorNext => "cursor_next",
            Operation::CursorClose => "cursor_close",
            Operation::CreateCollection => "create_collection",
            Operation::ListCollections => "list_collections",
            Operation::ListDatabases => "list_databases",
            Operation::DropCollection => "drop_collection",
            Operation::DropDatabase => "drop_database",
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Classification of a failure reported by a driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverErrorKind {
    /// The connection or handshake could not be established.
    Connection,
    /// A write violated a unique index.
    DuplicateKey,
    /// A document or update was rejected by validation rules.
    Validation,
    /// The requested write concern could not be satisfied.
    WriteConcern,
    /// A cursor was used after it had been closed.
    CursorClosed,
    /// A transient network failure.
    Network,
    Other,
}

/// An error raised by a driver implementation.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{kind:?}: {message}")]
pub struct DriverError {
    pub kind: DriverErrorKind,
    pub message: String,
    /// For ordered bulk inserts, the number of documents persisted before the failure.
    pub inserted: Option<usize>,
}

impl DriverError {
    pub fn new(kind: DriverErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), inserted: None }
    }

    pub fn with_inserted(mut self, inserted: usize) -> Self {
        self.inserted = Some(inserted);
        self
    }
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Represents all possible errors surfaced by the registry and the query helper.
#[derive(Error, Debug)]
pub enum DocumentStoreError {
    /// The initial connection or handshake failed. The registry stays uninitialized.
    #[error("Connection error: {0}")]
    Connection(String),
    /// The registry (or the client behind a handle) has been shut down.
    #[error("Registry is closed")]
    RegistryClosed,
    /// An insert, update or delete was rejected.
    #[error("Write error during {operation} on {target}: {source}")]
    Write {
        operation: Operation,
        target: String,
        #[source]
        source: DriverError,
    },
    /// A query or cursor read failed.
    #[error("Read error during {operation} on {target}: {source}")]
    Read {
        operation: Operation,
        target: String,
        #[source]
        source: DriverError,
    },
    /// A delete with an always-true filter was attempted without explicit confirmation.
    #[error("Refusing unconstrained delete on collection {0} without confirmation")]
    UnconstrainedDelete(String),
    /// Cursors were left open or dropped without being closed.
    #[error("Resource leak: {open} open and {leaked} abandoned cursor(s)")]
    ResourceLeak { open: usize, leaked: usize },
    /// Serialization/deserialization error when converting between document formats (BSON, JSON).
    #[error("Serialization error: {0}")]
    Serialization(String),
    /// Connection parameters could not be parsed or are incomplete.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl DocumentStoreError {
    /// Wraps a driver failure, tagging it as a read or write based on the operation.
    pub fn from_driver(operation: Operation, target: impl Into<String>, source: DriverError) -> Self {
        let target = target.into();

        match operation.kind() {
            OperationKind::Read => DocumentStoreError::Read { operation, target, source },
            OperationKind::Write => DocumentStoreError::Write { operation, target, source },
        }
    }

    /// The operation that failed, if the failure came from the driver boundary.
    pub fn operation(&self) -> Option<Operation> {
        match self {
            DocumentStoreError::Read { operation, .. } | DocumentStoreError::Write { operation, .. } => {
                Some(*operation)
            }
            _ => None,
        }
    }

    /// Whether the failure looks transient. Nothing in this crate retries; callers decide.
    pub fn is_retryable(&self) -> bool {
        match self {
            DocumentStoreError::Connection(_) => true,
            DocumentStoreError::Read { source, .. } | DocumentStoreError::Write { source, .. } => {
                matches!(source.kind, DriverErrorKind::Network | DriverErrorKind::WriteConcern)
            }
            _ => false,
        }
    }
}

/// A specialized `Result` type for registry and query operations.
pub type DocumentStoreResult<T> = Result<T, DocumentStoreError>;

impl From<BsonError> for DocumentStoreError {
    fn from(err: BsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

impl From<SerdeJsonError> for DocumentStoreError {
    fn from(err: SerdeJsonError) -> Self {
        DocumentStoreError::Serialization(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn driver_failures_are_tagged_by_operation_kind() {
        let err = DocumentStoreError::from_driver(
            Operation::InsertOne,
            "bank.accounts",
            DriverError::new(DriverErrorKind::DuplicateKey, "E11000"),
        );
        assert!(matches!(err, DocumentStoreError::Write { operation: Operation::InsertOne, .. }));
        assert_eq!(err.operation(), Some(Operation::InsertOne));

        let err = DocumentStoreError::from_driver(
            Operation::Find,
            "{}",
            DriverError::new(DriverErrorKind::Other, "bad query"),
        );
        assert!(matches!(err, DocumentStoreError::Read { .. }));
    }

    #[test]
    fn only_transient_failures_are_retryable() {
        let network = DocumentStoreError::from_driver(
            Operation::Find,
            "{}",
            DriverError::new(DriverErrorKind::Network, "reset"),
        );
        let dup = DocumentStoreError::from_driver(
            Operation::InsertOne,
            "{}",
            DriverError::new(DriverErrorKind::DuplicateKey, "dup"),
        );
        assert!(network.is_retryable());
        assert!(!dup.is_retryable());
        assert!(!DocumentStoreError::RegistryClosed.is_retryable());
    }

    #[test]
    fn error_message_names_operation_and_target() {
        let err = DocumentStoreError::from_driver(
            Operation::UpdateOne,
            "accounts",
            DriverError::new(DriverErrorKind::Validation, "balance must be numeric"),
        );
        let message = err.to_string();
        assert!(message.contains("update_one"));
        assert!(message.contains("accounts"));
        assert!(message.contains("balance must be numeric"));
    }
}
