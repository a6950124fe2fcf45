//! Convenient re-exports of commonly used types from dochandle.
//!
//! ```ignore
//! use dochandle::prelude::*;
//! ```

pub use bson::{Bson, Document, doc, oid::ObjectId};

pub use dochandle_core::{
    builder::DocumentBuilder,
    config::{ConnectionConfig, ConnectionConfigBuilder, ServerApiVersion, ShutdownPolicy, WriteConcern},
    cursor::ResultCursor,
    driver::{Driver, DriverClient, DriverCollection, DriverCursor, DriverDatabase, UpdateResult},
    error::{DocumentStoreError, DocumentStoreResult, DriverError, DriverErrorKind, Operation, OperationKind},
    filter::{FieldOp, Filter, FilterSpec, FilterVisitor, Query, QueryBuilder, Sort, SortDirection},
    handle::{ClientHandle, CollectionHandle, DatabaseHandle},
    helper::{DeleteGuard, DeleteResult, InsertResult, QueryHelper},
    pipeline::{Accumulator, Stage},
    registry::ClientRegistry,
    update::{Update, UpdateOp, UpdateSpec},
};
