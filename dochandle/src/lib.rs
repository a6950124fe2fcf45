//! Managed access to a document database: one shared client per process, plus thin helpers
//! for the common find / insert / update / delete / aggregate calls.
//!
//! This crate is the entry point of dochandle. It re-exports the core types and the
//! available drivers.
//!
//! # Quick Start
//!
//! ```ignore
//! use dochandle::{prelude::*, memory::InMemoryDriver};
//!
//! #[tokio::main]
//! async fn main() -> DocumentStoreResult<()> {
//!     let registry = ClientRegistry::new(InMemoryDriver::new(), ConnectionConfig::from_env()?);
//!
//!     // Creating a database is lazy: it appears once a collection is created.
//!     let database = registry.create_database("sample_restaurants").await?;
//!     database.create_collection("inspections").await?;
//!     let inspections = registry.get_collection(&database, "inspections");
//!
//!     QueryHelper::insert_one(
//!         &inspections,
//!         DocumentBuilder::inspection("10021-2015-ENFO", "no violation"),
//!     )
//!     .await?;
//!
//!     let clean = QueryHelper::find_all(&inspections, &Filter::eq("result", "no violation")).await?;
//!     println!("{} clean inspection(s)", clean.len());
//!
//!     registry.shutdown().await
//! }
//! ```
//!
//! # Drivers
//!
//! - [`memory`] - In-memory driver for tests and examples
//! - [`mongodb`] - MongoDB driver (requires the `mongodb` feature)

pub mod prelude;

pub use dochandle_core::{builder, config, cursor, driver, error, filter, handle, helper, pipeline, registry, update};

// Re-export BSON types for convenience
pub use bson;

/// In-memory driver implementations.
pub mod memory {
    pub use dochandle_memory::{
        InMemoryClient, InMemoryCollection, InMemoryCursor, InMemoryDatabase, InMemoryDriver, InMemoryDriverBuilder,
        ResourceTracker,
    };
}

/// MongoDB driver implementations.
///
/// This module is only available when the `mongodb` feature is enabled.
#[cfg(feature = "mongodb")]
pub mod mongodb {
    pub use dochandle_mongodb::{MongoClient, MongoDbCollection, MongoDbCursor, MongoDbDatabase, MongoDriver};
}
