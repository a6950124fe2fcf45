//! A managed, process-wide document database client with thin query helpers.
//!
//! This crate is the core of the dochandle project and provides:
//!
//! - **Configuration** ([`config`]) - Immutable connection parameters
//! - **Driver boundary** ([`driver`]) - Traits any database client library is adapted to
//! - **Client registry** ([`registry`]) - One lazily created, shared client with safe shutdown
//! - **Handles** ([`handle`]) - Client handles and the database/collection views derived from them
//! - **Filters, updates and pipelines** ([`filter`], [`update`], [`pipeline`]) - Declarative, immutable specs
//! - **Query helper** ([`helper`]) - Find, insert, update, delete and aggregate over a collection handle
//! - **Cursors** ([`cursor`]) - Scoped, single-pass result cursors
//! - **Document builder** ([`builder`]) - Fluent document assembly
//! - **Error handling** ([`error`]) - Error taxonomy and result types
//!
//! # Example
//!
//! ```ignore
//! use dochandle::{prelude::*, memory::InMemoryDriver};
//!
//! let registry = ClientRegistry::new(
//!     InMemoryDriver::new(),
//!     ConnectionConfig::from_uri("mongodb://localhost:27017")?,
//! );
//!
//! let database = registry.get_database("bank").await?;
//! let accounts = registry.get_collection(&database, "accounts");
//!
//! QueryHelper::insert_one(&accounts, doc! { "accountHolder": "A", "balance": 100 }).await?;
//! let account = QueryHelper::find_first(&accounts, &Filter::eq("accountHolder", "A")).await?;
//!
//! registry.shutdown().await?;
//! ```

#[allow(unused_extern_crates)]
extern crate self as dochandle_core;

pub mod builder;
pub mod config;
pub mod cursor;
pub mod driver;
pub mod error;
pub mod filter;
pub mod handle;
pub mod helper;
pub mod pipeline;
pub mod registry;
pub mod update;
