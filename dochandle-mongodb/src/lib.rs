//! MongoDB driver for dochandle.
//!
//! Adapts the official `mongodb` client to the dochandle driver boundary. Filters, updates
//! and pipelines are translated into MongoDB operator documents and driver failures are
//! classified into [`DriverErrorKind`](dochandle_core::error::DriverErrorKind)s.
//!
//! Enable it through the facade's `mongodb` feature:
//!
//! ```toml
//! [dependencies]
//! dochandle = { version = "x.y.z", features = ["mongodb"] }
//! ```
//!
//! # Connection
//!
//! [`MongoDriver::connect`](dochandle_core::driver::Driver::connect) applies the server API
//! version, retryable writes, write concern and application name from the
//! [`ConnectionConfig`](dochandle_core::config::ConnectionConfig), then pings the deployment
//! so that unreachable hosts and bad credentials fail at connect time.

#[allow(unused_extern_crates)]
extern crate self as dochandle_mongodb;

mod command;
mod error;
mod query;
pub mod store;

pub use store::{MongoClient, MongoDbCollection, MongoDbCursor, MongoDbDatabase, MongoDriver};
