//! In-memory driver for dochandle.
//!
//! Implements the driver boundary without a database server, for tests and examples. Filters,
//! updates and pipelines are evaluated directly against stored BSON documents. A
//! [`ResourceTracker`] records every cursor so tests can assert none was leaked.

#[allow(unused_extern_crates)]
extern crate self as dochandle_memory;

mod aggregator;
mod evaluator;
mod path;
mod store;
mod tracker;
mod updater;

pub use store::{
    InMemoryClient, InMemoryCollection, InMemoryCursor, InMemoryDatabase, InMemoryDriver, InMemoryDriverBuilder,
};
pub use tracker::ResourceTracker;
