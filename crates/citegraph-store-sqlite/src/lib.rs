//! SQLite backend for the citegraph store.
//!
//! Wraps [`tokio_rusqlite`] so all database access runs on a dedicated thread
//! without blocking the async runtime. The merge engine from
//! `citegraph-core` runs inside that thread, one transaction per claim.

mod encode;
mod schema;
mod store;
mod txn;

pub mod error;

pub use error::{Error, Result};
pub use store::SqliteStore;
