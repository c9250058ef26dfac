//! Orchestration around the citegraph core.
//!
//! Converts intake events into claims, applies them through a
//! [`GraphStore`](citegraph_core::store::GraphStore), and keeps an
//! [`IndexSink`](citegraph_core::index::IndexSink) in step with retries and a
//! pending queue for operations that could not be delivered.

pub mod broker;
pub mod error;
pub mod event;
pub mod sink;

pub use broker::{Broker, BrokerSettings, EventOutcome, IdentifierOwner, SyncPolicy, SyncStatus};
pub use error::{Error, Result};
pub use event::Event;
pub use sink::{BulkFileIndex, MemoryIndex};

#[cfg(test)]
mod tests;
