//! The index sink selected by configuration.

use citegraph_broker::{BulkFileIndex, MemoryIndex};
use citegraph_core::index::{ExternalOp, IndexSink};

pub enum AnyIndex {
  Memory(MemoryIndex),
  BulkFile(BulkFileIndex),
}

impl IndexSink for AnyIndex {
  type Error = std::io::Error;

  async fn apply(&self, ops: &[ExternalOp]) -> std::io::Result<()> {
    match self {
      AnyIndex::Memory(index) => index.apply(ops).await.map_err(|never| match never {}),
      AnyIndex::BulkFile(index) => index.apply(ops).await,
    }
  }
}
