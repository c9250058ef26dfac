//! [`IndexSink`] implementations.

use std::{
  collections::BTreeMap,
  convert::Infallible,
  path::{Path, PathBuf},
};

use citegraph_core::{
  group::GroupId,
  index::{ExternalOp, IndexSink},
};
use serde_json::{Value, json};
use tokio::{
  fs::OpenOptions,
  io::AsyncWriteExt as _,
  sync::{Mutex, RwLock},
};

// ─── In memory ───────────────────────────────────────────────────────────────

/// Documents held in process, keyed by group id.
#[derive(Debug, Default)]
pub struct MemoryIndex {
  docs: RwLock<BTreeMap<GroupId, Value>>,
}

impl MemoryIndex {
  pub fn new() -> Self { Self::default() }

  pub async fn get(&self, id: GroupId) -> Option<Value> {
    self.docs.read().await.get(&id).cloned()
  }

  pub async fn ids(&self) -> Vec<GroupId> { self.docs.read().await.keys().copied().collect() }

  pub async fn len(&self) -> usize { self.docs.read().await.len() }
}

impl IndexSink for MemoryIndex {
  type Error = Infallible;

  async fn apply(&self, ops: &[ExternalOp]) -> Result<(), Infallible> {
    let mut docs = self.docs.write().await;
    for op in ops {
      match op {
        ExternalOp::Upsert { id, body } => {
          docs.insert(*id, body.clone());
        }
        ExternalOp::Delete { id } => {
          docs.remove(id);
        }
      }
    }
    Ok(())
  }
}

// ─── Elasticsearch bulk file ─────────────────────────────────────────────────

/// Appends operations to a file in the Elasticsearch `_bulk` NDJSON format,
/// to be shipped to a cluster out of band.
#[derive(Debug)]
pub struct BulkFileIndex {
  path:       PathBuf,
  index_name: String,
  lock:       Mutex<()>,
}

impl BulkFileIndex {
  pub fn new(path: impl AsRef<Path>, index_name: impl Into<String>) -> Self {
    Self {
      path:       path.as_ref().to_path_buf(),
      index_name: index_name.into(),
      lock:       Mutex::new(()),
    }
  }

  pub fn path(&self) -> &Path { &self.path }

  fn render(&self, ops: &[ExternalOp]) -> String {
    let mut out = String::new();
    for op in ops {
      let id = op.id().to_string();
      match op {
        ExternalOp::Upsert { body, .. } => {
          out.push_str(&json!({"index": {"_index": self.index_name, "_id": id}}).to_string());
          out.push('\n');
          out.push_str(&body.to_string());
          out.push('\n');
        }
        ExternalOp::Delete { .. } => {
          out.push_str(&json!({"delete": {"_index": self.index_name, "_id": id}}).to_string());
          out.push('\n');
        }
      }
    }
    out
  }
}

impl IndexSink for BulkFileIndex {
  type Error = std::io::Error;

  async fn apply(&self, ops: &[ExternalOp]) -> std::io::Result<()> {
    if ops.is_empty() {
      return Ok(());
    }
    let batch = self.render(ops);
    let _guard = self.lock.lock().await;
    let mut file = OpenOptions::new().create(true).append(true).open(&self.path).await?;
    file.write_all(batch.as_bytes()).await?;
    file.flush().await
  }
}
