//! Runtime configuration, layered from an optional TOML file and
//! `CITEGRAPH_*` environment variables.
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 8080
//! store_path = "~/.local/share/citegraph/graph.db"
//! claim_timeout_ms = 10000
//!
//! [sync]
//! max_attempts = 5
//!
//! [index]
//! kind = "bulk_file"
//! path = "/var/spool/citegraph/bulk.ndjson"
//! index_name = "groups"
//!
//! [[vocabulary]]
//! relation = "Cites"
//! label = "cites"
//! inverse = "isCitedBy"
//! ```
//!
//! Nested keys are set from the environment with `__`, e.g.
//! `CITEGRAPH_SYNC__MAX_ATTEMPTS=5`.

use std::{
  path::{Path, PathBuf},
  time::Duration,
};

use anyhow::Context as _;
use citegraph_broker::{BrokerSettings, BulkFileIndex, MemoryIndex, SyncPolicy};
use citegraph_core::relation::{Relation, RelationVocabulary};
use serde::Deserialize;

use crate::index::AnyIndex;

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
  pub host:              String,
  pub port:              u16,
  pub store_path:        PathBuf,
  /// How long SQLite waits on a lock held by another connection.
  pub busy_timeout_ms:   u64,
  /// Per-claim deadline; `0` disables it.
  pub claim_timeout_ms:  u64,
  pub max_payload_links: usize,
  pub sync:              SyncPolicy,
  pub index:             IndexConfig,
  /// Replaces the default relation vocabulary when non-empty.
  pub vocabulary:        Vec<VocabularyEntry>,
}

impl Default for ServerConfig {
  fn default() -> Self {
    let broker = BrokerSettings::default();
    Self {
      host:              "127.0.0.1".to_string(),
      port:              8080,
      store_path:        PathBuf::from("citegraph.db"),
      busy_timeout_ms:   5_000,
      claim_timeout_ms:  broker.claim_timeout.map_or(0, millis),
      max_payload_links: broker.max_payload_links,
      sync:              broker.sync,
      index:             IndexConfig::default(),
      vocabulary:        Vec::new(),
    }
  }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IndexConfig {
  /// Documents live in process and are lost on exit.
  #[default]
  Memory,
  /// Elasticsearch `_bulk` NDJSON appended to `path`.
  BulkFile {
    path:       PathBuf,
    #[serde(default = "default_index_name")]
    index_name: String,
  },
}

fn default_index_name() -> String { "citegraph".to_string() }

#[derive(Debug, Clone, Deserialize)]
pub struct VocabularyEntry {
  pub relation: Relation,
  pub label:    String,
  pub inverse:  String,
}

impl ServerConfig {
  /// Read `path` (if it exists) and the environment.
  pub fn load(path: &Path) -> anyhow::Result<Self> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("CITEGRAPH")
          .prefix_separator("_")
          .separator("__")
          .try_parsing(true),
      )
      .build()
      .context("failed to read config file")?
      .try_deserialize()
      .context("failed to deserialise ServerConfig")
  }

  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  pub fn busy_timeout(&self) -> Duration { Duration::from_millis(self.busy_timeout_ms) }

  pub fn vocabulary(&self) -> RelationVocabulary {
    if self.vocabulary.is_empty() {
      return RelationVocabulary::default();
    }
    RelationVocabulary::from_entries(
      self
        .vocabulary
        .iter()
        .map(|e| (e.relation, e.label.as_str(), e.inverse.as_str())),
    )
  }

  pub fn broker_settings(&self) -> BrokerSettings {
    BrokerSettings {
      vocabulary:        self.vocabulary(),
      claim_timeout:     (self.claim_timeout_ms > 0)
        .then(|| Duration::from_millis(self.claim_timeout_ms)),
      max_payload_links: self.max_payload_links,
      sync:              self.sync.clone(),
    }
  }

  pub fn build_index(&self) -> AnyIndex {
    match &self.index {
      IndexConfig::Memory => AnyIndex::Memory(MemoryIndex::new()),
      IndexConfig::BulkFile { path, index_name } => {
        AnyIndex::BulkFile(BulkFileIndex::new(expand_tilde(path), index_name.clone()))
      }
    }
  }
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

/// Whole milliseconds in `d`, saturating at `u64::MAX`.
fn millis(d: Duration) -> u64 { u64::try_from(d.as_millis()).unwrap_or(u64::MAX) }
