//! Error type for `citegraph-broker`.

use citegraph_core::{Classify, ErrorKind};
use thiserror::Error;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

#[derive(Debug, Error)]
pub enum Error {
  /// The event envelope was rejected before any claim was applied.
  #[error("invalid event: {0}")]
  InvalidEvent(String),

  #[error(transparent)]
  Core(#[from] citegraph_core::Error),

  #[error("store error: {source}")]
  Store {
    kind:   ErrorKind,
    #[source]
    source: BoxError,
  },

  /// The index sink rejected a batch.
  #[error("index error: {0}")]
  Index(#[source] BoxError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Error {
  /// Wrap a backend error, keeping its classification.
  pub fn store<E>(e: E) -> Self
  where
    E: std::error::Error + Classify + Send + Sync + 'static,
  {
    Self::Store { kind: e.kind(), source: Box::new(e) }
  }

  pub fn index<E>(e: E) -> Self
  where
    E: std::error::Error + Send + Sync + 'static,
  {
    Self::Index(Box::new(e))
  }
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      // Like an unknown relation, a malformed envelope never mutates state.
      Self::InvalidEvent(_) => ErrorKind::InvalidRelation,
      Self::Core(e) => e.kind(),
      Self::Store { kind, .. } => *kind,
      Self::Index(_) => ErrorKind::StorageUnavailable,
    }
  }
}
