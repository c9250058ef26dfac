//! Error types for `citegraph-core`.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

use crate::group::{GroupId, GroupKind};

#[derive(Debug, Error)]
pub enum Error {
  #[error("identifier not found: {scheme}:{value}")]
  NotFound { scheme: String, value: String },

  #[error("group not found: {0}")]
  GroupNotFound(GroupId),

  /// Two histories carry the same evidence id with different content.
  #[error("evidence {evidence_id} conflicts with an existing history entry")]
  Conflict { evidence_id: Uuid },

  #[error("invalid relation: {0:?}")]
  InvalidRelation(String),

  #[error("storage unavailable: {0}")]
  StorageUnavailable(String),

  #[error("claim timed out after {0:?}")]
  Timeout(Duration),

  #[error("group {group} is a {actual} group, expected {expected}")]
  KindMismatch {
    group:    GroupId,
    expected: GroupKind,
    actual:   GroupKind,
  },

  #[error("serialization error: {0}")]
  Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

// ─── Classification ──────────────────────────────────────────────────────────

/// The coarse error taxonomy callers branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
  NotFound,
  Conflict,
  StorageUnavailable,
  InvalidRelation,
  Timeout,
  /// A broken invariant or an undecodable stored value.
  Internal,
}

impl ErrorKind {
  /// Whether the caller may retry the same call with backoff.
  pub fn is_retriable(self) -> bool {
    matches!(self, Self::StorageUnavailable | Self::Timeout)
  }
}

/// Maps a backend-specific error onto [`ErrorKind`].
pub trait Classify {
  fn kind(&self) -> ErrorKind;
}

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::NotFound { .. } | Self::GroupNotFound(_) => ErrorKind::NotFound,
      Self::Conflict { .. } => ErrorKind::Conflict,
      Self::InvalidRelation(_) => ErrorKind::InvalidRelation,
      Self::StorageUnavailable(_) => ErrorKind::StorageUnavailable,
      Self::Timeout(_) => ErrorKind::Timeout,
      Self::KindMismatch { .. } | Self::Serialization(_) => ErrorKind::Internal,
    }
  }
}
