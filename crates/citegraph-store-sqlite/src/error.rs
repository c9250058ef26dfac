//! Error type for `citegraph-store-sqlite`.

use citegraph_core::{Classify, ErrorKind};
use rusqlite::ErrorCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] citegraph_core::Error),

  #[error("database error: {0}")]
  Database(#[from] tokio_rusqlite::Error),

  #[error("sqlite error: {0}")]
  Sqlite(#[from] rusqlite::Error),

  #[error("json error: {0}")]
  Json(#[from] serde_json::Error),

  #[error("uuid parse error: {0}")]
  Uuid(#[from] uuid::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),

  /// A stored value that no longer decodes into a domain type.
  #[error("decode error: {0}")]
  Decode(String),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

impl Classify for Error {
  fn kind(&self) -> ErrorKind {
    match self {
      Self::Core(e) => e.kind(),
      Self::Sqlite(e) => classify_sqlite(e),
      Self::Database(tokio_rusqlite::Error::Rusqlite(e)) => classify_sqlite(e),
      Self::Database(_) => ErrorKind::StorageUnavailable,
      Self::Json(_) | Self::Uuid(_) | Self::DateParse(_) | Self::Decode(_) => {
        ErrorKind::Internal
      }
    }
  }
}

/// Constraint violations mean the engine wrote something inconsistent; every
/// other database failure is treated as transient.
fn classify_sqlite(e: &rusqlite::Error) -> ErrorKind {
  match e.sqlite_error_code() {
    Some(ErrorCode::ConstraintViolation) => ErrorKind::Internal,
    _ => ErrorKind::StorageUnavailable,
  }
}
