//! API error type and [`axum::response::IntoResponse`] implementation.

use axum::{
  Json,
  http::StatusCode,
  response::{IntoResponse, Response},
};
use citegraph_core::{Classify, ErrorKind};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// An error returned by an API handler.
#[derive(Debug, Error)]
pub enum ApiError {
  #[error("bad request: {0}")]
  BadRequest(String),

  #[error(transparent)]
  Broker(#[from] citegraph_broker::Error),
}

impl ApiError {
  pub fn status(&self) -> StatusCode {
    match self {
      ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
      ApiError::Broker(e) => match e.kind() {
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::Conflict => StatusCode::CONFLICT,
        ErrorKind::StorageUnavailable => StatusCode::SERVICE_UNAVAILABLE,
        ErrorKind::InvalidRelation => StatusCode::BAD_REQUEST,
        ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
        ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
      },
    }
  }
}

impl IntoResponse for ApiError {
  fn into_response(self) -> Response {
    let status = self.status();
    if status.is_server_error() {
      error!(%status, error = %self, "request failed");
    }
    (status, Json(json!({ "error": self.to_string() }))).into_response()
  }
}

#[cfg(test)]
mod tests {
  use std::time::Duration;

  use super::*;

  fn status_of(e: citegraph_core::Error) -> StatusCode {
    ApiError::from(citegraph_broker::Error::from(e)).status()
  }

  #[test]
  fn kinds_map_to_statuses() {
    let missing = citegraph_core::Error::NotFound { scheme: "doi".into(), value: "x".into() };
    assert_eq!(status_of(missing), StatusCode::NOT_FOUND);
    assert_eq!(
      status_of(citegraph_core::Error::Conflict { evidence_id: uuid::Uuid::nil() }),
      StatusCode::CONFLICT
    );
    assert_eq!(
      status_of(citegraph_core::Error::StorageUnavailable("locked".into())),
      StatusCode::SERVICE_UNAVAILABLE
    );
    assert_eq!(
      status_of(citegraph_core::Error::InvalidRelation("Likes".into())),
      StatusCode::BAD_REQUEST
    );
    assert_eq!(
      status_of(citegraph_core::Error::Timeout(Duration::from_secs(1))),
      StatusCode::GATEWAY_TIMEOUT
    );
    let invalid = citegraph_broker::Error::InvalidEvent("empty payload".into());
    assert_eq!(ApiError::from(invalid).status(), StatusCode::BAD_REQUEST);
  }
}
