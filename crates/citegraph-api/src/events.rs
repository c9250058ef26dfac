//! Intake endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `POST` | `/events` | Body: [`Event`]; returns 202 + [`EventOutcome`](citegraph_broker::EventOutcome) |
//! | `POST` | `/reindex` | Re-projects every group; returns `{"upserted": n}` |

use std::sync::Arc;

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use citegraph_broker::{Broker, Event};
use citegraph_core::{index::IndexSink, store::GraphStore};
use serde_json::json;
use tracing::debug;

use crate::error::ApiError;

/// `POST /events`
pub async fn submit<S, I>(
  State(broker): State<Arc<Broker<S, I>>>,
  Json(event): Json<Event>,
) -> Result<impl IntoResponse, ApiError>
where
  S: GraphStore,
  I: IndexSink,
{
  debug!(event = %event.id, links = event.payload.len(), "event received");
  let outcome = broker.submit_event(event).await?;
  Ok((StatusCode::ACCEPTED, Json(outcome)))
}

/// `POST /reindex`
pub async fn reindex<S, I>(
  State(broker): State<Arc<Broker<S, I>>>,
) -> Result<Json<serde_json::Value>, ApiError>
where
  S: GraphStore,
  I: IndexSink,
{
  let upserted = broker.reindex_all().await?;
  Ok(Json(json!({ "upserted": upserted })))
}
