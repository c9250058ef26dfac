//! Handlers for `/groups` endpoints.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/groups` | Optional `?kind=identity\|version`; returns sorted ids |
//! | `GET`  | `/groups/{id}` | [`GroupView`]; 404 if not found |
//! | `GET`  | `/groups/{id}/relationships` | Projected [`RelationshipSummary`] |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use citegraph_broker::Broker;
use citegraph_core::{
  group::{GroupId, GroupKind, GroupView},
  index::IndexSink,
  projection::RelationshipSummary,
  store::GraphStore,
};
use serde::Deserialize;

use crate::error::ApiError;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct ListParams {
  pub kind: Option<GroupKind>,
}

/// `GET /groups[?kind=<kind>]`
pub async fn list<S, I>(
  State(broker): State<Arc<Broker<S, I>>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<GroupId>>, ApiError>
where
  S: GraphStore,
  I: IndexSink,
{
  let ids = broker
    .store()
    .list_groups(params.kind)
    .await
    .map_err(citegraph_broker::Error::store)?;
  Ok(Json(ids))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /groups/{id}`
pub async fn get_one<S, I>(
  State(broker): State<Arc<Broker<S, I>>>,
  Path(id): Path<GroupId>,
) -> Result<Json<GroupView>, ApiError>
where
  S: GraphStore,
  I: IndexSink,
{
  Ok(Json(broker.group_view(id).await?))
}

/// `GET /groups/{id}/relationships`
pub async fn relationships<S, I>(
  State(broker): State<Arc<Broker<S, I>>>,
  Path(id): Path<GroupId>,
) -> Result<Json<RelationshipSummary>, ApiError>
where
  S: GraphStore,
  I: IndexSink,
{
  Ok(Json(broker.relationships(id).await?))
}
