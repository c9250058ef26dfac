//! `GET /identifiers?scheme=<scheme>&value=<value>`
//! `GET /identifiers/citations?scheme=<scheme>&value=<value>[&type=<name>]`
//!
//! Read-only: an unknown identifier is a 404, never a new group. Identifiers
//! travel in the query string because DOIs contain `/`.

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use citegraph_broker::{Broker, IdentifierOwner};
use citegraph_core::{
  identifier::Identifier, index::IndexSink, projection::Citation, store::GraphStore,
};
use serde::Deserialize;

use crate::error::ApiError;

#[derive(Debug, Deserialize)]
pub struct LookupParams {
  pub scheme: String,
  pub value:  String,
}

#[derive(Debug, Deserialize)]
pub struct CitationParams {
  pub scheme:      String,
  pub value:       String,
  /// Keep only citing groups whose metadata `Type` names this type.
  #[serde(rename = "type")]
  pub target_type: Option<String>,
}

fn parse_identifier(scheme: &str, value: &str) -> Result<Identifier, ApiError> {
  let identifier = Identifier::new(scheme, value);
  if identifier.scheme.is_empty() || identifier.value.is_empty() {
    return Err(ApiError::BadRequest("scheme and value must not be empty".into()));
  }
  Ok(identifier)
}

pub async fn lookup<S, I>(
  State(broker): State<Arc<Broker<S, I>>>,
  Query(params): Query<LookupParams>,
) -> Result<Json<IdentifierOwner>, ApiError>
where
  S: GraphStore,
  I: IndexSink,
{
  Ok(Json(broker.lookup(parse_identifier(&params.scheme, &params.value)?).await?))
}

pub async fn citations<S, I>(
  State(broker): State<Arc<Broker<S, I>>>,
  Query(params): Query<CitationParams>,
) -> Result<Json<Vec<Citation>>, ApiError>
where
  S: GraphStore,
  I: IndexSink,
{
  let identifier = parse_identifier(&params.scheme, &params.value)?;
  let target_type = params.target_type.as_deref().filter(|t| !t.is_empty());
  Ok(Json(broker.citations(identifier, target_type).await?))
}
