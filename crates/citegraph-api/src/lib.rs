//! JSON REST API for citegraph.
//!
//! Exposes an axum [`Router`] backed by a [`Broker`] over any
//! [`GraphStore`] and [`IndexSink`]. Auth, TLS, and transport concerns are
//! the caller's responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", citegraph_api::api_router(broker.clone()))
//! ```

pub mod error;
pub mod events;
pub mod groups;
pub mod identifiers;

use std::sync::Arc;

use axum::{
  Router,
  routing::{get, post},
};
use citegraph_broker::Broker;
use citegraph_core::{index::IndexSink, store::GraphStore};

pub use error::ApiError;

/// Build a fully-materialised API router for `broker`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, I>(broker: Arc<Broker<S, I>>) -> Router<()>
where
  S: GraphStore + 'static,
  I: IndexSink + 'static,
{
  Router::new()
    // Intake
    .route("/events", post(events::submit::<S, I>))
    .route("/reindex", post(events::reindex::<S, I>))
    // Reads
    .route("/identifiers", get(identifiers::lookup::<S, I>))
    .route("/identifiers/citations", get(identifiers::citations::<S, I>))
    .route("/groups", get(groups::list::<S, I>))
    .route("/groups/{id}", get(groups::get_one::<S, I>))
    .route("/groups/{id}/relationships", get(groups::relationships::<S, I>))
    .with_state(broker)
}
