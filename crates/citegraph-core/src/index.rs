//! The index synchronizer.
//!
//! Plans the upserts and deletes that bring an external denormalized index
//! in line with the graph after a [`ChangeReport`], and defines the
//! [`IndexSink`] seam those operations are applied through.

use std::{
  collections::{BTreeMap, BTreeSet},
  future::Future,
};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};

use crate::{
  group::{GroupId, GroupKind, GroupView},
  projection::project,
  relation::RelationVocabulary,
  report::ChangeReport,
  store::GraphStore,
};

// ─── Operations ──────────────────────────────────────────────────────────────

/// One idempotent write against the index, keyed by group id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "lowercase")]
pub enum ExternalOp {
  Upsert { id: GroupId, body: Value },
  Delete { id: GroupId },
}

impl ExternalOp {
  pub fn id(&self) -> GroupId {
    match self {
      Self::Upsert { id, .. } | Self::Delete { id } => *id,
    }
  }

  pub fn is_delete(&self) -> bool { matches!(self, Self::Delete { .. }) }
}

/// Where planned operations are applied. Implementations must treat every
/// operation as idempotent by id; a failed batch is retried whole.
pub trait IndexSink: Send + Sync {
  type Error: std::error::Error + Send + Sync + 'static;

  fn apply<'a>(
    &'a self,
    ops: &'a [ExternalOp],
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + 'a;
}

// ─── Documents ───────────────────────────────────────────────────────────────

/// Build the index document for one group: its metadata fields plus
/// `Identifier`, `Relationships` and, for version groups, `GroupType`.
pub fn build_document(view: &GroupView, vocab: &RelationVocabulary) -> Value {
  let mut doc: Map<String, Value> =
    view.canonical_metadata().map(|m| m.document.clone()).unwrap_or_default();

  let mut identifiers = view.identifiers.clone();
  identifiers.sort();
  doc.insert(
    "Identifier".into(),
    identifiers
      .iter()
      .map(|i| json!({ "ID": i.value, "IDScheme": i.scheme }))
      .collect(),
  );

  let summary = project(view.group.group_id, &view.relationships, vocab);
  doc.insert("Relationships".into(), json!(summary));

  if view.group.kind == GroupKind::Version {
    doc.insert("GroupType".into(), json!("Version"));
  }
  Value::Object(doc)
}

// ─── Planning ────────────────────────────────────────────────────────────────

/// Compute the operations that make the index reflect `report`.
///
/// Destroyed groups are deleted. Created and mutated groups, survivors of
/// merges, and every group with an edge to a survivor are re-projected and
/// upserted. A group that no longer exists when read is deleted instead.
/// Deletes come first, then upserts, each sorted by id.
pub async fn plan_sync<S: GraphStore>(
  store: &S,
  report: &ChangeReport,
  vocab: &RelationVocabulary,
) -> Result<Vec<ExternalOp>, S::Error> {
  let mut views: BTreeMap<GroupId, Option<GroupView>> = BTreeMap::new();
  let mut stale: BTreeSet<GroupId> =
    report.created.iter().chain(&report.mutated).copied().collect();

  for survivor in report.survivors() {
    let view = store.group_view(survivor).await?;
    if let Some(view) = &view {
      stale.extend(view.relationships.iter().filter_map(|r| r.other_end(survivor)));
    }
    stale.insert(survivor);
    views.insert(survivor, view);
  }

  let mut deletes: BTreeSet<GroupId> = report.destroyed.keys().copied().collect();
  let mut upserts = Vec::new();
  for id in stale {
    if report.destroyed.contains_key(&id) {
      continue;
    }
    let view = match views.remove(&id) {
      Some(view) => view,
      None => store.group_view(id).await?,
    };
    match view {
      Some(view) => upserts.push(ExternalOp::Upsert { id, body: build_document(&view, vocab) }),
      None => {
        deletes.insert(id);
      }
    }
  }

  Ok(deletes.into_iter().map(|id| ExternalOp::Delete { id }).chain(upserts).collect())
}

/// Upserts for the given groups, skipping any that no longer exist.
pub async fn plan_upserts<S: GraphStore>(
  store: &S,
  ids: &[GroupId],
  vocab: &RelationVocabulary,
) -> Result<Vec<ExternalOp>, S::Error> {
  let mut ops = Vec::with_capacity(ids.len());
  for &id in ids {
    if let Some(view) = store.group_view(id).await? {
      ops.push(ExternalOp::Upsert { id, body: build_document(&view, vocab) });
    }
  }
  Ok(ops)
}
