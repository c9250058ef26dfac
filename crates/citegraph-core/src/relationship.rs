//! Group relationships and their provenance history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{
  Error, Result,
  group::{GroupId, GroupKind},
  relation::Relation,
};

// ─── Evidence ────────────────────────────────────────────────────────────────

/// Provenance of a single claim. Serialised with the field names used in
/// index documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct Evidence {
  /// Unique per original claim; re-delivered claims carry the same id.
  #[serde(rename = "EvidenceID")]
  pub evidence_id: Uuid,
  pub asserted_at: DateTime<Utc>,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub provider:    Option<String>,
  /// Free-form link metadata (`LinkProvider`, `LicenseURL`, ...).
  #[serde(flatten)]
  pub payload:     Map<String, Value>,
}

impl Evidence {
  pub fn new(evidence_id: Uuid, asserted_at: DateTime<Utc>) -> Self {
    Self { evidence_id, asserted_at, provider: None, payload: Map::new() }
  }
}

// ─── History ─────────────────────────────────────────────────────────────────

/// Evidence records of an edge, ordered by `(asserted_at, evidence_id)`, at
/// most one per evidence id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct History(Vec<Evidence>);

impl History {
  pub fn single(evidence: Evidence) -> Self { Self(vec![evidence]) }

  pub fn entries(&self) -> &[Evidence] { &self.0 }

  pub fn len(&self) -> usize { self.0.len() }

  pub fn is_empty(&self) -> bool { self.0.is_empty() }

  /// Record `evidence`. Returns `false` if an identical record is already
  /// present, and [`Error::Conflict`] if a different record with the same
  /// evidence id is.
  pub fn record(&mut self, evidence: Evidence) -> Result<bool> {
    if let Some(existing) = self.0.iter().find(|e| e.evidence_id == evidence.evidence_id) {
      return if *existing == evidence {
        Ok(false)
      } else {
        Err(Error::Conflict { evidence_id: evidence.evidence_id })
      };
    }
    let key = (evidence.asserted_at, evidence.evidence_id);
    let at = self.0.partition_point(|e| (e.asserted_at, e.evidence_id) < key);
    self.0.insert(at, evidence);
    Ok(true)
  }

  /// Union of two histories by evidence id.
  pub fn union(mut self, other: History) -> Result<History> {
    for evidence in other.0 {
      self.record(evidence)?;
    }
    Ok(self)
  }
}

// ─── GroupRelationship ───────────────────────────────────────────────────────

/// The uniqueness key of a relationship: at most one edge exists per key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RelationshipKey {
  pub kind:      GroupKind,
  pub relation:  Relation,
  pub source_id: GroupId,
  pub target_id: GroupId,
}

/// A directed edge between two groups of the same kind.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupRelationship {
  pub relationship_id: Uuid,
  pub kind:            GroupKind,
  pub relation:        Relation,
  pub source_id:       GroupId,
  pub target_id:       GroupId,
  pub history:         History,
}

impl GroupRelationship {
  pub fn new(key: RelationshipKey, history: History) -> Self {
    Self {
      relationship_id: Uuid::new_v4(),
      kind: key.kind,
      relation: key.relation,
      source_id: key.source_id,
      target_id: key.target_id,
      history,
    }
  }

  pub fn key(&self) -> RelationshipKey {
    RelationshipKey {
      kind:      self.kind,
      relation:  self.relation,
      source_id: self.source_id,
      target_id: self.target_id,
    }
  }

  /// The endpoint opposite `group`, or `None` if `group` is not an endpoint.
  pub fn other_end(&self, group: GroupId) -> Option<GroupId> {
    if self.source_id == group {
      Some(self.target_id)
    } else if self.target_id == group {
      Some(self.source_id)
    } else {
      None
    }
  }

  /// Endpoints after replacing `from` with `to`.
  pub fn repointed(&self, from: GroupId, to: GroupId) -> (GroupId, GroupId) {
    let swap = |id: GroupId| if id == from { to } else { id };
    (swap(self.source_id), swap(self.target_id))
  }
}
