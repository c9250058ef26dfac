//! The relation vocabulary.
//!
//! [`Relation`] is the fixed set of semantic kinds a claim can assert.
//! [`RelationVocabulary`] maps each edge-forming kind to the labels used when
//! an edge is read from its source (outward) or its target (inward). The
//! vocabulary is configuration handed to the core, not owned by it.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Error, Result, group::GroupKind};

// ─── Relation ────────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  PartialOrd,
  Ord,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
pub enum Relation {
  Cites,
  IsSupplementTo,
  IsRelatedTo,
  /// Version equivalence: both endpoints are versions of one work.
  HasVersion,
  /// Identity equivalence: both endpoints denote the same object.
  IsIdenticalTo,
}

/// What applying a claim of a given relation does to the graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClaimEffect {
  /// Union the endpoints' groups at the given layer.
  Merge(GroupKind),
  /// Create or extend a relationship edge.
  Link,
}

impl Relation {
  pub fn effect(self) -> ClaimEffect {
    match self {
      Self::IsIdenticalTo => ClaimEffect::Merge(GroupKind::Identity),
      Self::HasVersion => ClaimEffect::Merge(GroupKind::Version),
      Self::Cites | Self::IsSupplementTo | Self::IsRelatedTo => ClaimEffect::Link,
    }
  }

  /// Parse a relation name as it appears in intake payloads.
  ///
  /// Inverse aliases resolve to their canonical relation; the returned flag
  /// is `true` when the claim's endpoints must be swapped.
  pub fn parse_name(name: &str) -> Result<(Self, bool)> {
    match name {
      "IsCitedBy" => Ok((Self::Cites, true)),
      "IsSupplementedBy" => Ok((Self::IsSupplementTo, true)),
      "IsVersionOf" => Ok((Self::HasVersion, true)),
      other => other
        .parse::<Self>()
        .map(|relation| (relation, false))
        .map_err(|_| Error::InvalidRelation(other.to_owned())),
    }
  }
}

// ─── Vocabulary ──────────────────────────────────────────────────────────────

/// Which end of an edge a group sits on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
  Outward,
  Inward,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationLabels {
  /// Label used from the source's perspective, e.g. `cites`.
  pub label:   String,
  /// Label used from the target's perspective, e.g. `isCitedBy`.
  pub inverse: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RelationVocabulary {
  entries: BTreeMap<Relation, RelationLabels>,
}

impl Default for RelationVocabulary {
  fn default() -> Self {
    Self::from_entries([
      (Relation::Cites, "cites", "isCitedBy"),
      (Relation::IsSupplementTo, "isSupplementTo", "isSupplementedBy"),
      (Relation::IsRelatedTo, "isRelatedTo", "isRelatedTo"),
    ])
  }
}

impl RelationVocabulary {
  pub fn from_entries<'a>(
    entries: impl IntoIterator<Item = (Relation, &'a str, &'a str)>,
  ) -> Self {
    Self {
      entries: entries
        .into_iter()
        .map(|(relation, label, inverse)| {
          (relation, RelationLabels { label: label.to_owned(), inverse: inverse.to_owned() })
        })
        .collect(),
    }
  }

  pub fn labels(&self, relation: Relation) -> Option<&RelationLabels> {
    self.entries.get(&relation)
  }

  /// The label for `relation` read from the given end of the edge.
  pub fn label(&self, relation: Relation, direction: Direction) -> Option<&str> {
    self.labels(relation).map(|l| match direction {
      Direction::Outward => l.label.as_str(),
      Direction::Inward => l.inverse.as_str(),
    })
  }

  /// Reject edge-forming relations that have no labels. Merge relations
  /// never form edges and need no entry.
  pub fn validate(&self, relation: Relation) -> Result<()> {
    match relation.effect() {
      ClaimEffect::Merge(_) => Ok(()),
      ClaimEffect::Link if self.entries.contains_key(&relation) => Ok(()),
      ClaimEffect::Link => Err(Error::InvalidRelation(relation.to_string())),
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn inverse_aliases_swap_endpoints() {
    assert_eq!(Relation::parse_name("IsCitedBy").unwrap(), (Relation::Cites, true));
    assert_eq!(Relation::parse_name("IsVersionOf").unwrap(), (Relation::HasVersion, true));
    assert_eq!(Relation::parse_name("Cites").unwrap(), (Relation::Cites, false));
  }

  #[test]
  fn unknown_name_is_invalid() {
    assert!(matches!(
      Relation::parse_name("Likes"),
      Err(Error::InvalidRelation(name)) if name == "Likes"
    ));
  }

  #[test]
  fn default_labels() {
    let v = RelationVocabulary::default();
    assert_eq!(v.label(Relation::Cites, Direction::Outward), Some("cites"));
    assert_eq!(v.label(Relation::Cites, Direction::Inward), Some("isCitedBy"));
    assert_eq!(v.label(Relation::IsIdenticalTo, Direction::Outward), None);
  }

  #[test]
  fn validate_requires_labels_for_links_only() {
    let v = RelationVocabulary::from_entries([(Relation::Cites, "cites", "isCitedBy")]);
    assert!(v.validate(Relation::Cites).is_ok());
    assert!(v.validate(Relation::IsIdenticalTo).is_ok());
    assert!(v.validate(Relation::HasVersion).is_ok());
    assert!(v.validate(Relation::IsSupplementTo).is_err());
  }

  #[test]
  fn vocabulary_deserializes_from_map() {
    let v: RelationVocabulary = serde_json::from_str(
      r#"{"Cites": {"label": "references", "inverse": "isReferencedBy"}}"#,
    )
    .unwrap();
    assert_eq!(v.label(Relation::Cites, Direction::Inward), Some("isReferencedBy"));
  }
}
