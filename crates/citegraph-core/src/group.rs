//! Groups: the two union-find layers of the graph.
//!
//! An identity group is an equivalence class of identifiers; a version group
//! collects identity groups that are versions of one work. Membership of an
//! identity group in a version group is an explicit link, not ownership.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{identifier::Identifier, relationship::GroupRelationship};

/// Namespace for the UUIDv5 group ids minted by [`GroupId::for_identifier`]
/// and [`GroupId::for_version_of`].
const GROUP_NAMESPACE: Uuid = Uuid::from_u128(0x6c2f_0d1e_8a4b_5f3c_9e71_2b4d_a0c8_e513);

// ─── GroupId ─────────────────────────────────────────────────────────────────

/// Opaque, stable group id. Ordering matters: when two groups merge, the one
/// with the lower id survives.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct GroupId(pub Uuid);

impl GroupId {
  /// Id of the identity group created on the first resolution of
  /// `identifier`.
  pub fn for_identifier(identifier: &Identifier) -> Self {
    let name = format!("identity:{}:{}", identifier.scheme, identifier.value);
    Self(Uuid::new_v5(&GROUP_NAMESPACE, name.as_bytes()))
  }

  /// Id of the version group created transparently for `identity`.
  pub fn for_version_of(identity: GroupId) -> Self {
    let name = format!("version:{}", identity.0.hyphenated());
    Self(Uuid::new_v5(&GROUP_NAMESPACE, name.as_bytes()))
  }
}

impl fmt::Display for GroupId {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    fmt::Display::fmt(&self.0.hyphenated(), f)
  }
}

impl FromStr for GroupId {
  type Err = uuid::Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> { Uuid::parse_str(s).map(Self) }
}

// ─── GroupKind ───────────────────────────────────────────────────────────────

#[derive(
  Debug,
  Clone,
  Copy,
  PartialEq,
  Eq,
  Hash,
  Serialize,
  Deserialize,
  strum::Display,
  strum::EnumString,
  strum::IntoStaticStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum GroupKind {
  Identity,
  Version,
}

// ─── Metadata ────────────────────────────────────────────────────────────────

/// Opaque descriptive document attached to a group.
///
/// The core never looks inside `document`; it only fuses top-level fields
/// with last-evidence-wins semantics.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupMetadata {
  pub document:    Map<String, Value>,
  /// Evidence timestamp of the newest contribution that changed `document`.
  pub attached_at: DateTime<Utc>,
  /// Incremented on every change to `document`.
  pub version:     u64,
}

impl GroupMetadata {
  pub fn empty(attached_at: DateTime<Utc>) -> Self {
    Self { document: Map::new(), attached_at, version: 0 }
  }

  /// Attach fields carried by a claim asserted at `at`.
  ///
  /// Incoming fields overwrite existing ones when the claim is at least as
  /// recent as the current document; older claims only fill missing fields.
  /// Returns `true` if the document changed.
  pub fn attach(&mut self, fields: &Map<String, Value>, at: DateTime<Utc>) -> bool {
    let incoming_wins = at >= self.attached_at;
    let changed = self.overlay(
      fields.iter().map(|(k, v)| (k.clone(), v.clone())),
      incoming_wins,
    );
    if changed {
      self.attached_at = self.attached_at.max(at);
      self.version += 1;
    }
    changed
  }

  /// Fuse the metadata of an absorbed group into the survivor's.
  ///
  /// A field present in both is taken from `absorbed` only if its metadata
  /// was attached strictly after the survivor's. Fields missing from the
  /// survivor are always taken.
  pub fn fuse(survivor: Option<Self>, absorbed: Option<Self>) -> Option<Self> {
    match (survivor, absorbed) {
      (survivor, None) => survivor,
      (None, absorbed) => absorbed,
      (Some(mut survivor), Some(absorbed)) => {
        let absorbed_wins = absorbed.attached_at > survivor.attached_at;
        let changed = survivor.overlay(absorbed.document, absorbed_wins);
        if changed {
          survivor.attached_at = survivor.attached_at.max(absorbed.attached_at);
          survivor.version = survivor.version.max(absorbed.version) + 1;
        }
        Some(survivor)
      }
    }
  }

  fn overlay(
    &mut self,
    fields: impl IntoIterator<Item = (String, Value)>,
    incoming_wins: bool,
  ) -> bool {
    let mut changed = false;
    for (key, value) in fields {
      match self.document.get(&key) {
        Some(existing) if *existing == value => {}
        Some(_) if !incoming_wins => {}
        _ => {
          self.document.insert(key, value);
          changed = true;
        }
      }
    }
    changed
  }
}

// ─── Group ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Group {
  pub group_id:   GroupId,
  pub kind:       GroupKind,
  pub created_at: DateTime<Utc>,
  pub metadata:   Option<GroupMetadata>,
}

impl Group {
  pub fn new(group_id: GroupId, kind: GroupKind, created_at: DateTime<Utc>) -> Self {
    Self { group_id, kind, created_at, metadata: None }
  }
}

// ─── Read model ──────────────────────────────────────────────────────────────

/// Everything needed to project and index one group, read from a single
/// committed snapshot.
#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
  pub group:         Group,
  /// For identity groups, the identifiers the group owns. For version
  /// groups, the identifiers of every member.
  pub identifiers:   Vec<Identifier>,
  /// Member identity groups of a version group, sorted by id. Empty for
  /// identity groups.
  pub members:       Vec<Group>,
  /// The version group an identity group belongs to, if any.
  pub version_id:    Option<GroupId>,
  /// Every relationship with this group as source or target.
  pub relationships: Vec<GroupRelationship>,
}

impl GroupView {
  /// The metadata that describes this group in the index.
  ///
  /// Version groups take the metadata of their canonical member (the member
  /// with the lowest id), falling back to their own.
  pub fn canonical_metadata(&self) -> Option<&GroupMetadata> {
    match self.group.kind {
      GroupKind::Identity => self.group.metadata.as_ref(),
      GroupKind::Version => self
        .members
        .first()
        .and_then(|m| m.metadata.as_ref())
        .or(self.group.metadata.as_ref()),
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;
  use serde_json::json;

  use super::*;

  fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2018, 1, day, 0, 0, 0).unwrap()
  }

  fn doc(value: Value) -> Map<String, Value> {
    value.as_object().cloned().unwrap()
  }

  #[test]
  fn group_ids_are_deterministic() {
    let id = Identifier::new("doi", "10.1234/a");
    assert_eq!(GroupId::for_identifier(&id), GroupId::for_identifier(&id));
    let g = GroupId::for_identifier(&id);
    assert_ne!(GroupId::for_version_of(g), g);
  }

  #[test]
  fn attach_newer_overwrites() {
    let mut m = GroupMetadata::empty(at(1));
    assert!(m.attach(&doc(json!({"Title": "old"})), at(1)));
    assert!(m.attach(&doc(json!({"Title": "new"})), at(2)));
    assert_eq!(m.document["Title"], "new");
    assert_eq!(m.attached_at, at(2));
    assert_eq!(m.version, 2);
  }

  #[test]
  fn attach_older_only_fills_missing() {
    let mut m = GroupMetadata::empty(at(5));
    m.attach(&doc(json!({"Title": "current"})), at(5));
    assert!(m.attach(&doc(json!({"Title": "stale", "Publisher": "ACME"})), at(1)));
    assert_eq!(m.document["Title"], "current");
    assert_eq!(m.document["Publisher"], "ACME");
    assert_eq!(m.attached_at, at(5));
  }

  #[test]
  fn attach_same_fields_is_unchanged() {
    let mut m = GroupMetadata::empty(at(1));
    m.attach(&doc(json!({"Title": "t"})), at(1));
    assert!(!m.attach(&doc(json!({"Title": "t"})), at(1)));
    assert_eq!(m.version, 1);
  }

  #[test]
  fn fuse_prefers_later_absorbed() {
    let mut survivor = GroupMetadata::empty(at(1));
    survivor.attach(&doc(json!({"Title": "s", "Type": "software"})), at(1));
    let mut absorbed = GroupMetadata::empty(at(2));
    absorbed.attach(&doc(json!({"Title": "a"})), at(2));

    let fused = GroupMetadata::fuse(Some(survivor), Some(absorbed)).unwrap();
    assert_eq!(fused.document["Title"], "a");
    assert_eq!(fused.document["Type"], "software");
    assert_eq!(fused.attached_at, at(2));
  }

  #[test]
  fn fuse_tie_keeps_survivor() {
    let mut survivor = GroupMetadata::empty(at(1));
    survivor.attach(&doc(json!({"Title": "s"})), at(1));
    let mut absorbed = GroupMetadata::empty(at(1));
    absorbed.attach(&doc(json!({"Title": "a", "Publisher": "p"})), at(1));

    let fused = GroupMetadata::fuse(Some(survivor), Some(absorbed)).unwrap();
    assert_eq!(fused.document["Title"], "s");
    assert_eq!(fused.document["Publisher"], "p");
  }

  #[test]
  fn fuse_with_missing_side() {
    let mut only = GroupMetadata::empty(at(1));
    only.attach(&doc(json!({"Title": "x"})), at(1));
    assert_eq!(GroupMetadata::fuse(None, Some(only.clone())), Some(only.clone()));
    assert_eq!(GroupMetadata::fuse(Some(only.clone()), None), Some(only));
    assert_eq!(GroupMetadata::fuse(None, None), None);
  }
}
