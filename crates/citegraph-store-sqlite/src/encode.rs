//! Encoding and decoding helpers between domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are RFC 3339 strings. Ids are hyphenated lowercase UUIDs, so
//! their text order matches [`GroupId`] order. Metadata documents and
//! histories are compact JSON.

use chrono::{DateTime, Utc};
use citegraph_core::{
  group::{Group, GroupId, GroupKind, GroupMetadata},
  identifier::Identifier,
  relation::Relation,
  relationship::{GroupRelationship, History},
};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_id(id: GroupId) -> String { encode_uuid(id.0) }

pub fn decode_id(s: &str) -> Result<GroupId> { decode_uuid(s).map(GroupId) }

pub fn encode_dt(dt: DateTime<Utc>) -> String { dt.to_rfc3339() }

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_kind(kind: GroupKind) -> &'static str { kind.into() }

pub fn decode_kind(s: &str) -> Result<GroupKind> {
  s.parse().map_err(|_| Error::Decode(format!("unknown group kind: {s:?}")))
}

pub fn encode_relation(relation: Relation) -> &'static str { relation.into() }

pub fn decode_relation(s: &str) -> Result<Relation> {
  s.parse().map_err(|_| Error::Decode(format!("unknown relation: {s:?}")))
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// A `groups` row left-joined with `group_metadata`.
pub struct RawGroup {
  pub group_id:    String,
  pub kind:        String,
  pub created_at:  String,
  pub document:    Option<String>,
  pub attached_at: Option<String>,
  pub version:     Option<i64>,
}

impl RawGroup {
  pub const COLUMNS: &'static str =
    "g.group_id, g.kind, g.created_at, m.document, m.attached_at, m.version";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      group_id:    row.get(0)?,
      kind:        row.get(1)?,
      created_at:  row.get(2)?,
      document:    row.get(3)?,
      attached_at: row.get(4)?,
      version:     row.get(5)?,
    })
  }

  pub fn into_group(self) -> Result<Group> {
    let metadata = match (self.document, self.attached_at, self.version) {
      (Some(document), Some(attached_at), Some(version)) => Some(GroupMetadata {
        document:    serde_json::from_str::<Map<String, Value>>(&document)?,
        attached_at: decode_dt(&attached_at)?,
        version:     u64::try_from(version)
          .map_err(|_| Error::Decode(format!("negative metadata version: {version}")))?,
      }),
      _ => None,
    };
    Ok(Group {
      group_id: decode_id(&self.group_id)?,
      kind: decode_kind(&self.kind)?,
      created_at: decode_dt(&self.created_at)?,
      metadata,
    })
  }
}

/// A `group_relationships` row.
pub struct RawRelationship {
  pub relationship_id: String,
  pub kind:            String,
  pub relation:        String,
  pub source_id:       String,
  pub target_id:       String,
  pub history:         String,
}

impl RawRelationship {
  pub const COLUMNS: &'static str =
    "relationship_id, kind, relation, source_id, target_id, history";

  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      relationship_id: row.get(0)?,
      kind:            row.get(1)?,
      relation:        row.get(2)?,
      source_id:       row.get(3)?,
      target_id:       row.get(4)?,
      history:         row.get(5)?,
    })
  }

  pub fn into_relationship(self) -> Result<GroupRelationship> {
    Ok(GroupRelationship {
      relationship_id: decode_uuid(&self.relationship_id)?,
      kind:            decode_kind(&self.kind)?,
      relation:        decode_relation(&self.relation)?,
      source_id:       decode_id(&self.source_id)?,
      target_id:       decode_id(&self.target_id)?,
      history:         serde_json::from_str::<History>(&self.history)?,
    })
  }
}

pub fn identifier_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Identifier> {
  Ok(Identifier { scheme: row.get(0)?, value: row.get(1)? })
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn id_text_order_matches_uuid_order() {
    let lo = GroupId(Uuid::from_u128(0x0f));
    let hi = GroupId(Uuid::from_u128(0xa0));
    assert!(lo < hi);
    assert!(encode_id(lo) < encode_id(hi));
  }

  #[test]
  fn kinds_and_relations_round_trip_through_text() {
    assert_eq!(encode_kind(GroupKind::Version), "version");
    assert_eq!(decode_kind("identity").unwrap(), GroupKind::Identity);
    assert_eq!(encode_relation(Relation::IsSupplementTo), "IsSupplementTo");
    assert!(decode_relation("isCitedBy").is_err());
  }

  #[test]
  fn group_without_metadata_row() {
    let raw = RawGroup {
      group_id:    encode_id(GroupId(Uuid::from_u128(1))),
      kind:        "identity".into(),
      created_at:  "2018-01-01T00:00:00+00:00".into(),
      document:    None,
      attached_at: None,
      version:     None,
    };
    let group = raw.into_group().unwrap();
    assert!(group.metadata.is_none());
    assert_eq!(group.kind, GroupKind::Identity);
  }
}
