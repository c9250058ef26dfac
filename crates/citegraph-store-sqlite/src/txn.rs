//! [`SqliteTxn`]: the [`GraphTxn`] implementation over an open SQLite
//! transaction.

use chrono::{DateTime, Utc};
use citegraph_core::{
  group::{Group, GroupId, GroupMetadata},
  identifier::Identifier,
  relationship::{GroupRelationship, RelationshipKey},
  store::GraphTxn,
};
use rusqlite::{Connection, OptionalExtension as _, params};
use uuid::Uuid;

use crate::{
  Error, Result,
  encode::{
    RawGroup, RawRelationship, decode_id, encode_dt, encode_id, encode_kind,
    encode_relation, encode_uuid, identifier_from_row,
  },
};

/// Row access bound to a connection on which a transaction is already open.
/// Commit and rollback belong to the caller.
pub struct SqliteTxn<'c> {
  conn: &'c Connection,
  now:  DateTime<Utc>,
}

impl<'c> SqliteTxn<'c> {
  pub fn new(conn: &'c Connection, now: DateTime<Utc>) -> Self { Self { conn, now } }

  /// Identifiers owned directly by an identity group.
  pub fn identifiers_of(&self, group: GroupId) -> Result<Vec<Identifier>> {
    let mut stmt = self.conn.prepare_cached(
      "SELECT scheme, value FROM identifiers WHERE group_id = ?1 ORDER BY scheme, value",
    )?;
    Ok(
      stmt
        .query_map(params![encode_id(group)], identifier_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?,
    )
  }

  /// Identifiers of every member of a version group.
  pub fn member_identifiers(&self, version: GroupId) -> Result<Vec<Identifier>> {
    let mut stmt = self.conn.prepare_cached(
      "SELECT i.scheme, i.value
       FROM identifiers i
       JOIN group_members m ON m.identity_id = i.group_id
       WHERE m.version_id = ?1
       ORDER BY i.scheme, i.value",
    )?;
    Ok(
      stmt
        .query_map(params![encode_id(version)], identifier_from_row)?
        .collect::<rusqlite::Result<Vec<_>>>()?,
    )
  }

  /// Member identity groups of a version group, sorted by id.
  pub fn members_of(&self, version: GroupId) -> Result<Vec<Group>> {
    let sql = format!(
      "SELECT {}
       FROM group_members gm
       JOIN groups g ON g.group_id = gm.identity_id
       LEFT JOIN group_metadata m ON m.group_id = g.group_id
       WHERE gm.version_id = ?1
       ORDER BY g.group_id",
      RawGroup::COLUMNS
    );
    let mut stmt = self.conn.prepare_cached(&sql)?;
    let raws = stmt
      .query_map(params![encode_id(version)], RawGroup::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawGroup::into_group).collect()
  }

  /// Ids of every group, optionally of one kind, sorted.
  pub fn list_group_ids(&self, kind: Option<&str>) -> Result<Vec<GroupId>> {
    let mut stmt = self.conn.prepare_cached(
      "SELECT group_id FROM groups WHERE ?1 IS NULL OR kind = ?1 ORDER BY group_id",
    )?;
    let raws = stmt
      .query_map(params![kind], |row| row.get::<_, String>(0))?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.iter().map(|s| decode_id(s)).collect()
  }

  fn query_relationships(
    &self,
    filter: &str,
    args: impl rusqlite::Params,
  ) -> Result<Vec<GroupRelationship>> {
    let sql = format!(
      "SELECT {} FROM group_relationships WHERE {filter} ORDER BY relationship_id",
      RawRelationship::COLUMNS
    );
    let mut stmt = self.conn.prepare_cached(&sql)?;
    let raws = stmt
      .query_map(args, RawRelationship::from_row)?
      .collect::<rusqlite::Result<Vec<_>>>()?;
    raws.into_iter().map(RawRelationship::into_relationship).collect()
  }
}

impl GraphTxn for SqliteTxn<'_> {
  type Error = Error;

  // ── Identifier Registry ───────────────────────────────────────────────────

  fn identifier_owner(&mut self, identifier: &Identifier) -> Result<Option<GroupId>> {
    let raw: Option<String> = self
      .conn
      .query_row(
        "SELECT group_id FROM identifiers WHERE scheme = ?1 AND value = ?2",
        params![identifier.scheme, identifier.value],
        |row| row.get(0),
      )
      .optional()?;
    raw.as_deref().map(decode_id).transpose()
  }

  fn insert_identifier(&mut self, identifier: &Identifier, owner: GroupId) -> Result<()> {
    self.conn.execute(
      "INSERT INTO identifiers (scheme, value, group_id, created_at) VALUES (?1, ?2, ?3, ?4)",
      params![identifier.scheme, identifier.value, encode_id(owner), encode_dt(self.now)],
    )?;
    Ok(())
  }

  fn move_identifiers(&mut self, from: GroupId, to: GroupId) -> Result<()> {
    self.conn.execute(
      "UPDATE identifiers SET group_id = ?2 WHERE group_id = ?1",
      params![encode_id(from), encode_id(to)],
    )?;
    Ok(())
  }

  // ── Groups ────────────────────────────────────────────────────────────────

  fn load_group(&mut self, id: GroupId) -> Result<Option<Group>> {
    let sql = format!(
      "SELECT {}
       FROM groups g
       LEFT JOIN group_metadata m ON m.group_id = g.group_id
       WHERE g.group_id = ?1",
      RawGroup::COLUMNS
    );
    let raw = self
      .conn
      .query_row(&sql, params![encode_id(id)], RawGroup::from_row)
      .optional()?;
    raw.map(RawGroup::into_group).transpose()
  }

  fn insert_group(&mut self, group: &Group) -> Result<()> {
    self.conn.execute(
      "INSERT INTO groups (group_id, kind, created_at) VALUES (?1, ?2, ?3)",
      params![encode_id(group.group_id), encode_kind(group.kind), encode_dt(group.created_at)],
    )?;
    if let Some(metadata) = &group.metadata {
      self.store_metadata(group.group_id, Some(metadata))?;
    }
    Ok(())
  }

  fn store_metadata(&mut self, id: GroupId, metadata: Option<&GroupMetadata>) -> Result<()> {
    match metadata {
      None => {
        self
          .conn
          .execute("DELETE FROM group_metadata WHERE group_id = ?1", params![encode_id(id)])?;
      }
      Some(m) => {
        let version = i64::try_from(m.version)
          .map_err(|_| Error::Decode(format!("metadata version overflow: {}", m.version)))?;
        self.conn.execute(
          "INSERT INTO group_metadata (group_id, document, attached_at, version)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (group_id) DO UPDATE SET
             document    = excluded.document,
             attached_at = excluded.attached_at,
             version     = excluded.version",
          params![
            encode_id(id),
            serde_json::to_string(&m.document)?,
            encode_dt(m.attached_at),
            version,
          ],
        )?;
      }
    }
    Ok(())
  }

  fn delete_group(&mut self, id: GroupId) -> Result<()> {
    let deleted =
      self.conn.execute("DELETE FROM groups WHERE group_id = ?1", params![encode_id(id)])?;
    if deleted == 0 {
      return Err(citegraph_core::Error::GroupNotFound(id).into());
    }
    Ok(())
  }

  // ── Version membership ────────────────────────────────────────────────────

  fn version_of(&mut self, identity: GroupId) -> Result<Option<GroupId>> {
    let raw: Option<String> = self
      .conn
      .query_row(
        "SELECT version_id FROM group_members WHERE identity_id = ?1",
        params![encode_id(identity)],
        |row| row.get(0),
      )
      .optional()?;
    raw.as_deref().map(decode_id).transpose()
  }

  fn add_member(&mut self, version: GroupId, identity: GroupId) -> Result<()> {
    self.conn.execute(
      "INSERT INTO group_members (identity_id, version_id) VALUES (?1, ?2)",
      params![encode_id(identity), encode_id(version)],
    )?;
    Ok(())
  }

  fn remove_member(&mut self, identity: GroupId) -> Result<()> {
    self.conn.execute(
      "DELETE FROM group_members WHERE identity_id = ?1",
      params![encode_id(identity)],
    )?;
    Ok(())
  }

  fn move_members(&mut self, from: GroupId, to: GroupId) -> Result<()> {
    self.conn.execute(
      "UPDATE group_members SET version_id = ?2 WHERE version_id = ?1",
      params![encode_id(from), encode_id(to)],
    )?;
    Ok(())
  }

  // ── Relationships ─────────────────────────────────────────────────────────

  fn incident_relationships(&mut self, group: GroupId) -> Result<Vec<GroupRelationship>> {
    self.query_relationships("source_id = ?1 OR target_id = ?1", params![encode_id(group)])
  }

  fn find_relationship(&mut self, key: &RelationshipKey) -> Result<Option<GroupRelationship>> {
    let mut found = self.query_relationships(
      "kind = ?1 AND relation = ?2 AND source_id = ?3 AND target_id = ?4",
      params![
        encode_kind(key.kind),
        encode_relation(key.relation),
        encode_id(key.source_id),
        encode_id(key.target_id),
      ],
    )?;
    Ok(found.pop())
  }

  fn insert_relationship(&mut self, rel: &GroupRelationship) -> Result<()> {
    self.conn.execute(
      "INSERT INTO group_relationships
         (relationship_id, kind, relation, source_id, target_id, history)
       VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
      params![
        encode_uuid(rel.relationship_id),
        encode_kind(rel.kind),
        encode_relation(rel.relation),
        encode_id(rel.source_id),
        encode_id(rel.target_id),
        serde_json::to_string(&rel.history)?,
      ],
    )?;
    Ok(())
  }

  fn update_relationship(&mut self, rel: &GroupRelationship) -> Result<()> {
    self.conn.execute(
      "UPDATE group_relationships
       SET source_id = ?2, target_id = ?3, history = ?4
       WHERE relationship_id = ?1",
      params![
        encode_uuid(rel.relationship_id),
        encode_id(rel.source_id),
        encode_id(rel.target_id),
        serde_json::to_string(&rel.history)?,
      ],
    )?;
    Ok(())
  }

  fn delete_relationship(&mut self, id: Uuid) -> Result<()> {
    self.conn.execute(
      "DELETE FROM group_relationships WHERE relationship_id = ?1",
      params![encode_uuid(id)],
    )?;
    Ok(())
  }
}
