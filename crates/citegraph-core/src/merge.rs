//! The merge engine.
//!
//! Applies one [`Claim`] to the graph through a [`GraphTxn`]. Identity and
//! version claims union groups; every other relation creates or extends an
//! edge. The surviving group of a merge is always the one with the lower id,
//! which makes the final shape of the graph independent of claim order.
//!
//! The engine assumes it runs inside one serializable write transaction and
//! leaves commit and rollback to the caller.

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::{
  Error,
  cache::GroupCache,
  claim::Claim,
  group::{Group, GroupId, GroupKind, GroupMetadata},
  identifier::Identifier,
  relation::{ClaimEffect, Relation},
  relationship::{Evidence, GroupRelationship, History, RelationshipKey},
  report::ChangeReport,
  store::GraphTxn,
};

/// Apply `claim` and report which groups were created, mutated or destroyed.
pub fn apply_claim<T: GraphTxn>(
  txn: &mut T,
  cache: &mut GroupCache,
  claim: &Claim,
  now: DateTime<Utc>,
) -> Result<ChangeReport, T::Error> {
  let mut engine = Engine::new(txn, cache, now);

  let source = engine.resolve(&claim.source)?;
  let target = engine.resolve(&claim.target)?;

  match claim.relation.effect() {
    ClaimEffect::Merge(GroupKind::Identity) => engine.merge_identity(source, target)?,
    ClaimEffect::Merge(GroupKind::Version) => engine.merge_versions(source, target)?,
    ClaimEffect::Link => {
      engine.link(claim.relation, source, target, &claim.evidence)?
    }
  }

  let at = claim.evidence.asserted_at;
  if let Some(fields) = &claim.source_metadata {
    let owner = engine.resolve(&claim.source)?;
    engine.attach_metadata(owner, fields, at)?;
  }
  if let Some(fields) = &claim.target_metadata {
    let owner = engine.resolve(&claim.target)?;
    engine.attach_metadata(owner, fields, at)?;
  }

  Ok(engine.report)
}

/// Resolve `identifier` to its owning identity group, creating a singleton
/// group if the identifier is new.
pub fn resolve<T: GraphTxn>(
  txn: &mut T,
  cache: &mut GroupCache,
  identifier: &Identifier,
  now: DateTime<Utc>,
) -> Result<(GroupId, ChangeReport), T::Error> {
  let mut engine = Engine::new(txn, cache, now);
  let id = engine.resolve(identifier)?;
  Ok((id, engine.report))
}

struct Engine<'a, T> {
  txn:    &'a mut T,
  cache:  &'a mut GroupCache,
  report: ChangeReport,
  now:    DateTime<Utc>,
}

impl<'a, T: GraphTxn> Engine<'a, T> {
  fn new(txn: &'a mut T, cache: &'a mut GroupCache, now: DateTime<Utc>) -> Self {
    Self { txn, cache, report: ChangeReport::default(), now }
  }

  // ── Reads through the cache ───────────────────────────────────────────

  fn resolve(&mut self, identifier: &Identifier) -> Result<GroupId, T::Error> {
    if let Some(owner) = self.cache.owner(identifier) {
      return Ok(owner);
    }
    let owner = match self.txn.identifier_owner(identifier)? {
      Some(owner) => owner,
      None => {
        let group =
          Group::new(GroupId::for_identifier(identifier), GroupKind::Identity, self.now);
        self.txn.insert_group(&group)?;
        self.txn.insert_identifier(identifier, group.group_id)?;
        self.report.mark_created(group.group_id);
        self.cache.put_version(group.group_id, None);
        let id = group.group_id;
        self.cache.put_group(id, Some(group));
        id
      }
    };
    self.cache.put_owner(identifier.clone(), owner);
    Ok(owner)
  }

  fn group(&mut self, id: GroupId) -> Result<Group, T::Error> {
    let group = match self.cache.group(id) {
      Some(cached) => cached.cloned(),
      None => {
        let loaded = self.txn.load_group(id)?;
        self.cache.put_group(id, loaded.clone());
        loaded
      }
    };
    Ok(group.ok_or(Error::GroupNotFound(id))?)
  }

  fn version_of(&mut self, identity: GroupId) -> Result<Option<GroupId>, T::Error> {
    if let Some(version) = self.cache.version_of(identity) {
      return Ok(version);
    }
    let version = self.txn.version_of(identity)?;
    self.cache.put_version(identity, version);
    Ok(version)
  }

  /// The version group of `identity`, created transparently if absent.
  fn ensure_version(&mut self, identity: GroupId) -> Result<GroupId, T::Error> {
    if let Some(version) = self.version_of(identity)? {
      return Ok(version);
    }
    let group = Group::new(GroupId::for_version_of(identity), GroupKind::Version, self.now);
    let id = group.group_id;
    self.txn.insert_group(&group)?;
    self.txn.add_member(id, identity)?;
    self.cache.put_group(id, Some(group));
    self.cache.put_version(identity, Some(id));
    self.report.mark_created(id);
    self.lift_edges(identity)?;
    Ok(id)
  }

  // ── Merges ────────────────────────────────────────────────────────────

  fn merge_identity(&mut self, a: GroupId, b: GroupId) -> Result<(), T::Error> {
    if a == b {
      return Ok(());
    }
    let (survivor, absorbed) = if a < b { (a, b) } else { (b, a) };
    let survivor_version = self.version_of(survivor)?;
    let absorbed_version = self.version_of(absorbed)?;

    if absorbed_version.is_some() {
      self.txn.remove_member(absorbed)?;
      self.cache.put_version(absorbed, None);
    }

    self.absorb(GroupKind::Identity, survivor, absorbed)?;

    match (survivor_version, absorbed_version) {
      (Some(x), Some(y)) if x != y => {
        let (keep, drop) = if x < y { (x, y) } else { (y, x) };
        self.absorb(GroupKind::Version, keep, drop)?;
      }
      (None, Some(y)) => {
        self.txn.add_member(y, survivor)?;
        self.cache.put_version(survivor, Some(y));
        self.report.mark_mutated(y);
      }
      // The version group now lists the absorbed group's identifiers.
      (Some(x), _) => self.report.mark_mutated(x),
      (None, None) => {}
    }
    self.lift_edges(survivor)
  }

  /// A version claim within one identity group still gives it a version
  /// group, so the outcome does not depend on whether an identity claim
  /// between the two came first.
  fn merge_versions(&mut self, a: GroupId, b: GroupId) -> Result<(), T::Error> {
    let va = self.ensure_version(a)?;
    let vb = self.ensure_version(b)?;
    if va != vb {
      let (keep, drop) = if va < vb { (va, vb) } else { (vb, va) };
      self.absorb(GroupKind::Version, keep, drop)?;
    }
    Ok(())
  }

  /// Fold `absorbed` into `survivor` and delete it.
  fn absorb(
    &mut self,
    kind: GroupKind,
    survivor: GroupId,
    absorbed: GroupId,
  ) -> Result<(), T::Error> {
    let kept = self.group(survivor)?;
    let gone = self.group(absorbed)?;
    for group in [&kept, &gone] {
      if group.kind != kind {
        return Err(
          Error::KindMismatch { group: group.group_id, expected: kind, actual: group.kind }
            .into(),
        );
      }
    }

    match kind {
      GroupKind::Identity => {
        self.txn.move_identifiers(absorbed, survivor)?;
        self.cache.rewrite_owners(absorbed, survivor);
      }
      GroupKind::Version => {
        self.txn.move_members(absorbed, survivor)?;
        self.cache.rewrite_versions(absorbed, survivor);
      }
    }

    self.repoint_relationships(kind, survivor, absorbed)?;

    let fused = GroupMetadata::fuse(kept.metadata.clone(), gone.metadata);
    if fused != kept.metadata {
      self.txn.store_metadata(survivor, fused.as_ref())?;
      self.cache.put_group(survivor, Some(Group { metadata: fused, ..kept }));
    }

    self.txn.delete_group(absorbed)?;
    self.cache.forget(absorbed);
    self.report.mark_destroyed(absorbed, survivor);
    self.report.mark_mutated(survivor);
    Ok(())
  }

  /// Move every edge of `absorbed` onto `survivor`. Edges that would become
  /// self-loops are dropped; edges that would duplicate an existing one are
  /// folded into its history.
  fn repoint_relationships(
    &mut self,
    kind: GroupKind,
    survivor: GroupId,
    absorbed: GroupId,
  ) -> Result<(), T::Error> {
    let mut edges = self.txn.incident_relationships(absorbed)?;
    edges.sort_by_key(|rel| rel.relationship_id);

    for mut rel in edges {
      let (source_id, target_id) = rel.repointed(absorbed, survivor);
      if source_id == target_id {
        self.txn.delete_relationship(rel.relationship_id)?;
        continue;
      }

      let key = RelationshipKey { kind, relation: rel.relation, source_id, target_id };
      match self.txn.find_relationship(&key)? {
        Some(mut existing) => {
          existing.history = existing.history.union(rel.history)?;
          self.txn.delete_relationship(rel.relationship_id)?;
          self.txn.update_relationship(&existing)?;
        }
        None => {
          rel.source_id = source_id;
          rel.target_id = target_id;
          self.txn.update_relationship(&rel)?;
        }
      }
    }
    Ok(())
  }

  // ── Edges ─────────────────────────────────────────────────────────────

  fn link(
    &mut self,
    relation: Relation,
    source: GroupId,
    target: GroupId,
    evidence: &Evidence,
  ) -> Result<(), T::Error> {
    if source == target {
      return Ok(());
    }
    self.upsert_edge(GroupKind::Identity, relation, source, target, evidence)?;

    if let (Some(vs), Some(vt)) = (self.version_of(source)?, self.version_of(target)?) {
      if vs != vt {
        self.upsert_edge(GroupKind::Version, relation, vs, vt, evidence)?;
      }
    }
    Ok(())
  }

  /// Mirror every edge of `identity` between its version group and the
  /// version group of the other end. Histories fold into any version edge
  /// already present.
  fn lift_edges(&mut self, identity: GroupId) -> Result<(), T::Error> {
    let Some(own) = self.version_of(identity)? else {
      return Ok(());
    };
    let mut edges = self.txn.incident_relationships(identity)?;
    edges.sort_by_key(|rel| rel.relationship_id);

    for rel in edges {
      if rel.kind != GroupKind::Identity {
        continue;
      }
      let Some(other) = rel.other_end(identity) else { continue };
      let Some(theirs) = self.version_of(other)? else { continue };
      if theirs == own {
        continue;
      }
      let (source_id, target_id) =
        if rel.source_id == identity { (own, theirs) } else { (theirs, own) };
      let key =
        RelationshipKey { kind: GroupKind::Version, relation: rel.relation, source_id, target_id };

      let changed = match self.txn.find_relationship(&key)? {
        Some(mut existing) => {
          let history = existing.history.clone().union(rel.history)?;
          let changed = history != existing.history;
          if changed {
            existing.history = history;
            self.txn.update_relationship(&existing)?;
          }
          changed
        }
        None => {
          self.txn.insert_relationship(&GroupRelationship::new(key, rel.history))?;
          true
        }
      };
      if changed {
        self.report.mark_mutated(source_id);
        self.report.mark_mutated(target_id);
      }
    }
    Ok(())
  }

  fn upsert_edge(
    &mut self,
    kind: GroupKind,
    relation: Relation,
    source_id: GroupId,
    target_id: GroupId,
    evidence: &Evidence,
  ) -> Result<(), T::Error> {
    let key = RelationshipKey { kind, relation, source_id, target_id };
    let changed = match self.txn.find_relationship(&key)? {
      Some(mut existing) => {
        let recorded = existing.history.record(evidence.clone())?;
        if recorded {
          self.txn.update_relationship(&existing)?;
        }
        recorded
      }
      None => {
        let rel = GroupRelationship::new(key, History::single(evidence.clone()));
        self.txn.insert_relationship(&rel)?;
        true
      }
    };
    if changed {
      self.report.mark_mutated(source_id);
      self.report.mark_mutated(target_id);
    }
    Ok(())
  }

  // ── Metadata ──────────────────────────────────────────────────────────

  fn attach_metadata(
    &mut self,
    owner: GroupId,
    fields: &Map<String, Value>,
    at: DateTime<Utc>,
  ) -> Result<(), T::Error> {
    let group = self.group(owner)?;
    let mut metadata = group.metadata.clone().unwrap_or_else(|| GroupMetadata::empty(at));
    if !metadata.attach(fields, at) {
      return Ok(());
    }
    self.txn.store_metadata(owner, Some(&metadata))?;
    self.cache.put_group(owner, Some(Group { metadata: Some(metadata), ..group }));
    self.report.mark_mutated(owner);
    if let Some(version) = self.version_of(owner)? {
      self.report.mark_mutated(version);
    }
    Ok(())
  }
}
