//! Request-scoped memo of group state.
//!
//! A [`GroupCache`] lives for exactly one transaction. The merge engine reads
//! through it and keeps it in step with every write, so a claim that touches
//! the same group repeatedly hits storage once.

use std::collections::HashMap;

use crate::{
  group::{Group, GroupId},
  identifier::Identifier,
};

#[derive(Debug, Default)]
pub struct GroupCache {
  groups:   HashMap<GroupId, Option<Group>>,
  owners:   HashMap<Identifier, GroupId>,
  versions: HashMap<GroupId, Option<GroupId>>,
}

impl GroupCache {
  pub fn new() -> Self { Self::default() }

  /// `None` on a miss; `Some(None)` for a group known to be absent.
  pub fn group(&self, id: GroupId) -> Option<Option<&Group>> {
    self.groups.get(&id).map(Option::as_ref)
  }

  pub fn put_group(&mut self, id: GroupId, group: Option<Group>) {
    self.groups.insert(id, group);
  }

  pub fn owner(&self, identifier: &Identifier) -> Option<GroupId> {
    self.owners.get(identifier).copied()
  }

  pub fn put_owner(&mut self, identifier: Identifier, group: GroupId) {
    self.owners.insert(identifier, group);
  }

  pub fn version_of(&self, identity: GroupId) -> Option<Option<GroupId>> {
    self.versions.get(&identity).copied()
  }

  pub fn put_version(&mut self, identity: GroupId, version: Option<GroupId>) {
    self.versions.insert(identity, version);
  }

  /// Forget a deleted group and any membership recorded for it.
  pub fn forget(&mut self, id: GroupId) {
    self.groups.insert(id, None);
    self.versions.remove(&id);
  }

  /// Identifiers owned by `from` now belong to `to`.
  pub fn rewrite_owners(&mut self, from: GroupId, to: GroupId) {
    for owner in self.owners.values_mut() {
      if *owner == from {
        *owner = to;
      }
    }
  }

  /// Members of version group `from` now belong to `to`.
  pub fn rewrite_versions(&mut self, from: GroupId, to: GroupId) {
    for version in self.versions.values_mut() {
      if *version == Some(from) {
        *version = Some(to);
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use chrono::Utc;
  use uuid::Uuid;

  use super::*;
  use crate::group::GroupKind;

  fn g(n: u128) -> GroupId { GroupId(Uuid::from_u128(n)) }

  #[test]
  fn miss_and_known_absent_differ() {
    let mut cache = GroupCache::new();
    assert!(cache.group(g(1)).is_none());
    cache.put_group(g(1), None);
    assert_eq!(cache.group(g(1)), Some(None));
    cache.put_group(g(2), Some(Group::new(g(2), GroupKind::Identity, Utc::now())));
    assert!(matches!(cache.group(g(2)), Some(Some(_))));
  }

  #[test]
  fn rewrites_follow_merges() {
    let mut cache = GroupCache::new();
    let id = Identifier::new("doi", "10.1/x");
    cache.put_owner(id.clone(), g(2));
    cache.put_version(g(5), Some(g(9)));
    cache.rewrite_owners(g(2), g(1));
    cache.rewrite_versions(g(9), g(8));
    assert_eq!(cache.owner(&id), Some(g(1)));
    assert_eq!(cache.version_of(g(5)), Some(Some(g(8))));
  }

  #[test]
  fn forgotten_group_reads_as_absent() {
    let mut cache = GroupCache::new();
    cache.put_group(g(3), Some(Group::new(g(3), GroupKind::Version, Utc::now())));
    cache.put_version(g(3), None);
    cache.forget(g(3));
    assert_eq!(cache.group(g(3)), Some(None));
    assert_eq!(cache.version_of(g(3)), None);
  }
}
