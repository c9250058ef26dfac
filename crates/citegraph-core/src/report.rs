//! The change report emitted by every claim.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::group::GroupId;

/// Which groups a claim created, mutated or destroyed.
///
/// Downstream consumers learn what changed only from this report. A group is
/// in at most one of the three sets; `destroyed` maps every absorbed group to
/// its final survivor.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ChangeReport {
  pub created:   BTreeSet<GroupId>,
  pub mutated:   BTreeSet<GroupId>,
  pub destroyed: BTreeMap<GroupId, GroupId>,
}

impl ChangeReport {
  pub fn is_empty(&self) -> bool {
    self.created.is_empty() && self.mutated.is_empty() && self.destroyed.is_empty()
  }

  pub fn mark_created(&mut self, id: GroupId) {
    self.mutated.remove(&id);
    self.destroyed.remove(&id);
    self.created.insert(id);
  }

  /// Groups created in the same claim stay in `created`.
  pub fn mark_mutated(&mut self, id: GroupId) {
    if !self.created.contains(&id) && !self.destroyed.contains_key(&id) {
      self.mutated.insert(id);
    }
  }

  pub fn mark_destroyed(&mut self, id: GroupId, survivor: GroupId) {
    self.created.remove(&id);
    self.mutated.remove(&id);
    for target in self.destroyed.values_mut() {
      if *target == id {
        *target = survivor;
      }
    }
    self.destroyed.insert(id, survivor);
  }

  /// The live group that `id` ended up in.
  pub fn survivor_of(&self, id: GroupId) -> GroupId {
    let mut current = id;
    while let Some(next) = self.destroyed.get(&current) {
      current = *next;
    }
    current
  }

  /// Distinct survivors of all destroyed groups.
  pub fn survivors(&self) -> BTreeSet<GroupId> {
    self.destroyed.values().copied().collect()
  }

  /// Fold the report of a later claim into this one.
  pub fn absorb(&mut self, later: ChangeReport) {
    for (id, survivor) in later.destroyed {
      self.mark_destroyed(id, survivor);
    }
    for id in later.created {
      self.mark_created(id);
    }
    for id in later.mutated {
      self.mark_mutated(id);
    }
  }
}

#[cfg(test)]
mod tests {
  use uuid::Uuid;

  use super::*;

  fn g(n: u128) -> GroupId { GroupId(Uuid::from_u128(n)) }

  #[test]
  fn created_groups_are_not_also_mutated() {
    let mut r = ChangeReport::default();
    r.mark_created(g(1));
    r.mark_mutated(g(1));
    assert!(r.mutated.is_empty());
    assert_eq!(r.created.len(), 1);
  }

  #[test]
  fn destroyed_groups_leave_other_sets() {
    let mut r = ChangeReport::default();
    r.mark_created(g(2));
    r.mark_mutated(g(3));
    r.mark_destroyed(g(2), g(1));
    r.mark_destroyed(g(3), g(1));
    assert!(r.created.is_empty());
    assert!(r.mutated.is_empty());
    r.mark_mutated(g(3));
    assert!(r.mutated.is_empty());
  }

  #[test]
  fn absorb_collapses_chains() {
    let mut first = ChangeReport::default();
    first.mark_destroyed(g(3), g(2));
    first.mark_mutated(g(2));

    let mut second = ChangeReport::default();
    second.mark_destroyed(g(2), g(1));
    second.mark_mutated(g(1));

    first.absorb(second);
    assert_eq!(first.destroyed[&g(3)], g(1));
    assert_eq!(first.destroyed[&g(2)], g(1));
    assert_eq!(first.survivors(), BTreeSet::from([g(1)]));
    assert_eq!(first.mutated, BTreeSet::from([g(1)]));
    assert_eq!(first.survivor_of(g(3)), g(1));
  }

  #[test]
  fn empty_report() {
    assert!(ChangeReport::default().is_empty());
  }
}
