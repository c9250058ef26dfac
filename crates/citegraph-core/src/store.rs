//! Storage abstractions.
//!
//! [`GraphTxn`] is the synchronous, transaction-scoped interface the merge
//! engine drives: every call happens inside one serializable write
//! transaction owned by the backend. [`GraphStore`] is the async,
//! backend-level interface the broker and API depend on.

use std::{future::Future, time::Duration};

use crate::{
  Classify,
  claim::Claim,
  group::{Group, GroupId, GroupKind, GroupMetadata, GroupView},
  identifier::Identifier,
  relationship::{GroupRelationship, RelationshipKey},
  report::ChangeReport,
};

// ─── Transaction ─────────────────────────────────────────────────────────────

/// Row-level operations inside one write transaction.
///
/// Implementations need not enforce graph invariants; the merge engine does.
/// They must enforce referential integrity, so that a write referencing a
/// missing group fails instead of leaving a dangling row.
pub trait GraphTxn {
  type Error: From<crate::Error>;

  // ── Identifier Registry ───────────────────────────────────────────────

  fn identifier_owner(
    &mut self,
    identifier: &Identifier,
  ) -> Result<Option<GroupId>, Self::Error>;

  fn insert_identifier(
    &mut self,
    identifier: &Identifier,
    owner: GroupId,
  ) -> Result<(), Self::Error>;

  /// Reassign every identifier owned by `from` to `to`.
  fn move_identifiers(&mut self, from: GroupId, to: GroupId) -> Result<(), Self::Error>;

  // ── Groups ────────────────────────────────────────────────────────────

  fn load_group(&mut self, id: GroupId) -> Result<Option<Group>, Self::Error>;

  fn insert_group(&mut self, group: &Group) -> Result<(), Self::Error>;

  /// Replace (or clear) the metadata blob of a group.
  fn store_metadata(
    &mut self,
    id: GroupId,
    metadata: Option<&GroupMetadata>,
  ) -> Result<(), Self::Error>;

  fn delete_group(&mut self, id: GroupId) -> Result<(), Self::Error>;

  // ── Version membership ────────────────────────────────────────────────

  fn version_of(&mut self, identity: GroupId) -> Result<Option<GroupId>, Self::Error>;

  fn add_member(&mut self, version: GroupId, identity: GroupId) -> Result<(), Self::Error>;

  fn remove_member(&mut self, identity: GroupId) -> Result<(), Self::Error>;

  /// Move every member of version group `from` into `to`.
  fn move_members(&mut self, from: GroupId, to: GroupId) -> Result<(), Self::Error>;

  // ── Relationships ─────────────────────────────────────────────────────

  /// Every relationship with `group` as source or target.
  fn incident_relationships(
    &mut self,
    group: GroupId,
  ) -> Result<Vec<GroupRelationship>, Self::Error>;

  fn find_relationship(
    &mut self,
    key: &RelationshipKey,
  ) -> Result<Option<GroupRelationship>, Self::Error>;

  fn insert_relationship(&mut self, rel: &GroupRelationship) -> Result<(), Self::Error>;

  /// Overwrite endpoints and history of an existing relationship.
  fn update_relationship(&mut self, rel: &GroupRelationship) -> Result<(), Self::Error>;

  fn delete_relationship(&mut self, id: uuid::Uuid) -> Result<(), Self::Error>;
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A citegraph storage backend.
///
/// All methods return `Send` futures so the trait can be used from a
/// multi-threaded runtime (tokio with `axum`).
pub trait GraphStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  /// Apply one claim atomically and report what changed.
  ///
  /// If `timeout` elapses before the transaction commits, it is rolled back
  /// and the call fails with a timeout error.
  fn apply_claim(
    &self,
    claim: Claim,
    timeout: Option<Duration>,
  ) -> impl Future<Output = Result<ChangeReport, Self::Error>> + Send + '_;

  /// Return the identity group owning `identifier`, creating it if absent.
  fn resolve(
    &self,
    identifier: Identifier,
  ) -> impl Future<Output = Result<GroupId, Self::Error>> + Send + '_;

  /// Read-only resolution: the owning identity group and its version group.
  fn lookup(
    &self,
    identifier: Identifier,
  ) -> impl Future<Output = Result<Option<(GroupId, Option<GroupId>)>, Self::Error>>
  + Send
  + '_;

  /// Everything needed to project and index one group, from one committed
  /// snapshot. `None` if the group does not exist.
  fn group_view(
    &self,
    id: GroupId,
  ) -> impl Future<Output = Result<Option<GroupView>, Self::Error>> + Send + '_;

  /// Ids of every existing group, optionally of one kind, sorted.
  fn list_groups(
    &self,
    kind: Option<GroupKind>,
  ) -> impl Future<Output = Result<Vec<GroupId>, Self::Error>> + Send + '_;
}
