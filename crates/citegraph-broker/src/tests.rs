//! Broker tests against an in-memory SQLite store and index.

use std::{
  sync::atomic::{AtomicBool, AtomicUsize, Ordering},
  time::Duration,
};

use citegraph_core::{
  Classify, ErrorKind,
  claim::Claim,
  group::{GroupId, GroupKind, GroupView},
  identifier::Identifier,
  index::{ExternalOp, IndexSink},
  relation::{Relation, RelationVocabulary},
  relationship::Evidence,
  report::ChangeReport,
  store::GraphStore,
};
use citegraph_store_sqlite::SqliteStore;
use serde_json::{Value, json};
use uuid::Uuid;

use crate::{Broker, BrokerSettings, Event, MemoryIndex, SyncPolicy, SyncStatus};

/// Fails the first `failures` batches, then behaves like [`MemoryIndex`].
#[derive(Default)]
struct FlakyIndex {
  inner:    MemoryIndex,
  failures: AtomicUsize,
}

impl IndexSink for FlakyIndex {
  type Error = std::io::Error;

  async fn apply(&self, ops: &[ExternalOp]) -> std::io::Result<()> {
    let left = self.failures.load(Ordering::SeqCst);
    if left > 0 {
      self.failures.store(left - 1, Ordering::SeqCst);
      return Err(std::io::Error::other("index unavailable"));
    }
    self.inner.apply(ops).await.map_err(|never| match never {})
  }
}

/// A store whose reads fail while `blind` is set. Writes always go through.
struct BlindStore {
  inner: SqliteStore,
  blind: AtomicBool,
}

impl BlindStore {
  fn check(&self) -> citegraph_store_sqlite::Result<()> {
    if self.blind.load(Ordering::SeqCst) {
      return Err(citegraph_store_sqlite::Error::Decode("store unreadable".into()));
    }
    Ok(())
  }
}

impl GraphStore for BlindStore {
  type Error = citegraph_store_sqlite::Error;

  async fn apply_claim(
    &self,
    claim: Claim,
    timeout: Option<Duration>,
  ) -> citegraph_store_sqlite::Result<ChangeReport> {
    self.inner.apply_claim(claim, timeout).await
  }

  async fn resolve(&self, identifier: Identifier) -> citegraph_store_sqlite::Result<GroupId> {
    self.inner.resolve(identifier).await
  }

  async fn lookup(
    &self,
    identifier: Identifier,
  ) -> citegraph_store_sqlite::Result<Option<(GroupId, Option<GroupId>)>> {
    self.inner.lookup(identifier).await
  }

  async fn group_view(&self, id: GroupId) -> citegraph_store_sqlite::Result<Option<GroupView>> {
    self.check()?;
    self.inner.group_view(id).await
  }

  async fn list_groups(
    &self,
    kind: Option<GroupKind>,
  ) -> citegraph_store_sqlite::Result<Vec<GroupId>> {
    self.check()?;
    self.inner.list_groups(kind).await
  }
}

fn settings() -> BrokerSettings {
  BrokerSettings {
    sync: SyncPolicy { max_attempts: 2, initial_backoff_ms: 1, retry_interval_secs: 1 },
    ..BrokerSettings::default()
  }
}

async fn broker() -> Broker<SqliteStore, MemoryIndex> {
  let store = SqliteStore::open_in_memory().await.expect("in-memory store");
  Broker::new(store, MemoryIndex::new(), settings())
}

fn link(source: &str, relation: &str, target: &str) -> Value {
  json!({
    "Source": {"Identifier": {"ID": source, "IDScheme": "doi"}, "Title": format!("Title of {source}")},
    "RelationshipType": {"Name": relation},
    "Target": {"Identifier": {"ID": target, "IDScheme": "doi"}},
  })
}

fn event(links: Vec<Value>) -> Event {
  serde_json::from_value(json!({
    "ID": Uuid::new_v4(),
    "EventType": "RelationshipCreated",
    "Time": "2018-01-01T00:00:00Z",
    "Payload": links,
  }))
  .unwrap()
}

async fn group_of<I: IndexSink>(b: &Broker<SqliteStore, I>, value: &str) -> GroupId {
  b.lookup(Identifier::new("doi", value)).await.unwrap().identity
}

#[tokio::test]
async fn event_is_applied_and_indexed() {
  let b = broker().await;
  let outcome = b.submit_event(event(vec![link("a", "Cites", "b")])).await.unwrap();
  assert_eq!(outcome.claims, 1);
  assert_eq!(outcome.sync, SyncStatus::Applied { ops: 2 });

  let a = group_of(&b, "a").await;
  let target = group_of(&b, "b").await;
  let doc = b.index().get(a).await.unwrap();
  assert_eq!(doc["Title"], "Title of a");
  assert_eq!(doc["Relationships"]["cites"][0]["TargetID"], target.to_string());
  let cited = b.index().get(target).await.unwrap();
  assert_eq!(cited["Relationships"]["isCitedBy"][0]["TargetID"], a.to_string());
}

#[tokio::test]
async fn resubmitted_event_changes_nothing() {
  let b = broker().await;
  let e = event(vec![link("a", "Cites", "b"), link("a", "IsIdenticalTo", "c")]);
  b.submit_event(e.clone()).await.unwrap();
  let again = b.submit_event(e).await.unwrap();
  assert!(again.report.is_empty());
  assert_eq!(again.sync, SyncStatus::Applied { ops: 0 });
}

#[tokio::test]
async fn merge_removes_absorbed_document_and_refreshes_neighbor() {
  let b = broker().await;
  b.submit_event(event(vec![link("a", "Cites", "b"), link("a2", "Cites", "b")]))
    .await
    .unwrap();
  assert_eq!(b.index().len().await, 3);

  let outcome = b.submit_event(event(vec![link("a", "IsIdenticalTo", "a2")])).await.unwrap();
  assert_eq!(outcome.report.destroyed.len(), 1);
  let absorbed = *outcome.report.destroyed.keys().next().unwrap();

  let merged = group_of(&b, "a").await;
  let target = group_of(&b, "b").await;
  assert!(b.index().get(absorbed).await.is_none());
  assert_eq!(b.index().len().await, 2);

  let cited = b.index().get(target).await.unwrap();
  let by = cited["Relationships"]["isCitedBy"].as_array().unwrap();
  assert_eq!(by.len(), 1);
  assert_eq!(by[0]["TargetID"], merged.to_string());
  assert_eq!(by[0]["History"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn unlabelled_relation_is_rejected_before_mutation() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let b = Broker::new(store, MemoryIndex::new(), BrokerSettings {
    vocabulary: RelationVocabulary::from_entries([(Relation::Cites, "cites", "isCitedBy")]),
    ..settings()
  });

  let err = b
    .submit_event(event(vec![link("a", "Cites", "b"), link("a", "IsRelatedTo", "c")]))
    .await
    .unwrap_err();
  assert_eq!(err.kind(), ErrorKind::InvalidRelation);
  assert!(b.store().list_groups(None).await.unwrap().is_empty());
  assert_eq!(b.index().len().await, 0);
}

#[tokio::test]
async fn unknown_identifier_is_not_found() {
  let b = broker().await;
  let err = b.lookup(Identifier::new("doi", "nope")).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
  let err = b.group_view(GroupId(Uuid::nil())).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn failed_delivery_is_parked_and_retried() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let index = FlakyIndex { failures: AtomicUsize::new(3), ..FlakyIndex::default() };
  let b = Broker::new(store, index, settings());

  let outcome = b.submit_event(event(vec![link("a", "Cites", "b")])).await.unwrap();
  assert_eq!(outcome.sync, SyncStatus::Pending { groups: 2 });
  assert_eq!(b.pending_len().await, 2);

  assert!(b.retry_pending().await.is_err(), "third failure keeps the batch parked");
  assert_eq!(b.pending_len().await, 2);

  assert_eq!(b.retry_pending().await.unwrap(), 2);
  assert_eq!(b.pending_len().await, 0);
  assert_eq!(b.index().inner.len().await, 2);
}

#[tokio::test]
async fn retried_documents_reflect_the_current_graph() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let index = FlakyIndex { failures: AtomicUsize::new(2), ..FlakyIndex::default() };
  let b = Broker::new(store, index, settings());

  let first = b.submit_event(event(vec![link("a", "Cites", "b")])).await.unwrap();
  assert_eq!(first.sync, SyncStatus::Pending { groups: 2 });
  let second = b.submit_event(event(vec![link("c", "Cites", "b")])).await.unwrap();
  assert_eq!(second.sync, SyncStatus::Applied { ops: 2 });

  let cited = group_of(&b, "b").await;
  let cited_by = |doc: Value| doc["Relationships"]["isCitedBy"].as_array().unwrap().len();
  assert_eq!(cited_by(b.index().inner.get(cited).await.unwrap()), 2);

  assert_eq!(b.retry_pending().await.unwrap(), 2);
  assert_eq!(b.pending_len().await, 0);
  assert_eq!(cited_by(b.index().inner.get(cited).await.unwrap()), 2);
  assert!(b.index().inner.get(group_of(&b, "a").await).await.is_some());
}

#[tokio::test]
async fn parked_group_absorbed_later_is_deleted_on_retry() {
  let store = SqliteStore::open_in_memory().await.unwrap();
  let index = FlakyIndex { failures: AtomicUsize::new(2), ..FlakyIndex::default() };
  let b = Broker::new(store, index, settings());

  b.submit_event(event(vec![link("a", "Cites", "c")])).await.unwrap();
  b.submit_event(event(vec![link("a", "IsIdenticalTo", "b")])).await.unwrap();
  let survivor = group_of(&b, "a").await;

  b.retry_pending().await.unwrap();
  let ids = b.index().inner.ids().await;
  let absorbed: Vec<_> = [Identifier::new("doi", "a"), Identifier::new("doi", "b")]
    .iter()
    .map(GroupId::for_identifier)
    .filter(|id| *id != survivor)
    .collect();
  assert!(ids.contains(&survivor));
  assert!(absorbed.iter().all(|id| !ids.contains(id)));
}

#[tokio::test]
async fn unplannable_sync_keeps_the_applied_report() {
  let inner = SqliteStore::open_in_memory().await.unwrap();
  let store = BlindStore { inner, blind: AtomicBool::new(true) };
  let b = Broker::new(store, MemoryIndex::new(), settings());

  let outcome = b.submit_event(event(vec![link("a", "Cites", "b")])).await.unwrap();
  assert_eq!(outcome.report.created.len(), 2);
  assert_eq!(outcome.sync, SyncStatus::Pending { groups: 2 });
  assert!(b.retry_pending().await.is_err(), "reads still fail");
  assert_eq!(b.pending_len().await, 2);

  b.store().blind.store(false, Ordering::SeqCst);
  assert_eq!(b.retry_pending().await.unwrap(), 2);
  assert_eq!(b.index().len().await, 2);
}

#[tokio::test]
async fn citations_filter_on_citing_type() {
  let b = broker().await;
  let typed = |source: &str, kind: &str| {
    let mut l = link(source, "Cites", "target");
    l["Source"]["Type"] = json!({"Name": kind});
    l
  };
  b.submit_event(event(vec![
    typed("paper", "literature"),
    typed("tool", "software"),
    link("untyped", "Cites", "target"),
    link("target", "Cites", "elsewhere"),
  ]))
  .await
  .unwrap();

  let target = Identifier::new("doi", "target");
  let all = b.citations(target.clone(), None).await.unwrap();
  assert_eq!(all.len(), 3);

  let literature = b.citations(target.clone(), Some("literature")).await.unwrap();
  assert_eq!(literature.len(), 1);
  assert_eq!(literature[0].group_id, group_of(&b, "paper").await);
  assert_eq!(literature[0].metadata["Title"], "Title of paper");
  assert_eq!(literature[0].history.len(), 1);

  assert!(b.citations(target, Some("dataset")).await.unwrap().is_empty());
  let err = b.citations(Identifier::new("doi", "nope"), None).await.unwrap_err();
  assert_eq!(err.kind(), ErrorKind::NotFound);
}

#[tokio::test]
async fn reindex_rebuilds_every_document() {
  let b = broker().await;
  let at = chrono::Utc::now();
  for (n, (x, y)) in [("a", "b"), ("b", "c"), ("c", "d")].into_iter().enumerate() {
    let claim = Claim::new(
      Relation::Cites,
      Identifier::new("doi", x),
      Identifier::new("doi", y),
      Evidence::new(Uuid::from_u128(n as u128), at),
    );
    b.apply_claim(claim).await.unwrap();
  }
  b.apply_claim(Claim::new(
    Relation::HasVersion,
    Identifier::new("doi", "a"),
    Identifier::new("doi", "d"),
    Evidence::new(Uuid::from_u128(9), at),
  ))
  .await
  .unwrap();
  assert_eq!(b.index().len().await, 0);

  let upserted = b.reindex_all().await.unwrap();
  assert_eq!(upserted, 5, "four identity groups and one version group");
  assert_eq!(b.index().len().await, 5);
  let version = b.lookup(Identifier::new("doi", "a")).await.unwrap().version.unwrap();
  assert_eq!(b.index().get(version).await.unwrap()["GroupType"], "Version");
}

#[tokio::test]
async fn backoff_doubles() {
  let policy = SyncPolicy { max_attempts: 4, initial_backoff_ms: 50, retry_interval_secs: 0 };
  assert_eq!(policy.backoff(1), Duration::from_millis(50));
  assert_eq!(policy.backoff(3), Duration::from_millis(200));
  assert_eq!(policy.retry_interval(), Duration::from_secs(1));
}
