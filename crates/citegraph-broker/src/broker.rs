//! [`Broker`]: claim intake, index synchronisation and reindexing over a
//! store and an index sink.

use std::{sync::Arc, time::Duration};

use citegraph_core::{
  Classify as _,
  claim::Claim,
  group::{GroupId, GroupView},
  identifier::Identifier,
  index::{ExternalOp, IndexSink, plan_sync, plan_upserts},
  projection::{Citation, RelationshipSummary, citations, project_group},
  relation::RelationVocabulary,
  report::ChangeReport,
  store::GraphStore,
};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::{Error, Result, event::Event};

/// Groups per reindex batch.
const REINDEX_BATCH: usize = 500;

// ─── Settings ────────────────────────────────────────────────────────────────

/// How planned index operations are delivered.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncPolicy {
  /// Delivery attempts per batch before it is parked as pending.
  pub max_attempts:        u32,
  /// Delay before the second attempt; doubles on every further attempt.
  pub initial_backoff_ms:  u64,
  /// Period of the background task that retries pending operations.
  pub retry_interval_secs: u64,
}

impl Default for SyncPolicy {
  fn default() -> Self {
    Self { max_attempts: 3, initial_backoff_ms: 100, retry_interval_secs: 30 }
  }
}

impl SyncPolicy {
  /// Delay after failed attempt number `attempt` (1-based).
  pub fn backoff(&self, attempt: u32) -> Duration {
    let factor = 2u64.saturating_pow(attempt.saturating_sub(1));
    Duration::from_millis(self.initial_backoff_ms.saturating_mul(factor))
  }

  pub fn retry_interval(&self) -> Duration { Duration::from_secs(self.retry_interval_secs.max(1)) }
}

#[derive(Debug, Clone)]
pub struct BrokerSettings {
  pub vocabulary:        RelationVocabulary,
  pub claim_timeout:     Option<Duration>,
  pub max_payload_links: usize,
  pub sync:              SyncPolicy,
}

impl Default for BrokerSettings {
  fn default() -> Self {
    Self {
      vocabulary:        RelationVocabulary::default(),
      claim_timeout:     Some(Duration::from_secs(10)),
      max_payload_links: 500,
      sync:              SyncPolicy::default(),
    }
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum SyncStatus {
  /// Every planned operation reached the index.
  Applied { ops: usize },
  /// Delivery or planning failed; the affected groups wait in the pending
  /// queue and are re-projected when it is retried.
  Pending { groups: usize },
}

#[derive(Debug, Clone, Serialize)]
pub struct EventOutcome {
  pub event_id: Uuid,
  pub claims:   usize,
  pub report:   ChangeReport,
  pub sync:     SyncStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct IdentifierOwner {
  pub identity: GroupId,
  pub version:  Option<GroupId>,
}

// ─── Broker ──────────────────────────────────────────────────────────────────

pub struct Broker<S, I> {
  store:    S,
  index:    I,
  settings: BrokerSettings,
  /// Groups whose index documents are out of date. Parked groups are kept
  /// as a change report rather than as planned operations, so a retry always
  /// sends documents built from the current graph.
  pending:  Mutex<ChangeReport>,
}

impl<S: GraphStore, I: IndexSink> Broker<S, I> {
  pub fn new(store: S, index: I, settings: BrokerSettings) -> Self {
    Self { store, index, settings, pending: Mutex::new(ChangeReport::default()) }
  }

  pub fn store(&self) -> &S { &self.store }

  pub fn index(&self) -> &I { &self.index }

  pub fn settings(&self) -> &BrokerSettings { &self.settings }

  // ── Intake ────────────────────────────────────────────────────────────

  /// Apply every link of `event` and synchronise the index once.
  ///
  /// All links are converted and validated before anything is applied.
  /// Each claim commits on its own; if one fails, the claims before it stay
  /// applied and are still synchronised before the error is returned. A
  /// failure to plan the index operations parks the report instead of
  /// failing the event.
  pub async fn submit_event(&self, event: Event) -> Result<EventOutcome> {
    let claims = event.claims(self.settings.max_payload_links)?;
    for claim in &claims {
      self.settings.vocabulary.validate(claim.relation)?;
    }

    let mut report = ChangeReport::default();
    let mut failure = None;
    for claim in claims.iter().cloned() {
      match self.apply_validated(claim).await {
        Ok(r) => report.absorb(r),
        Err(e) => {
          failure = Some(e);
          break;
        }
      }
    }

    let sync = match self.sync(&report).await {
      Ok(sync) => sync,
      Err(e) => {
        warn!(event = %event.id, error = %e, "sync planning failed; parking changes");
        self.park(report.clone()).await
      }
    };
    if let Some(e) = failure {
      warn!(
        event = %event.id,
        error = %e,
        retriable = e.kind().is_retriable(),
        "event partially applied"
      );
      return Err(e);
    }
    info!(event = %event.id, claims = claims.len(), ?sync, "event processed");
    Ok(EventOutcome { event_id: event.id, claims: claims.len(), report, sync })
  }

  /// Apply one claim without synchronising the index.
  pub async fn apply_claim(&self, claim: Claim) -> Result<ChangeReport> {
    self.settings.vocabulary.validate(claim.relation)?;
    self.apply_validated(claim).await
  }

  async fn apply_validated(&self, claim: Claim) -> Result<ChangeReport> {
    self
      .store
      .apply_claim(claim, self.settings.claim_timeout)
      .await
      .map_err(Error::store)
  }

  // ── Synchronisation ───────────────────────────────────────────────────

  /// Plan and deliver the index operations for `report`.
  ///
  /// Delivery failures never fail the call: after the retry budget is spent
  /// the operations are parked and [`SyncStatus::Pending`] is returned. Only
  /// a failure to read the graph while planning is an error.
  pub async fn sync(&self, report: &ChangeReport) -> Result<SyncStatus> {
    if report.is_empty() {
      return Ok(SyncStatus::Applied { ops: 0 });
    }
    let ops = plan_sync(&self.store, report, &self.settings.vocabulary)
      .await
      .map_err(Error::store)?;
    debug!(ops = ops.len(), "sync planned");
    Ok(self.deliver(ops).await)
  }

  async fn deliver(&self, ops: Vec<ExternalOp>) -> SyncStatus {
    let count = ops.len();
    if count == 0 {
      return SyncStatus::Applied { ops: 0 };
    }
    let policy = &self.settings.sync;
    let attempts = policy.max_attempts.max(1);
    for attempt in 1..=attempts {
      match self.index.apply(&ops).await {
        Ok(()) => return SyncStatus::Applied { ops: count },
        Err(e) => {
          warn!(attempt, max_attempts = attempts, error = %e, "index delivery failed");
          if attempt < attempts {
            tokio::time::sleep(policy.backoff(attempt)).await;
          }
        }
      }
    }
    error!(ops = count, "index delivery exhausted retries; parking groups");
    let mut parked = ChangeReport::default();
    for op in &ops {
      parked.mark_mutated(op.id());
    }
    self.park(parked).await
  }

  async fn park(&self, report: ChangeReport) -> SyncStatus {
    let mut pending = self.pending.lock().await;
    pending.absorb(report);
    SyncStatus::Pending { groups: pending_groups(&pending) }
  }

  /// Number of groups waiting for their documents to be re-sent.
  pub async fn pending_len(&self) -> usize { pending_groups(&*self.pending.lock().await) }

  /// Try once to deliver the parked groups. Their documents are rebuilt
  /// from the current graph; a group that no longer exists is deleted.
  /// Returns how many operations were delivered; on failure the groups stay
  /// parked.
  pub async fn retry_pending(&self) -> Result<usize> {
    let parked = std::mem::take(&mut *self.pending.lock().await);
    if parked.is_empty() {
      return Ok(0);
    }
    let planned = plan_sync(&self.store, &parked, &self.settings.vocabulary).await;
    let ops = match planned {
      Ok(ops) => ops,
      Err(e) => {
        self.pending.lock().await.absorb(parked);
        return Err(Error::store(e));
      }
    };
    match self.index.apply(&ops).await {
      Ok(()) => Ok(ops.len()),
      Err(e) => {
        self.pending.lock().await.absorb(parked);
        Err(Error::index(e))
      }
    }
  }

  /// Periodically retry parked operations. Runs until the task is dropped.
  pub async fn run_retry_loop(self: Arc<Self>) {
    let mut ticker = tokio::time::interval(self.settings.sync.retry_interval());
    loop {
      ticker.tick().await;
      match self.retry_pending().await {
        Ok(0) => {}
        Ok(n) => info!(ops = n, "delivered pending index operations"),
        Err(e) => warn!(error = %e, "pending index operations still failing"),
      }
    }
  }

  /// Re-project and upsert every group. Has no effect on the graph.
  /// Returns the number of documents upserted.
  pub async fn reindex_all(&self) -> Result<usize> {
    let ids = self.store.list_groups(None).await.map_err(Error::store)?;
    let mut upserted = 0;
    for batch in ids.chunks(REINDEX_BATCH) {
      let ops = plan_upserts(&self.store, batch, &self.settings.vocabulary)
        .await
        .map_err(Error::store)?;
      upserted += ops.len();
      if let SyncStatus::Pending { groups } = self.deliver(ops).await {
        warn!(groups, "reindex batch parked");
      }
    }
    info!(groups = ids.len(), upserted, "reindex complete");
    Ok(upserted)
  }

  // ── Reads ─────────────────────────────────────────────────────────────

  pub async fn lookup(&self, identifier: Identifier) -> Result<IdentifierOwner> {
    let found = self.store.lookup(identifier.clone()).await.map_err(Error::store)?;
    let (identity, version) = found.ok_or_else(|| citegraph_core::Error::NotFound {
      scheme: identifier.scheme,
      value:  identifier.value,
    })?;
    Ok(IdentifierOwner { identity, version })
  }

  pub async fn group_view(&self, id: GroupId) -> Result<GroupView> {
    let view = self.store.group_view(id).await.map_err(Error::store)?;
    Ok(view.ok_or(citegraph_core::Error::GroupNotFound(id))?)
  }

  /// Groups citing the identity group that owns `identifier`, optionally
  /// only those of `target_type`.
  pub async fn citations(
    &self,
    identifier: Identifier,
    target_type: Option<&str>,
  ) -> Result<Vec<Citation>> {
    let owner = self.lookup(identifier).await?;
    let found = citations(&self.store, owner.identity, &self.settings.vocabulary, target_type)
      .await
      .map_err(Error::store)?;
    Ok(found.ok_or(citegraph_core::Error::GroupNotFound(owner.identity))?)
  }

  pub async fn relationships(&self, id: GroupId) -> Result<RelationshipSummary> {
    let summary = project_group(&self.store, id, &self.settings.vocabulary)
      .await
      .map_err(Error::store)?;
    Ok(summary.ok_or(citegraph_core::Error::GroupNotFound(id))?)
  }
}

fn pending_groups(report: &ChangeReport) -> usize {
  report.created.len() + report.mutated.len() + report.destroyed.len()
}
