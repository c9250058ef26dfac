//! [`SqliteStore`]: the SQLite implementation of [`GraphStore`].

use std::{
  path::Path,
  time::{Duration, Instant},
};

use chrono::Utc;
use citegraph_core::{
  cache::GroupCache,
  claim::Claim,
  group::{GroupId, GroupKind, GroupView},
  identifier::Identifier,
  merge,
  report::ChangeReport,
  store::{GraphStore, GraphTxn},
};
use rusqlite::TransactionBehavior;
use tracing::debug;

use crate::{
  Error, Result,
  encode::encode_kind,
  schema::SCHEMA,
  txn::SqliteTxn,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A citegraph store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every write
/// runs in a `BEGIN IMMEDIATE` transaction on the connection's thread, so
/// claims are applied one at a time.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// How long SQLite waits on a lock held by another connection before
  /// failing with `SQLITE_BUSY`.
  pub async fn set_busy_timeout(&self, timeout: Duration) -> Result<()> {
    self
      .conn
      .call(move |conn| {
        conn.busy_timeout(timeout)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Run `f` on the connection thread. Errors raised by `f` come back as
  /// store errors rather than connection errors.
  async fn with_conn<R, F>(&self, f: F) -> Result<R>
  where
    F: FnOnce(&mut rusqlite::Connection) -> Result<R> + Send + 'static,
    R: Send + 'static,
  {
    self.conn.call(move |conn| Ok(f(conn))).await?
  }
}

fn check_deadline(deadline: Option<(Instant, Duration)>) -> Result<()> {
  match deadline {
    Some((at, limit)) if Instant::now() >= at => {
      Err(citegraph_core::Error::Timeout(limit).into())
    }
    _ => Ok(()),
  }
}

// ─── GraphStore impl ─────────────────────────────────────────────────────────

impl GraphStore for SqliteStore {
  type Error = Error;

  async fn apply_claim(
    &self,
    claim: Claim,
    timeout: Option<Duration>,
  ) -> Result<ChangeReport> {
    let deadline = timeout.map(|limit| (Instant::now() + limit, limit));
    let now = Utc::now();

    // The deadline is checked on the connection thread only: a claim that
    // reports a timeout never commits.
    self
      .with_conn(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        check_deadline(deadline)?;
        let report = {
          let mut txn = SqliteTxn::new(&tx, now);
          let mut cache = GroupCache::new();
          merge::apply_claim(&mut txn, &mut cache, &claim, now)?
        };
        // Dropping `tx` without committing rolls back.
        check_deadline(deadline)?;
        tx.commit()?;
        debug!(
          relation = %claim.relation,
          source = %claim.source,
          target = %claim.target,
          created = report.created.len(),
          mutated = report.mutated.len(),
          destroyed = report.destroyed.len(),
          "claim applied"
        );
        Ok(report)
      })
      .await
  }

  async fn resolve(&self, identifier: Identifier) -> Result<GroupId> {
    let now = Utc::now();
    self
      .with_conn(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let (id, report) = {
          let mut txn = SqliteTxn::new(&tx, now);
          merge::resolve(&mut txn, &mut GroupCache::new(), &identifier, now)?
        };
        tx.commit()?;
        if !report.is_empty() {
          debug!(%identifier, group = %id, "identity group created");
        }
        Ok(id)
      })
      .await
  }

  async fn lookup(&self, identifier: Identifier) -> Result<Option<(GroupId, Option<GroupId>)>> {
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let mut txn = SqliteTxn::new(&tx, Utc::now());
        let Some(identity) = txn.identifier_owner(&identifier)? else {
          return Ok(None);
        };
        let version = txn.version_of(identity)?;
        Ok(Some((identity, version)))
      })
      .await
  }

  async fn group_view(&self, id: GroupId) -> Result<Option<GroupView>> {
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        let mut txn = SqliteTxn::new(&tx, Utc::now());
        let Some(group) = txn.load_group(id)? else {
          return Ok(None);
        };
        let (identifiers, members, version_id) = match group.kind {
          GroupKind::Identity => (txn.identifiers_of(id)?, Vec::new(), txn.version_of(id)?),
          GroupKind::Version => (txn.member_identifiers(id)?, txn.members_of(id)?, None),
        };
        let relationships = txn.incident_relationships(id)?;
        Ok(Some(GroupView { group, identifiers, members, version_id, relationships }))
      })
      .await
  }

  async fn list_groups(&self, kind: Option<GroupKind>) -> Result<Vec<GroupId>> {
    self
      .with_conn(move |conn| {
        let tx = conn.transaction()?;
        SqliteTxn::new(&tx, Utc::now()).list_group_ids(kind.map(encode_kind))
      })
      .await
  }
}
