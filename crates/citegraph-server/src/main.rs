//! citegraph server binary.
//!
//! Reads `config.toml` (or the path specified with `--config`), opens the
//! SQLite graph store and the configured index sink, then either serves the
//! REST API or runs a one-off batch job.
//!
//! ```
//! citegraph serve
//! citegraph load ./events/
//! citegraph reindex
//! ```

mod index;
mod settings;

use std::{
  path::{Path, PathBuf},
  sync::Arc,
};

use anyhow::Context as _;
use citegraph_broker::{Broker, Event};
use citegraph_core::store::GraphStore;
use citegraph_store_sqlite::SqliteStore;
use clap::{Parser, Subcommand};
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::{info, level_filters::LevelFilter, warn};
use tracing_subscriber::EnvFilter;

use crate::{index::AnyIndex, settings::ServerConfig};

type AppBroker = Broker<SqliteStore, AnyIndex>;

#[derive(Parser)]
#[command(author, version, about = "Scholarly link graph server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
  /// Serve the REST API (the default).
  Serve,
  /// Submit every `*.json` event file in a directory, in name order.
  Load { dir: PathBuf },
  /// Re-project every group and upsert its index document.
  Reindex,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  // Initialise tracing.
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();
  let server_cfg = ServerConfig::load(&cli.config)?;

  // Expand `~` in store path.
  let store_path = settings::expand_tilde(&server_cfg.store_path);

  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?;
  store
    .set_busy_timeout(server_cfg.busy_timeout())
    .await
    .context("failed to set busy timeout")?;

  let broker = Arc::new(Broker::new(
    store,
    server_cfg.build_index(),
    server_cfg.broker_settings(),
  ));

  if let AnyIndex::BulkFile(index) = broker.index() {
    info!(path = %index.path().display(), "index operations go to bulk file");
  }

  match cli.command.unwrap_or(Command::Serve) {
    Command::Serve => serve(broker, &server_cfg).await,
    Command::Load { dir } => load(&broker, &dir).await,
    Command::Reindex => {
      let upserted = broker.reindex_all().await.context("reindex failed")?;
      report_pending(&broker).await;
      info!(upserted, "reindex finished");
      Ok(())
    }
  }
}

async fn serve(broker: Arc<AppBroker>, server_cfg: &ServerConfig) -> anyhow::Result<()> {
  tokio::spawn(broker.clone().run_retry_loop());

  let app = citegraph_api::api_router(broker).layer(TraceLayer::new_for_http());
  let address = server_cfg.address();

  info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app)
    .with_graceful_shutdown(async {
      let _ = tokio::signal::ctrl_c().await;
    })
    .await
    .context("server error")?;

  Ok(())
}

async fn load(broker: &AppBroker, dir: &Path) -> anyhow::Result<()> {
  let mut files = Vec::new();
  let mut entries = tokio::fs::read_dir(dir)
    .await
    .with_context(|| format!("failed to read {dir:?}"))?;
  while let Some(entry) = entries.next_entry().await? {
    let path = entry.path();
    if path.extension().is_some_and(|ext| ext == "json") {
      files.push(path);
    }
  }
  files.sort();

  let (mut applied, mut failed) = (0usize, 0usize);
  for path in &files {
    match submit_file(broker, path).await {
      Ok(()) => applied += 1,
      Err(e) => {
        failed += 1;
        warn!(file = %path.display(), error = %format!("{e:#}"), "event skipped");
      }
    }
  }

  report_pending(broker).await;
  let groups = broker.store().list_groups(None).await.context("failed to count groups")?;
  info!(files = files.len(), applied, failed, groups = groups.len(), "load finished");
  Ok(())
}

async fn submit_file(broker: &AppBroker, path: &Path) -> anyhow::Result<()> {
  let raw = tokio::fs::read_to_string(path).await.context("read failed")?;
  let event: Event = serde_json::from_str(&raw).context("not a valid event")?;
  broker.submit_event(event).await?;
  Ok(())
}

/// One last delivery attempt for parked groups before a batch job exits.
async fn report_pending(broker: &AppBroker) {
  if broker.pending_len().await == 0 {
    return;
  }
  match broker.retry_pending().await {
    Ok(n) => info!(ops = n, "delivered pending index operations"),
    Err(e) => {
      let left = broker.pending_len().await;
      warn!(groups = left, error = %e, "index documents left stale");
    }
  }
}
