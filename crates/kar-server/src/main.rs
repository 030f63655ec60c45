//! kar server binary.
//!
//! Reads `kar.toml` (or the path given with `--config`), opens the SQLite
//! store, picks an advisor and serves the JSON API over HTTP.
//!
//! # Offline comparison
//!
//! To print the regime comparison for a profile without starting the server:
//!
//! ```sh
//! cargo run -p kar-server -- --compare profile.json
//! ```

use std::{path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context as _;
use clap::Parser;
use kar_advisor::AdvisorBackend;
use kar_api::ApiState;
use kar_server::{compare_file, expand_tilde, load_config, router, spawn_draft_purger};
use kar_store_sqlite::SqliteStore;
use tokio::net::TcpListener;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "Income-tax regime comparison server")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "kar.toml")]
  config: PathBuf,

  /// Print the regime comparison for a JSON profile file and exit.
  #[arg(long, value_name = "PROFILE_JSON")]
  compare: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  if let Some(path) = cli.compare {
    let comparison = compare_file(&path)?;
    println!("{}", serde_json::to_string_pretty(&comparison)?);
    return Ok(());
  }

  let server_cfg = load_config(&cli.config)?;

  let store_path = expand_tilde(&server_cfg.store_path);
  if let Some(dir) = store_path.parent().filter(|d| !d.as_os_str().is_empty()) {
    std::fs::create_dir_all(dir)
      .with_context(|| format!("failed to create {}", dir.display()))?;
  }
  let store = SqliteStore::open(&store_path)
    .await
    .with_context(|| format!("failed to open store at {store_path:?}"))?
    .with_draft_ttl(server_cfg.draft_ttl()?);
  let store = Arc::new(store);

  let advisor = AdvisorBackend::from_config(&server_cfg.advisor)
    .context("failed to build advisory client")?;
  tracing::info!(advisor = advisor.name(), "advisor ready");

  let state = ApiState {
    store:   store.clone(),
    advisor: Arc::new(advisor),
    policy:  server_cfg.advisor.call_policy(),
  };

  let purge_every = Duration::from_secs(server_cfg.purge_interval_secs.max(1));
  spawn_draft_purger(store, purge_every);

  let app = router(state);
  let address = server_cfg.address();

  tracing::info!("Listening on http://{address}");
  let listener = TcpListener::bind(&address)
    .await
    .with_context(|| format!("failed to bind {address}"))?;

  axum::serve(listener, app).await.context("server error")?;

  Ok(())
}
