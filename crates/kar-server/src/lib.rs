//! Assembly of the kar HTTP server: configuration, the top-level router and
//! background maintenance.

use std::{
  path::{Path, PathBuf},
  sync::Arc,
  time::Duration,
};

use anyhow::{Context as _, bail};
use axum::{Json, Router, routing::get};
use chrono::{DateTime, TimeDelta, Utc};
use kar_advisor::{Advisor, AdvisorConfig};
use kar_api::ApiState;
use kar_core::{comparator, profile::FinancialProfile, store::SessionStore};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::{task::JoinHandle, time::MissedTickBehavior};
use tower_http::trace::TraceLayer;

// ─── Configuration ────────────────────────────────────────────────────────────

/// Runtime server configuration, deserialised from `kar.toml` and `KAR_*`
/// environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
  #[serde(default = "default_host")]
  pub host:                String,
  #[serde(default = "default_port")]
  pub port:                u16,
  /// SQLite database file. A leading `~/` is expanded.
  #[serde(default = "default_store_path")]
  pub store_path:          PathBuf,
  #[serde(default = "default_draft_ttl_days")]
  pub draft_ttl_days:      i64,
  /// How often expired drafts are deleted.
  #[serde(default = "default_purge_interval_secs")]
  pub purge_interval_secs: u64,
  #[serde(default)]
  pub advisor:             AdvisorConfig,
}

fn default_host() -> String { "127.0.0.1".to_owned() }

fn default_port() -> u16 { 8000 }

fn default_store_path() -> PathBuf { PathBuf::from("~/.local/share/kar/kar.db") }

fn default_draft_ttl_days() -> i64 { kar_store_sqlite::DEFAULT_DRAFT_TTL_DAYS }

fn default_purge_interval_secs() -> u64 { 3600 }

impl ServerConfig {
  pub fn address(&self) -> String { format!("{}:{}", self.host, self.port) }

  /// `draft_ttl_days` as a duration. Must be at least one day.
  pub fn draft_ttl(&self) -> anyhow::Result<TimeDelta> {
    if self.draft_ttl_days < 1 {
      bail!("draft_ttl_days must be at least 1, got {}", self.draft_ttl_days);
    }
    TimeDelta::try_days(self.draft_ttl_days)
      .with_context(|| format!("draft_ttl_days {} is out of range", self.draft_ttl_days))
  }
}

/// Layer the optional TOML file at `path` under `KAR_`-prefixed environment
/// variables. Nested keys use `__`, e.g. `KAR_ADVISOR__BASE_URL`.
pub fn load_config(path: &Path) -> anyhow::Result<ServerConfig> {
  let settings = config::Config::builder()
    .add_source(config::File::from(path).required(false))
    .add_source(
      config::Environment::with_prefix("KAR")
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true),
    )
    .build()
    .context("failed to read config file")?;

  let config: ServerConfig = settings
    .try_deserialize()
    .context("failed to deserialise ServerConfig")?;
  config.draft_ttl()?;
  Ok(config)
}

/// Expand a leading `~` to the user's home directory.
pub fn expand_tilde(path: &Path) -> PathBuf {
  let s = path.to_string_lossy();
  if let Some(rest) = s.strip_prefix("~/")
    && let Ok(home) = std::env::var("HOME")
  {
    return PathBuf::from(home).join(rest);
  }
  path.to_path_buf()
}

// ─── Router ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Health {
  pub status:    &'static str,
  pub version:   &'static str,
  pub timestamp: DateTime<Utc>,
}

async fn health() -> Json<Health> {
  Json(Health {
    status:    "healthy",
    version:   env!("CARGO_PKG_VERSION"),
    timestamp: Utc::now(),
  })
}

/// `/health` plus the JSON API under `/api`, with request tracing.
pub fn router<S, A>(state: ApiState<S, A>) -> Router
where
  S: SessionStore + 'static,
  A: Advisor + 'static,
{
  Router::new()
    .route("/health", get(health))
    .nest("/api", kar_api::api_router(state))
    .layer(TraceLayer::new_for_http())
}

// ─── Maintenance ──────────────────────────────────────────────────────────────

/// Delete expired drafts every `every`, starting immediately.
pub fn spawn_draft_purger<S>(store: Arc<S>, every: Duration) -> JoinHandle<()>
where
  S: SessionStore + 'static,
{
  tokio::spawn(async move {
    let mut ticker = tokio::time::interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
      ticker.tick().await;
      match store.purge_expired_drafts().await {
        Ok(0) => {}
        Ok(purged) => tracing::info!(purged, "expired drafts removed"),
        Err(e) => tracing::warn!(error = %e, "draft purge failed"),
      }
    }
  })
}

// ─── Offline comparison ───────────────────────────────────────────────────────

/// Compare both regimes for the profile stored as JSON at `path`.
pub fn compare_file(path: &Path) -> anyhow::Result<serde_json::Value> {
  let text = std::fs::read_to_string(path)
    .with_context(|| format!("failed to read {}", path.display()))?;
  let profile: FinancialProfile = serde_json::from_str(&text)
    .with_context(|| format!("{} is not a financial profile", path.display()))?;
  let comparison = comparator::compare(&profile)?;
  Ok(json!({
    "calculation_details": comparison.details,
    "recommendations": comparison.recommendations,
  }))
}

#[cfg(test)]
mod tests {
  use axum::{
    body::Body,
    http::{Request, StatusCode},
  };
  use kar_advisor::{CallPolicy, rule_based::RuleBasedAdvisor};
  use kar_store_sqlite::SqliteStore;
  use tower::ServiceExt;

  use super::*;

  async fn state() -> ApiState<SqliteStore, RuleBasedAdvisor> {
    ApiState {
      store:   Arc::new(SqliteStore::open_in_memory().await.unwrap()),
      advisor: Arc::new(RuleBasedAdvisor),
      policy:  CallPolicy::default(),
    }
  }

  async fn get(uri: &str) -> (StatusCode, serde_json::Value) {
    let req = Request::builder().uri(uri).body(Body::empty()).unwrap();
    let resp = router(state().await).oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
  }

  #[tokio::test]
  async fn health_reports_version() {
    let (status, body) = get("/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["version"], env!("CARGO_PKG_VERSION"));
    assert!(body["timestamp"].is_string());
  }

  #[tokio::test]
  async fn api_is_nested() {
    let (status, body) = get("/api/drafts").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!([]));
  }

  #[test]
  fn missing_config_file_uses_defaults() {
    let path = std::env::temp_dir().join(format!("kar-{}.toml", uuid::Uuid::new_v4()));
    let config = load_config(&path).unwrap();
    assert_eq!(config.draft_ttl_days, 7);
    assert_eq!(config.advisor.timeout_secs, 20);
  }

  #[test]
  fn config_file_is_read() {
    let path = std::env::temp_dir().join(format!("kar-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(
      &path,
      "port = 9100\ndraft_ttl_days = 3\n\n[advisor]\nbase_url = \"http://advisor.local\"\n",
    )
    .unwrap();
    let config = load_config(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(config.port, 9100);
    assert_eq!(config.draft_ttl_days, 3);
    assert_eq!(config.advisor.base_url.as_deref(), Some("http://advisor.local"));
    assert!(config.address().ends_with(":9100"));
  }

  #[test]
  fn draft_ttl_must_be_a_sane_number_of_days() {
    for bad in ["0", "-3", "9223372036854775807"] {
      let path = std::env::temp_dir().join(format!("kar-{}.toml", uuid::Uuid::new_v4()));
      std::fs::write(&path, format!("draft_ttl_days = {bad}\n")).unwrap();
      let result = load_config(&path);
      std::fs::remove_file(&path).ok();
      assert!(result.is_err(), "draft_ttl_days = {bad} was accepted");
    }

    let path = std::env::temp_dir().join(format!("kar-{}.toml", uuid::Uuid::new_v4()));
    std::fs::write(&path, "draft_ttl_days = 30\n").unwrap();
    let config = load_config(&path).unwrap();
    std::fs::remove_file(&path).ok();
    assert_eq!(config.draft_ttl().unwrap(), TimeDelta::days(30));
  }

  #[test]
  fn tilde_expands_to_home() {
    let Ok(home) = std::env::var("HOME") else { return };
    assert_eq!(expand_tilde(Path::new("~/kar.db")), PathBuf::from(home).join("kar.db"));
    assert_eq!(expand_tilde(Path::new("/tmp/kar.db")), PathBuf::from("/tmp/kar.db"));
  }

  #[test]
  fn compares_a_profile_file() {
    let path = std::env::temp_dir().join(format!("kar-{}.json", uuid::Uuid::new_v4()));
    std::fs::write(
      &path,
      r#"{"financial_year":"2024-25","age":30,"gross_salary":1200000,
          "basic_salary":600000,"hra_received":240000,"rent_paid":300000,
          "deduction_80c":150000,"deduction_80d":25000}"#,
    )
    .unwrap();
    let out = compare_file(&path).unwrap();
    std::fs::remove_file(&path).ok();
    let details = &out["calculation_details"];
    assert_eq!(details["old_regime"]["total_tax"].as_f64(), Some(61880.0));
    assert_eq!(details["new_regime"]["total_tax"].as_f64(), Some(75400.0));
    assert_eq!(details["comparison"]["best_regime"], "old");
  }
}
