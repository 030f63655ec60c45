//! Startup-time choice between the HTTP and rule-based advisors.

use std::time::Duration;

use kar_core::session::Exchange;
use serde::Deserialize;

use crate::{
  Advisor, AdvisorError, AdvisoryContext, CallPolicy, FinalAdvice, http::HttpAdvisor,
  rule_based::RuleBasedAdvisor,
};

/// `[advisor]` section of the server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct AdvisorConfig {
  /// Advisory service root. Unset selects the rule-based advisor.
  #[serde(default)]
  pub base_url:     Option<String>,
  #[serde(default)]
  pub api_key:      Option<String>,
  /// Deadline for a single advisory call.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 { 20 }

impl Default for AdvisorConfig {
  fn default() -> Self {
    Self { base_url: None, api_key: None, timeout_secs: default_timeout_secs() }
  }
}

impl AdvisorConfig {
  pub fn call_policy(&self) -> CallPolicy {
    CallPolicy::new(Duration::from_secs(self.timeout_secs))
  }
}

pub enum AdvisorBackend {
  Http(HttpAdvisor),
  RuleBased(RuleBasedAdvisor),
}

impl AdvisorBackend {
  pub fn from_config(config: &AdvisorConfig) -> Result<Self, AdvisorError> {
    match config.base_url.as_deref().map(str::trim) {
      Some(url) if !url.is_empty() => {
        tracing::info!(url, "using HTTP advisory service");
        Ok(Self::Http(HttpAdvisor::new(url, config.api_key.clone())?))
      }
      _ => {
        tracing::info!("no advisory service configured; using rule-based advisor");
        Ok(Self::RuleBased(RuleBasedAdvisor))
      }
    }
  }

  pub fn name(&self) -> &'static str {
    match self {
      Self::Http(_) => "http",
      Self::RuleBased(_) => "rule-based",
    }
  }
}

impl Advisor for AdvisorBackend {
  async fn opening_question(&self, context: &AdvisoryContext) -> Result<String, AdvisorError> {
    match self {
      Self::Http(a) => a.opening_question(context).await,
      Self::RuleBased(a) => a.opening_question(context).await,
    }
  }

  async fn follow_up_question(
    &self,
    context: &AdvisoryContext,
    transcript: &[Exchange],
  ) -> Result<String, AdvisorError> {
    match self {
      Self::Http(a) => a.follow_up_question(context, transcript).await,
      Self::RuleBased(a) => a.follow_up_question(context, transcript).await,
    }
  }

  async fn final_advice(
    &self,
    context: &AdvisoryContext,
    transcript: &[Exchange],
  ) -> Result<FinalAdvice, AdvisorError> {
    match self {
      Self::Http(a) => a.final_advice(context, transcript).await,
      Self::RuleBased(a) => a.final_advice(context, transcript).await,
    }
  }
}
