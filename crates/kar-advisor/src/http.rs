//! Async HTTP client for an external advisory service.
//!
//! Every stage is a `POST {base_url}/advise` with a JSON body
//! `{stage, context, context_text, transcript}`. Question stages answer
//! `{question}`; the final stage answers `{recommendations, summary}`.

use kar_core::session::Exchange;
use reqwest::Client;
use serde::{Deserialize, Serialize, de::DeserializeOwned};

use crate::{Advisor, AdvisorError, AdvisoryContext, FinalAdvice};

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "snake_case")]
enum Stage {
  Opening,
  FollowUp,
  Final,
}

#[derive(Serialize)]
struct AdviseRequest<'a> {
  stage:        Stage,
  context:      &'a AdvisoryContext,
  context_text: String,
  transcript:   &'a [Exchange],
}

#[derive(Deserialize)]
struct QuestionReply {
  question: String,
}

/// Cheap to clone; the inner [`reqwest::Client`] is `Arc`-based.
#[derive(Clone)]
pub struct HttpAdvisor {
  client:   Client,
  base_url: String,
  api_key:  Option<String>,
}

impl HttpAdvisor {
  /// Per-call deadlines are enforced by the conversation, not by the client.
  pub fn new(base_url: impl Into<String>, api_key: Option<String>) -> Result<Self, AdvisorError> {
    let client = Client::builder().build()?;
    Ok(Self { client, base_url: base_url.into(), api_key })
  }

  fn url(&self) -> String { format!("{}/advise", self.base_url.trim_end_matches('/')) }

  async fn post<T: DeserializeOwned>(
    &self,
    stage: Stage,
    context: &AdvisoryContext,
    transcript: &[Exchange],
  ) -> Result<T, AdvisorError> {
    let body = AdviseRequest {
      stage,
      context,
      context_text: context.describe(),
      transcript,
    };
    let mut req = self.client.post(self.url()).json(&body);
    if let Some(key) = &self.api_key {
      req = req.bearer_auth(key);
    }

    let resp = req.send().await?;
    if !resp.status().is_success() {
      return Err(AdvisorError::Status(resp.status().as_u16()));
    }
    let bytes = resp.bytes().await?;
    serde_json::from_slice(&bytes).map_err(|e| AdvisorError::Malformed(e.to_string()))
  }

  async fn question(
    &self,
    stage: Stage,
    context: &AdvisoryContext,
    transcript: &[Exchange],
  ) -> Result<String, AdvisorError> {
    let reply: QuestionReply = self.post(stage, context, transcript).await?;
    let question = reply.question.trim();
    if question.is_empty() {
      return Err(AdvisorError::Malformed("empty question".to_owned()));
    }
    Ok(question.to_owned())
  }
}

impl Advisor for HttpAdvisor {
  async fn opening_question(&self, context: &AdvisoryContext) -> Result<String, AdvisorError> {
    self.question(Stage::Opening, context, &[]).await
  }

  async fn follow_up_question(
    &self,
    context: &AdvisoryContext,
    transcript: &[Exchange],
  ) -> Result<String, AdvisorError> {
    self.question(Stage::FollowUp, context, transcript).await
  }

  async fn final_advice(
    &self,
    context: &AdvisoryContext,
    transcript: &[Exchange],
  ) -> Result<FinalAdvice, AdvisorError> {
    let advice: FinalAdvice = self.post(Stage::Final, context, transcript).await?;
    if advice.recommendations.is_empty() {
      return Err(AdvisorError::Malformed("no recommendations".to_owned()));
    }
    Ok(advice)
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{
    Arc,
    atomic::{AtomicUsize, Ordering},
  };

  use axum::{Json, Router, extract::State, http::StatusCode, routing::post};
  use kar_core::rules::Regime;
  use rust_decimal_macros::dec;
  use serde_json::{Value, json};

  use super::*;

  fn context() -> AdvisoryContext {
    AdvisoryContext {
      financial_year:           "2024-25".into(),
      gross_salary:             dec!(900000),
      hra_received:             dec!(0),
      rent_paid:                dec!(0),
      deduction_80c:            dec!(150000),
      deduction_80d:            dec!(0),
      old_regime_tax:           dec!(30000),
      new_regime_tax:           dec!(25000),
      best_regime:              Regime::New,
      tax_savings:              dec!(5000),
      old_regime_marginal_rate: 20,
    }
  }

  /// Serve `router` on an ephemeral port and return its base URL.
  async fn serve(router: Router) -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move { axum::serve(listener, router).await.unwrap() });
    format!("http://{addr}")
  }

  #[tokio::test]
  async fn posts_stage_and_reads_question() {
    async fn advise(Json(body): Json<Value>) -> Json<Value> {
      assert_eq!(body["context"]["best_regime"], "new");
      let stage = body["stage"].as_str().unwrap_or_default().to_owned();
      Json(json!({ "question": format!("  {stage} question  ") }))
    }
    let url = serve(Router::new().route("/advise", post(advise))).await;
    let advisor = HttpAdvisor::new(url, None).unwrap();

    let q = advisor.opening_question(&context()).await.unwrap();
    assert_eq!(q, "opening question");
    let q = advisor.follow_up_question(&context(), &[]).await.unwrap();
    assert_eq!(q, "follow_up question");
  }

  #[tokio::test]
  async fn final_stage_parses_recommendations() {
    async fn advise() -> Json<Value> {
      Json(json!({
        "recommendations": [{
          "type": "long_term_planning",
          "title": "Open an NPS account",
          "description": "Extra deduction under 80CCD(1B)",
          "priority": "medium",
          "estimated_savings": 10400
        }],
        "summary": "Discussed retirement"
      }))
    }
    let url = serve(Router::new().route("/advise", post(advise))).await;
    let advisor = HttpAdvisor::new(url, Some("secret".into())).unwrap();
    let advice = advisor.final_advice(&context(), &[]).await.unwrap();
    assert_eq!(advice.recommendations.len(), 1);
    assert_eq!(advice.recommendations[0].estimated_savings, dec!(10400));
    assert_eq!(advice.summary, "Discussed retirement");
  }

  #[tokio::test]
  async fn sends_bearer_key() {
    async fn advise(headers: axum::http::HeaderMap) -> Json<Value> {
      let auth = headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
      Json(json!({ "question": auth }))
    }
    let url = serve(Router::new().route("/advise", post(advise))).await;
    let advisor = HttpAdvisor::new(url, Some("k3y".into())).unwrap();
    let q = advisor.opening_question(&context()).await.unwrap();
    assert_eq!(q, "Bearer k3y");
  }

  #[tokio::test]
  async fn server_errors_and_bad_bodies_are_reported() {
    let hits = Arc::new(AtomicUsize::new(0));
    async fn fail(State(hits): State<Arc<AtomicUsize>>) -> StatusCode {
      hits.fetch_add(1, Ordering::SeqCst);
      StatusCode::INTERNAL_SERVER_ERROR
    }
    let url = serve(
      Router::new()
        .route("/advise", post(fail))
        .with_state(hits.clone()),
    )
    .await;
    let advisor = HttpAdvisor::new(url, None).unwrap();
    let err = advisor.opening_question(&context()).await.unwrap_err();
    assert!(matches!(err, AdvisorError::Status(500)));
    assert_eq!(hits.load(Ordering::SeqCst), 1);

    async fn garbage() -> &'static str { "not json" }
    let url = serve(Router::new().route("/advise", post(garbage))).await;
    let advisor = HttpAdvisor::new(url, None).unwrap();
    let err = advisor.opening_question(&context()).await.unwrap_err();
    assert!(matches!(err, AdvisorError::Malformed(_)));
  }

  #[tokio::test]
  async fn unreachable_service_is_a_transport_error() {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    let advisor = HttpAdvisor::new(format!("http://{addr}"), None).unwrap();
    let err = advisor.opening_question(&context()).await.unwrap_err();
    assert!(matches!(err, AdvisorError::Transport(_)));
  }
}
