//! Handlers for the advisory conversation.
//!
//! | Method | Path                                       | Notes |
//! |--------|--------------------------------------------|-------|
//! | `POST` | `/ai-advisor/start-conversation`           | Body: `{"session_id"}`; needs a stored comparison |
//! | `POST` | `/ai-advisor/process-response`             | Body: [`ResponseBody`] |
//! | `GET`  | `/ai-advisor/recommendations/{session_id}` | `[]` until a conversation completes |
//! | `GET`  | `/ai-advisor/conversation/{session_id}`    | Transcript of the completed conversation |
//!
//! The server keeps nothing between rounds: the client sends back the
//! pending question, its round and every earlier exchange, and the
//! conversation is rebuilt from them on each request. Only the final outcome
//! is stored.

use axum::{
  Json,
  extract::{Path, State},
};
use kar_advisor::{Advisor, AdvisoryContext, Conversation, Turn};
use kar_core::{
  recommendation::Recommendation,
  session::Exchange,
  store::SessionStore,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError, tax::SessionBody};

/// The advisory context for a submitted session with a stored comparison.
async fn context<S: SessionStore>(
  store: &S,
  session_id: Uuid,
) -> Result<AdvisoryContext, ApiError> {
  let session = store.load_submitted(session_id).await.map_err(ApiError::classify)?;
  let comparison = store
    .get_comparison(session_id)
    .await
    .map_err(ApiError::classify)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("tax results not found for session {session_id}"))
    })?;
  Ok(AdvisoryContext::new(&session.profile, &comparison))
}

// ─── Start ────────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Started {
  pub success:           bool,
  pub question:          String,
  pub round:             u32,
  pub session_id:        Uuid,
  pub financial_summary: AdvisoryContext,
}

/// `POST /ai-advisor/start-conversation`
pub async fn start_conversation<S, A>(
  State(state): State<ApiState<S, A>>,
  Json(body): Json<SessionBody>,
) -> Result<Json<Started>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let session_id = body.session_id;
  let context = context(state.store.as_ref(), session_id).await?;

  let mut conversation =
    Conversation::new(state.advisor.as_ref(), context.clone(), state.policy);
  let Turn::Question { round, question } = conversation.start().await? else {
    return Err(ApiError::BadRequest("conversation ended before it began".to_owned()));
  };

  Ok(Json(Started {
    success: true,
    question,
    round,
    session_id,
    financial_summary: context,
  }))
}

// ─── Respond ──────────────────────────────────────────────────────────────────

/// JSON body accepted by `POST /ai-advisor/process-response`.
#[derive(Debug, Deserialize)]
pub struct ResponseBody {
  pub session_id: Uuid,
  /// The question being answered.
  pub question:   String,
  pub response:   String,
  pub round:      u32,
  /// Every earlier exchange, oldest first.
  #[serde(default)]
  pub history:    Vec<Exchange>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum Processed {
  Question {
    success:    bool,
    is_final:   bool,
    question:   String,
    round:      u32,
    session_id: Uuid,
  },
  Final {
    success:              bool,
    is_final:             bool,
    recommendations:      Vec<Recommendation>,
    conversation_summary: String,
    session_id:           Uuid,
  },
}

/// `POST /ai-advisor/process-response`
///
/// Answers the pending question. Returns the next question, or the final
/// recommendations once the last round is answered. The outcome is stored
/// only at that point.
pub async fn process_response<S, A>(
  State(state): State<ApiState<S, A>>,
  Json(body): Json<ResponseBody>,
) -> Result<Json<Processed>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let session_id = body.session_id;
  let context = context(state.store.as_ref(), session_id).await?;

  let mut conversation = Conversation::resume(
    state.advisor.as_ref(),
    context,
    body.history,
    body.round,
    body.question,
    state.policy,
  )?;

  match conversation.submit_response(body.round, &body.response).await? {
    Turn::Question { round, question } => Ok(Json(Processed::Question {
      success: true,
      is_final: false,
      question,
      round,
      session_id,
    })),
    Turn::Final(_) => {
      let outcome = conversation.outcome(session_id).ok_or_else(|| {
        ApiError::BadRequest("conversation did not complete".to_owned())
      })?;
      let outcome = state.store.record_advice(outcome).await.map_err(ApiError::classify)?;
      tracing::info!(%session_id, "advisory outcome stored");
      Ok(Json(Processed::Final {
        success: true,
        is_final: true,
        recommendations: outcome.recommendations,
        conversation_summary: outcome.conversation_summary,
        session_id,
      }))
    }
  }
}

// ─── Stored outcome ───────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct StoredRecommendations {
  pub success:              bool,
  pub recommendations:      Vec<Recommendation>,
  pub conversation_summary: Option<String>,
  pub session_id:           Uuid,
}

/// `GET /ai-advisor/recommendations/{session_id}`
pub async fn recommendations<S, A>(
  State(state): State<ApiState<S, A>>,
  Path(session_id): Path<Uuid>,
) -> Result<Json<StoredRecommendations>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let outcome = state.store.get_advice(session_id).await.map_err(ApiError::classify)?;
  let (recommendations, conversation_summary) = match outcome {
    Some(o) => (o.recommendations, Some(o.conversation_summary)),
    None => (Vec::new(), None),
  };
  Ok(Json(StoredRecommendations {
    success: true,
    recommendations,
    conversation_summary,
    session_id,
  }))
}

#[derive(Debug, Serialize)]
pub struct StoredConversation {
  pub success:       bool,
  pub conversations: Vec<Exchange>,
  pub session_id:    Uuid,
}

/// `GET /ai-advisor/conversation/{session_id}`
pub async fn conversation<S, A>(
  State(state): State<ApiState<S, A>>,
  Path(session_id): Path<Uuid>,
) -> Result<Json<StoredConversation>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let conversations = state
    .store
    .get_advice(session_id)
    .await
    .map_err(ApiError::classify)?
    .map(|o| o.transcript)
    .unwrap_or_default();
  Ok(Json(StoredConversation { success: true, conversations, session_id }))
}
