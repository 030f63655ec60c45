//! Handlers that persist a financial profile.
//!
//! | Method | Path                 | Notes |
//! |--------|----------------------|-------|
//! | `POST` | `/save-draft`        | Body: [`ProfileBody`]; creates or refreshes a draft |
//! | `POST` | `/submit-financials` | Body: [`ProfileBody`]; finalises the session |
//!
//! Both bodies are the profile fields with an optional `session_id` alongside
//! them. Invalid profiles are rejected with 422 and a per-field error list.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use kar_advisor::Advisor;
use kar_core::{profile::FinancialProfile, store::SessionStore};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, UserId, error::ApiError};

/// JSON body accepted by `POST /save-draft` and `POST /submit-financials`.
#[derive(Debug, Deserialize)]
pub struct ProfileBody {
  /// Absent or `null` starts a new session.
  #[serde(default)]
  pub session_id: Option<Uuid>,
  #[serde(flatten)]
  pub profile:    FinancialProfile,
}

// ─── Save draft ───────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DraftSaved {
  pub success:    bool,
  pub session_id: Uuid,
  pub draft_id:   Uuid,
  pub expires_at: Option<DateTime<Utc>>,
  pub message:    &'static str,
}

/// `POST /save-draft`
pub async fn save_draft<S, A>(
  State(state): State<ApiState<S, A>>,
  user: UserId,
  Json(body): Json<ProfileBody>,
) -> Result<Json<DraftSaved>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let session = match body.session_id {
    Some(id) => state.store.save_draft(id, user.0, body.profile).await,
    None => state.store.create_draft(user.0, body.profile).await,
  }
  .map_err(ApiError::classify)?;

  Ok(Json(DraftSaved {
    success:    true,
    session_id: session.session_id,
    draft_id:   session.session_id,
    expires_at: session.draft_expires_at,
    message:    "Draft saved successfully",
  }))
}

// ─── Submit ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Submitted {
  pub success:    bool,
  pub session_id: Uuid,
  pub message:    &'static str,
}

/// `POST /submit-financials`
pub async fn submit<S, A>(
  State(state): State<ApiState<S, A>>,
  user: UserId,
  Json(body): Json<ProfileBody>,
) -> Result<Json<Submitted>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let session = state
    .store
    .submit_financials(body.session_id, user.0, body.profile)
    .await
    .map_err(ApiError::classify)?;

  Ok(Json(Submitted {
    success:    true,
    session_id: session.session_id,
    message:    "Financial data submitted successfully",
  }))
}
