//! Handlers for saved drafts.
//!
//! | Method   | Path          | Notes |
//! |----------|---------------|-------|
//! | `GET`    | `/drafts`     | Caller's latest live draft; `[]` without `X-User-ID` |
//! | `GET`    | `/draft/{id}` | 401 without `X-User-ID`, 404 if missing, expired or another user's |
//! | `DELETE` | `/draft/{id}` | Same rules as `GET` |
//!
//! Saving a draft lives in [`crate::financials`] because it shares the
//! request body with submission.

use axum::{
  Json,
  extract::{Path, State},
};
use kar_advisor::Advisor;
use kar_core::{
  session::{Draft, Session},
  store::SessionStore,
};
use serde::Serialize;
use uuid::Uuid;

use crate::{ApiState, UserId, error::ApiError};

fn draft_not_found(id: Uuid) -> ApiError {
  ApiError::NotFound(format!("draft {id} not found or expired"))
}

/// Drafts saved anonymously are visible to anyone holding their id.
fn owned_by(session: &Session, user_id: &str) -> bool {
  session.user_id.as_deref().is_none_or(|owner| owner == user_id)
}

// ─── List ─────────────────────────────────────────────────────────────────────

/// `GET /drafts`
pub async fn list<S, A>(
  State(state): State<ApiState<S, A>>,
  user: UserId,
) -> Result<Json<Vec<Draft>>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let Some(user_id) = user.0 else {
    return Ok(Json(Vec::new()));
  };
  let drafts = state
    .store
    .list_drafts(&user_id)
    .await
    .map_err(ApiError::classify)?;
  Ok(Json(drafts))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /draft/{id}`
pub async fn get_one<S, A>(
  State(state): State<ApiState<S, A>>,
  Path(id): Path<Uuid>,
  user: UserId,
) -> Result<Json<Draft>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let user_id = user.required()?;
  let session = state.store.load_draft(id).await.map_err(ApiError::classify)?;
  if !owned_by(&session, &user_id) {
    return Err(draft_not_found(id));
  }
  Draft::from_session(session).map(Json).ok_or_else(|| draft_not_found(id))
}

// ─── Delete ───────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct DeleteResponse {
  pub success: bool,
  pub message: &'static str,
}

/// `DELETE /draft/{id}`
pub async fn delete_one<S, A>(
  State(state): State<ApiState<S, A>>,
  Path(id): Path<Uuid>,
  user: UserId,
) -> Result<Json<DeleteResponse>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let user_id = user.required()?;
  let session = state
    .store
    .get_session(id)
    .await
    .map_err(ApiError::classify)?
    .filter(|s| s.is_draft && owned_by(s, &user_id))
    .ok_or_else(|| draft_not_found(id))?;

  if !state
    .store
    .discard_draft(session.session_id)
    .await
    .map_err(ApiError::classify)?
  {
    return Err(draft_not_found(id));
  }
  tracing::info!(%id, "draft deleted");
  Ok(Json(DeleteResponse { success: true, message: "Draft deleted successfully" }))
}
