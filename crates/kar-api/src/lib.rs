//! JSON REST API for kar.
//!
//! Exposes an axum [`Router`] backed by any [`kar_core::store::SessionStore`]
//! and any [`kar_advisor::Advisor`]. Callers are identified by the
//! `X-User-ID` header, which is trusted as given; issuing it is the caller's
//! responsibility.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", kar_api::api_router(state))
//! ```

pub mod advisor;
pub mod drafts;
pub mod error;
pub mod financials;
pub mod tax;

use std::{convert::Infallible, sync::Arc};

use axum::{
  Router,
  extract::FromRequestParts,
  http::request::Parts,
  routing::{get, post},
};
use kar_advisor::{Advisor, CallPolicy};
use kar_core::store::SessionStore;

pub use error::ApiError;

/// Header carrying the caller's opaque user id.
pub const USER_ID_HEADER: &str = "x-user-id";

/// Shared state threaded through all API handlers.
pub struct ApiState<S, A> {
  pub store:   Arc<S>,
  pub advisor: Arc<A>,
  /// Deadline and retry budget for each advisory call.
  pub policy:  CallPolicy,
}

impl<S, A> Clone for ApiState<S, A> {
  fn clone(&self) -> Self {
    Self {
      store:   self.store.clone(),
      advisor: self.advisor.clone(),
      policy:  self.policy,
    }
  }
}

/// The `X-User-ID` header, if present and non-blank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserId(pub Option<String>);

impl UserId {
  /// The id, or [`ApiError::Unauthorized`] for anonymous callers.
  pub fn required(self) -> Result<String, ApiError> {
    self.0.ok_or(ApiError::Unauthorized)
  }
}

impl<T: Send + Sync> FromRequestParts<T> for UserId {
  type Rejection = Infallible;

  async fn from_request_parts(parts: &mut Parts, _: &T) -> Result<Self, Self::Rejection> {
    let id = parts
      .headers
      .get(USER_ID_HEADER)
      .and_then(|v| v.to_str().ok())
      .map(str::trim)
      .filter(|v| !v.is_empty())
      .map(str::to_owned);
    Ok(Self(id))
  }
}

/// Build a fully-materialised API router for `state`.
///
/// The returned `Router<()>` can be nested into any parent router regardless
/// of its own state type.
pub fn api_router<S, A>(state: ApiState<S, A>) -> Router<()>
where
  S: SessionStore + 'static,
  A: Advisor + 'static,
{
  Router::new()
    // Drafts
    .route("/drafts", get(drafts::list::<S, A>))
    .route(
      "/draft/{id}",
      get(drafts::get_one::<S, A>).delete(drafts::delete_one::<S, A>),
    )
    .route("/save-draft", post(financials::save_draft::<S, A>))
    // Submission
    .route("/submit-financials", post(financials::submit::<S, A>))
    // Tax comparison
    .route("/calculate-tax", post(tax::calculate::<S, A>))
    .route("/select-regime", post(tax::select_regime::<S, A>))
    .route("/tax-results/{session_id}", get(tax::results::<S, A>))
    .route("/tax-summary/{session_id}", get(tax::summary::<S, A>))
    // Advisory conversation
    .route(
      "/ai-advisor/start-conversation",
      post(advisor::start_conversation::<S, A>),
    )
    .route(
      "/ai-advisor/process-response",
      post(advisor::process_response::<S, A>),
    )
    .route(
      "/ai-advisor/recommendations/{session_id}",
      get(advisor::recommendations::<S, A>),
    )
    .route(
      "/ai-advisor/conversation/{session_id}",
      get(advisor::conversation::<S, A>),
    )
    .with_state(state)
}
