//! Handlers for the regime comparison.
//!
//! | Method | Path                         | Notes |
//! |--------|------------------------------|-------|
//! | `POST` | `/calculate-tax`             | Body: `{"session_id"}`; session must be submitted |
//! | `POST` | `/select-regime`             | Body: `{"session_id","selected_regime":"old"\|"new"}` |
//! | `GET`  | `/tax-results/{session_id}`  | Stored comparison with salary figures |
//! | `GET`  | `/tax-summary/{session_id}`  | Headline numbers and a one-line recommendation |

use axum::{
  Json,
  extract::{Path, State},
};
use chrono::{DateTime, Utc};
use kar_advisor::Advisor;
use kar_core::{
  comparator::{self, CalculationDetails},
  money::format_inr,
  recommendation::{Recommendation, RecommendationSummary},
  rules::Regime,
  session::{Session, TaxComparison},
  store::SessionStore,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct SessionBody {
  pub session_id: Uuid,
}

async fn stored<S: SessionStore>(
  store: &S,
  session_id: Uuid,
) -> Result<(Session, TaxComparison), ApiError> {
  let comparison = store
    .get_comparison(session_id)
    .await
    .map_err(ApiError::classify)?
    .ok_or_else(|| {
      ApiError::NotFound(format!("tax results not found for session {session_id}"))
    })?;
  let session = store
    .get_session(session_id)
    .await
    .map_err(ApiError::classify)?
    .ok_or_else(|| ApiError::NotFound(format!("session {session_id} not found")))?;
  Ok((session, comparison))
}

// ─── Calculate ────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Calculated {
  pub session_id:          Uuid,
  pub old_regime_tax:      Decimal,
  pub new_regime_tax:      Decimal,
  pub best_regime:         Regime,
  pub selected_regime:     Option<Regime>,
  pub tax_savings:         Decimal,
  pub calculation_details: CalculationDetails,
  pub recommendations:     Vec<Recommendation>,
  pub summary:             RecommendationSummary,
}

impl From<TaxComparison> for Calculated {
  fn from(c: TaxComparison) -> Self {
    Self {
      session_id:          c.session_id,
      old_regime_tax:      c.tax_old_regime,
      new_regime_tax:      c.tax_new_regime,
      best_regime:         c.best_regime,
      selected_regime:     c.selected_regime,
      tax_savings:         c.calculation_details.comparison.tax_savings,
      summary:             RecommendationSummary::of(&c.recommendations),
      calculation_details: c.calculation_details,
      recommendations:     c.recommendations,
    }
  }
}

/// `POST /calculate-tax`
///
/// Computes both regimes for a submitted session and stores the result. A
/// session that already has a comparison gets the stored one back unchanged.
pub async fn calculate<S, A>(
  State(state): State<ApiState<S, A>>,
  Json(body): Json<SessionBody>,
) -> Result<Json<Calculated>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let id = body.session_id;
  if let Some(existing) = state.store.get_comparison(id).await.map_err(ApiError::classify)? {
    return Ok(Json(existing.into()));
  }

  let session = state.store.load_submitted(id).await.map_err(ApiError::classify)?;
  let comparison = comparator::compare(&session.profile).map_err(ApiError::classify)?;
  let recorded = state
    .store
    .record_comparison(id, session.profile, comparison.details, comparison.recommendations)
    .await
    .map_err(ApiError::classify)?;

  tracing::info!(
    session_id = %id,
    best_regime = %recorded.best_regime,
    "tax comparison computed"
  );
  Ok(Json(recorded.into()))
}

// ─── Select regime ────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct SelectBody {
  pub session_id:      Uuid,
  pub selected_regime: Regime,
}

#[derive(Debug, Serialize)]
pub struct Selected {
  pub success:         bool,
  pub session_id:      Uuid,
  pub selected_regime: Regime,
  pub message:         String,
}

/// `POST /select-regime`
pub async fn select_regime<S, A>(
  State(state): State<ApiState<S, A>>,
  Json(body): Json<SelectBody>,
) -> Result<Json<Selected>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let updated = state
    .store
    .select_regime(body.session_id, body.selected_regime)
    .await
    .map_err(ApiError::classify)?;
  let regime = updated.effective_regime();
  Ok(Json(Selected {
    success:         true,
    session_id:      updated.session_id,
    selected_regime: regime,
    message:         format!("Regime selection updated to {regime} regime"),
  }))
}

// ─── Results ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Results {
  pub session_id:          Uuid,
  pub gross_salary:        Decimal,
  pub basic_salary:        Decimal,
  pub old_regime_tax:      Decimal,
  pub new_regime_tax:      Decimal,
  pub best_regime:         Regime,
  pub selected_regime:     Option<Regime>,
  pub calculation_details: CalculationDetails,
  pub recommendations:     Vec<Recommendation>,
  pub summary:             RecommendationSummary,
  pub created_at:          DateTime<Utc>,
}

/// `GET /tax-results/{session_id}`
pub async fn results<S, A>(
  State(state): State<ApiState<S, A>>,
  Path(session_id): Path<Uuid>,
) -> Result<Json<Results>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let (session, c) = stored(state.store.as_ref(), session_id).await?;
  Ok(Json(Results {
    session_id,
    gross_salary: session.profile.gross_salary,
    basic_salary: session.profile.basic_salary,
    old_regime_tax: c.tax_old_regime,
    new_regime_tax: c.tax_new_regime,
    best_regime: c.best_regime,
    selected_regime: c.selected_regime,
    calculation_details: c.calculation_details,
    summary: RecommendationSummary::of(&c.recommendations),
    recommendations: c.recommendations,
    created_at: c.created_at,
  }))
}

// ─── Summary ──────────────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct Summary {
  pub session_id:         Uuid,
  pub gross_salary:       Decimal,
  pub old_regime_tax:     Decimal,
  pub new_regime_tax:     Decimal,
  pub best_regime:        Regime,
  pub selected_regime:    Option<Regime>,
  pub tax_savings:        Decimal,
  pub savings_percentage: Decimal,
  pub recommendation:     String,
}

/// `GET /tax-summary/{session_id}`
pub async fn summary<S, A>(
  State(state): State<ApiState<S, A>>,
  Path(session_id): Path<Uuid>,
) -> Result<Json<Summary>, ApiError>
where
  S: SessionStore,
  A: Advisor,
{
  let (session, c) = stored(state.store.as_ref(), session_id).await?;
  let totals = &c.calculation_details.comparison;
  Ok(Json(Summary {
    session_id,
    gross_salary: session.profile.gross_salary,
    old_regime_tax: c.tax_old_regime,
    new_regime_tax: c.tax_new_regime,
    best_regime: c.best_regime,
    selected_regime: c.selected_regime,
    tax_savings: totals.tax_savings,
    savings_percentage: totals.savings_percentage,
    recommendation: format!(
      "Choose {} regime to save {}",
      c.best_regime,
      format_inr(totals.tax_savings)
    ),
  }))
}
