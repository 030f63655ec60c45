//! The `SessionStore` trait.
//!
//! The trait is implemented by storage backends (e.g. `kar-store-sqlite`).
//! The HTTP layer depends on this abstraction, not on any concrete backend.

use std::future::Future;

use uuid::Uuid;

use crate::{
  Classify,
  comparator::CalculationDetails,
  profile::FinancialProfile,
  recommendation::Recommendation,
  rules::Regime,
  session::{AdvisorOutcome, Draft, Session, TaxComparison},
};

/// Abstraction over a session/draft store backend.
///
/// Every profile is validated before it is written. Each method runs as one
/// atomic unit, so a check followed by a write on the same session cannot
/// interleave with another caller.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait SessionStore: Send + Sync {
  type Error: std::error::Error + Classify + Send + Sync + 'static;

  // ── Drafts ────────────────────────────────────────────────────────────

  /// Persist `profile` as a new draft expiring after the store's draft TTL.
  fn create_draft(
    &self,
    user_id: Option<String>,
    profile: FinancialProfile,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Insert or overwrite the draft `session_id`, pushing its expiry out again.
  ///
  /// A session owned by a different user than `user_id` is reported as
  /// session-not-found. Fails with a data-integrity error if the session is
  /// already completed.
  fn save_draft(
    &self,
    session_id: Uuid,
    user_id: Option<String>,
    profile: FinancialProfile,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// The user's most recent unexpired draft, if any. At most one entry is
  /// returned.
  fn list_drafts<'a>(
    &'a self,
    user_id: &'a str,
  ) -> impl Future<Output = Result<Vec<Draft>, Self::Error>> + Send + 'a;

  /// Fails with session-not-found if the row is missing, expired or not a
  /// draft.
  fn load_draft(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  /// Delete a draft together with everything it owns. Returns `false` when no
  /// such draft existed.
  fn discard_draft(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<bool, Self::Error>> + Send + '_;

  /// Delete every draft whose expiry has passed and return how many went.
  fn purge_expired_drafts(
    &self,
  ) -> impl Future<Output = Result<usize, Self::Error>> + Send + '_;

  // ── Submitted sessions ────────────────────────────────────────────────

  /// Finalise `profile`: mark the session completed, clear its draft expiry.
  ///
  /// With `session_id: None` a new session is created. A supplied id that does
  /// not exist or belongs to another user fails with session-not-found, and a
  /// session that already has a comparison is immutable.
  fn submit_financials(
    &self,
    session_id: Option<Uuid>,
    user_id: Option<String>,
    profile: FinancialProfile,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  fn get_session(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<Session>, Self::Error>> + Send + '_;

  /// The completed session `session_id`; session-not-found for drafts and
  /// missing rows.
  fn load_submitted(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Session, Self::Error>> + Send + '_;

  // ── Comparisons ───────────────────────────────────────────────────────

  /// Store the comparison for a completed session. The first write wins: a
  /// repeat call returns the existing row untouched.
  ///
  /// `computed_from` is the profile the comparison was calculated from. If
  /// the stored profile no longer matches it, nothing is written and a
  /// data-integrity error is returned.
  fn record_comparison(
    &self,
    session_id: Uuid,
    computed_from: FinancialProfile,
    details: CalculationDetails,
    recommendations: Vec<Recommendation>,
  ) -> impl Future<Output = Result<TaxComparison, Self::Error>> + Send + '_;

  fn get_comparison(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<TaxComparison>, Self::Error>> + Send + '_;

  /// Record the user's regime choice. Session-not-found when no comparison
  /// exists yet.
  fn select_regime(
    &self,
    session_id: Uuid,
    regime: Regime,
  ) -> impl Future<Output = Result<TaxComparison, Self::Error>> + Send + '_;

  // ── Advisory outcomes ─────────────────────────────────────────────────

  /// Store (or replace) the outcome of a finished advisory conversation.
  fn record_advice(
    &self,
    outcome: AdvisorOutcome,
  ) -> impl Future<Output = Result<AdvisorOutcome, Self::Error>> + Send + '_;

  fn get_advice(
    &self,
    session_id: Uuid,
  ) -> impl Future<Output = Result<Option<AdvisorOutcome>, Self::Error>> + Send + '_;
}
