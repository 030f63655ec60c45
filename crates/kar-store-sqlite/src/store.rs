//! [`SqliteStore`], the SQLite implementation of [`SessionStore`].

use std::path::Path;

use chrono::{TimeDelta, Utc};
use rusqlite::{OptionalExtension as _, named_params};
use uuid::Uuid;

use kar_core::{
  comparator::CalculationDetails,
  profile::FinancialProfile,
  recommendation::Recommendation,
  rules::Regime,
  session::{AdvisorOutcome, Draft, Session, SessionStatus, TaxComparison},
  store::SessionStore,
};

use crate::{
  Error, Result,
  encode::{
    COMPARISON_COLUMNS, EncodedProfile, RawComparison, RawOutcome, RawSession,
    SESSION_COLUMNS, encode_decimal, encode_dt, encode_uuid,
  },
  schema::SCHEMA,
};

pub const DEFAULT_DRAFT_TTL_DAYS: i64 = 7;

/// What a conditional write found. The closure running on the database thread
/// reports this and the async side turns it into a domain error.
enum Outcome<T> {
  Done(T),
  /// The session does not exist (or is not in a state the operation accepts).
  Missing,
  /// The session exists but may no longer be modified.
  Locked(&'static str),
}

// ─── Store ───────────────────────────────────────────────────────────────────

/// A Kar session store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted.
#[derive(Clone)]
pub struct SqliteStore {
  pub(crate) conn: tokio_rusqlite::Connection,
  draft_ttl:       TimeDelta,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    Self::init(conn).await
  }

  /// Open an in-memory store for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    Self::init(conn).await
  }

  async fn init(conn: tokio_rusqlite::Connection) -> Result<Self> {
    let store = Self { conn, draft_ttl: TimeDelta::days(DEFAULT_DRAFT_TTL_DAYS) };
    store
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(store)
  }

  /// How long a draft lives after its last save.
  pub fn with_draft_ttl(mut self, ttl: TimeDelta) -> Self {
    self.draft_ttl = ttl;
    self
  }

  pub fn draft_ttl(&self) -> TimeDelta { self.draft_ttl }

  fn resolve<T>(session_id: Uuid, outcome: Outcome<T>) -> Result<T> {
    match outcome {
      Outcome::Done(value) => Ok(value),
      Outcome::Missing => Err(kar_core::Error::SessionNotFound(session_id).into()),
      Outcome::Locked(reason) => {
        tracing::warn!(%session_id, reason, "rejected write to locked session");
        Err(kar_core::Error::DataIntegrity(reason.to_owned()).into())
      }
    }
  }
}

// ─── Row helpers (run on the database thread) ────────────────────────────────

fn select_session(
  conn: &rusqlite::Connection,
  session_id: &str,
) -> rusqlite::Result<Option<RawSession>> {
  conn
    .query_row(
      &format!("SELECT {SESSION_COLUMNS} FROM user_financials WHERE session_id = ?1"),
      [session_id],
      RawSession::from_row,
    )
    .optional()
}

fn select_comparison(
  conn: &rusqlite::Connection,
  session_id: &str,
) -> rusqlite::Result<Option<RawComparison>> {
  conn
    .query_row(
      &format!("SELECT {COMPARISON_COLUMNS} FROM tax_comparison WHERE session_id = ?1"),
      [session_id],
      RawComparison::from_row,
    )
    .optional()
}

fn select_outcome(
  conn: &rusqlite::Connection,
  session_id: &str,
) -> rusqlite::Result<Option<RawOutcome>> {
  conn
    .query_row(
      "SELECT session_id, recommendations, conversation_summary, transcript, \
       created_at FROM advisor_outcome WHERE session_id = ?1",
      [session_id],
      RawOutcome::from_row,
    )
    .optional()
}

/// Insert a brand-new session row.
fn insert_session(
  conn: &rusqlite::Connection,
  session_id: &str,
  user_id: Option<&str>,
  p: &EncodedProfile,
  status: SessionStatus,
  expires_at: Option<&str>,
  now: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "INSERT INTO user_financials (
       session_id, user_id, financial_year, age, gross_salary, basic_salary,
       hra_received, rent_paid, lta_received, other_exemptions,
       deduction_80c, deduction_80d, deduction_80dd, deduction_80e,
       deduction_80tta, home_loan_interest, other_deductions, other_income,
       standard_deduction, professional_tax, tds, metro_city,
       status, is_draft, draft_expires_at, created_at, updated_at
     ) VALUES (
       :session_id, :user_id, :financial_year, :age, :gross_salary, :basic_salary,
       :hra_received, :rent_paid, :lta_received, :other_exemptions,
       :deduction_80c, :deduction_80d, :deduction_80dd, :deduction_80e,
       :deduction_80tta, :home_loan_interest, :other_deductions, :other_income,
       :standard_deduction, :professional_tax, :tds, :metro_city,
       :status, :is_draft, :draft_expires_at, :now, :now
     )",
    named_params! {
      ":session_id": session_id,
      ":user_id": user_id,
      ":financial_year": p.financial_year,
      ":age": p.age,
      ":gross_salary": p.gross_salary,
      ":basic_salary": p.basic_salary,
      ":hra_received": p.hra_received,
      ":rent_paid": p.rent_paid,
      ":lta_received": p.lta_received,
      ":other_exemptions": p.other_exemptions,
      ":deduction_80c": p.deduction_80c,
      ":deduction_80d": p.deduction_80d,
      ":deduction_80dd": p.deduction_80dd,
      ":deduction_80e": p.deduction_80e,
      ":deduction_80tta": p.deduction_80tta,
      ":home_loan_interest": p.home_loan_interest,
      ":other_deductions": p.other_deductions,
      ":other_income": p.other_income,
      ":standard_deduction": p.standard_deduction,
      ":professional_tax": p.professional_tax,
      ":tds": p.tds,
      ":metro_city": p.metro_city,
      ":status": status.as_str(),
      ":is_draft": status == SessionStatus::Draft,
      ":draft_expires_at": expires_at,
      ":now": now,
    },
  )?;
  Ok(())
}

/// Overwrite the profile and lifecycle columns of an existing row. A `None`
/// user id keeps whatever owner the row already has.
fn update_session(
  conn: &rusqlite::Connection,
  session_id: &str,
  user_id: Option<&str>,
  p: &EncodedProfile,
  status: SessionStatus,
  expires_at: Option<&str>,
  now: &str,
) -> rusqlite::Result<()> {
  conn.execute(
    "UPDATE user_financials SET
       user_id = COALESCE(:user_id, user_id),
       financial_year = :financial_year, age = :age,
       gross_salary = :gross_salary, basic_salary = :basic_salary,
       hra_received = :hra_received, rent_paid = :rent_paid,
       lta_received = :lta_received, other_exemptions = :other_exemptions,
       deduction_80c = :deduction_80c, deduction_80d = :deduction_80d,
       deduction_80dd = :deduction_80dd, deduction_80e = :deduction_80e,
       deduction_80tta = :deduction_80tta,
       home_loan_interest = :home_loan_interest,
       other_deductions = :other_deductions, other_income = :other_income,
       standard_deduction = :standard_deduction,
       professional_tax = :professional_tax, tds = :tds,
       metro_city = :metro_city,
       status = :status, is_draft = :is_draft,
       draft_expires_at = :draft_expires_at, updated_at = :now
     WHERE session_id = :session_id",
    named_params! {
      ":session_id": session_id,
      ":user_id": user_id,
      ":financial_year": p.financial_year,
      ":age": p.age,
      ":gross_salary": p.gross_salary,
      ":basic_salary": p.basic_salary,
      ":hra_received": p.hra_received,
      ":rent_paid": p.rent_paid,
      ":lta_received": p.lta_received,
      ":other_exemptions": p.other_exemptions,
      ":deduction_80c": p.deduction_80c,
      ":deduction_80d": p.deduction_80d,
      ":deduction_80dd": p.deduction_80dd,
      ":deduction_80e": p.deduction_80e,
      ":deduction_80tta": p.deduction_80tta,
      ":home_loan_interest": p.home_loan_interest,
      ":other_deductions": p.other_deductions,
      ":other_income": p.other_income,
      ":standard_deduction": p.standard_deduction,
      ":professional_tax": p.professional_tax,
      ":tds": p.tds,
      ":metro_city": p.metro_city,
      ":status": status.as_str(),
      ":is_draft": status == SessionStatus::Draft,
      ":draft_expires_at": expires_at,
      ":now": now,
    },
  )?;
  Ok(())
}

fn validated(profile: &FinancialProfile) -> Result<EncodedProfile> {
  profile.validate()?;
  Ok(EncodedProfile::new(profile))
}

fn is_live_draft(raw: &RawSession, now: &str) -> bool {
  raw.is_draft && raw.draft_expires_at.as_deref().is_some_and(|at| at > now)
}

// ─── SessionStore impl ───────────────────────────────────────────────────────

impl SessionStore for SqliteStore {
  type Error = Error;

  // ── Drafts ────────────────────────────────────────────────────────────────

  async fn create_draft(
    &self,
    user_id: Option<String>,
    profile: FinancialProfile,
  ) -> Result<Session> {
    self.save_draft(Uuid::new_v4(), user_id, profile).await
  }

  async fn save_draft(
    &self,
    session_id: Uuid,
    user_id: Option<String>,
    profile: FinancialProfile,
  ) -> Result<Session> {
    let encoded = validated(&profile)?;
    let now = Utc::now();
    let now_str = encode_dt(now);
    let expires_str = encode_dt(now + self.draft_ttl);
    let id_str = encode_uuid(session_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        match select_session(&tx, &id_str)? {
          Some(existing) if !existing.is_accessible_to(user_id.as_deref()) => {
            return Ok(Outcome::Missing);
          }
          Some(existing) if existing.status == SessionStatus::Completed.as_str() => {
            return Ok(Outcome::Locked("session already submitted; drafts cannot overwrite it"));
          }
          Some(_) => update_session(
            &tx,
            &id_str,
            user_id.as_deref(),
            &encoded,
            SessionStatus::Draft,
            Some(&expires_str),
            &now_str,
          )?,
          None => insert_session(
            &tx,
            &id_str,
            user_id.as_deref(),
            &encoded,
            SessionStatus::Draft,
            Some(&expires_str),
            &now_str,
          )?,
        }
        let raw = select_session(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw.map_or(Outcome::Missing, Outcome::Done))
      })
      .await?;

    let session = Self::resolve(session_id, outcome)?.into_session()?;
    tracing::info!(%session_id, expires_at = ?session.draft_expires_at, "draft saved");
    Ok(session)
  }

  async fn list_drafts<'a>(&'a self, user_id: &'a str) -> Result<Vec<Draft>> {
    let user_id = user_id.to_owned();
    let now = encode_dt(Utc::now());

    let raws: Vec<RawSession> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {SESSION_COLUMNS} FROM user_financials
           WHERE user_id = ?1 AND is_draft = 1 AND status = 'draft'
             AND draft_expires_at > ?2
           ORDER BY created_at DESC, rowid DESC
           LIMIT 1"
        ))?;
        let rows = stmt
          .query_map(rusqlite::params![user_id, now], RawSession::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    let mut drafts = Vec::with_capacity(raws.len());
    for raw in raws {
      drafts.extend(Draft::from_session(raw.into_session()?));
    }
    Ok(drafts)
  }

  async fn load_draft(&self, session_id: Uuid) -> Result<Session> {
    let id_str = encode_uuid(session_id);
    let now = encode_dt(Utc::now());

    let raw = self
      .conn
      .call(move |conn| {
        let raw = select_session(conn, &id_str)?
          .filter(|r| r.status == SessionStatus::Draft.as_str() && is_live_draft(r, &now));
        Ok(raw)
      })
      .await?;

    let raw = raw.ok_or(kar_core::Error::SessionNotFound(session_id))?;
    raw.into_session()
  }

  async fn discard_draft(&self, session_id: Uuid) -> Result<bool> {
    let id_str = encode_uuid(session_id);

    let deleted = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM user_financials WHERE session_id = ?1 AND is_draft = 1",
          [id_str],
        )?;
        Ok(n > 0)
      })
      .await?;

    if deleted {
      tracing::info!(%session_id, "draft discarded");
    }
    Ok(deleted)
  }

  async fn purge_expired_drafts(&self) -> Result<usize> {
    let now = encode_dt(Utc::now());

    let purged = self
      .conn
      .call(move |conn| {
        let n = conn.execute(
          "DELETE FROM user_financials WHERE is_draft = 1 AND draft_expires_at <= ?1",
          [now],
        )?;
        Ok(n)
      })
      .await?;

    if purged > 0 {
      tracing::info!(purged, "expired drafts purged");
    }
    Ok(purged)
  }

  // ── Submitted sessions ────────────────────────────────────────────────────

  async fn submit_financials(
    &self,
    session_id: Option<Uuid>,
    user_id: Option<String>,
    profile: FinancialProfile,
  ) -> Result<Session> {
    let encoded = validated(&profile)?;
    let now_str = encode_dt(Utc::now());
    let create = session_id.is_none();
    let session_id = session_id.unwrap_or_else(Uuid::new_v4);
    let id_str = encode_uuid(session_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if create {
          insert_session(
            &tx,
            &id_str,
            user_id.as_deref(),
            &encoded,
            SessionStatus::Completed,
            None,
            &now_str,
          )?;
        } else {
          let Some(existing) = select_session(&tx, &id_str)? else {
            return Ok(Outcome::Missing);
          };
          if !existing.is_accessible_to(user_id.as_deref()) {
            return Ok(Outcome::Missing);
          }
          if existing.is_draft && !is_live_draft(&existing, &now_str) {
            return Ok(Outcome::Missing);
          }
          if select_comparison(&tx, &id_str)?.is_some() {
            return Ok(Outcome::Locked(
              "tax comparison already recorded; start a new session to recalculate",
            ));
          }
          update_session(
            &tx,
            &id_str,
            user_id.as_deref(),
            &encoded,
            SessionStatus::Completed,
            None,
            &now_str,
          )?;
        }
        let raw = select_session(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw.map_or(Outcome::Missing, Outcome::Done))
      })
      .await?;

    let session = Self::resolve(session_id, outcome)?.into_session()?;
    tracing::info!(%session_id, "financials submitted");
    Ok(session)
  }

  async fn get_session(&self, session_id: Uuid) -> Result<Option<Session>> {
    let id_str = encode_uuid(session_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_session(conn, &id_str)?))
      .await?;
    raw.map(RawSession::into_session).transpose()
  }

  async fn load_submitted(&self, session_id: Uuid) -> Result<Session> {
    self
      .get_session(session_id)
      .await?
      .filter(Session::is_completed)
      .ok_or_else(|| kar_core::Error::SessionNotFound(session_id).into())
  }

  // ── Comparisons ───────────────────────────────────────────────────────────

  async fn record_comparison(
    &self,
    session_id: Uuid,
    computed_from: FinancialProfile,
    details: CalculationDetails,
    recommendations: Vec<Recommendation>,
  ) -> Result<TaxComparison> {
    let id_str = encode_uuid(session_id);
    let computed_from = EncodedProfile::new(&computed_from);
    let old_str = encode_decimal(details.old_regime.total_tax);
    let new_str = encode_decimal(details.new_regime.total_tax);
    let best_str = details.comparison.best_regime.as_str();
    let details_json = serde_json::to_string(&details)?;
    let recs_json = serde_json::to_string(&recommendations)?;
    let now_str = encode_dt(Utc::now());

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let Some(session) = select_session(&tx, &id_str)?
          .filter(|r| r.status == SessionStatus::Completed.as_str())
        else {
          return Ok(Outcome::Missing);
        };
        if let Some(existing) = select_comparison(&tx, &id_str)? {
          return Ok(Outcome::Done((existing, false)));
        }
        if !session.holds(&computed_from) {
          return Ok(Outcome::Locked(
            "financials changed while the comparison was computed; calculate again",
          ));
        }
        let inserted = tx.execute(
          "INSERT INTO tax_comparison (
             session_id, tax_old_regime, tax_new_regime, best_regime,
             calculation_details, recommendations, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (session_id) DO NOTHING",
          rusqlite::params![
            id_str,
            old_str,
            new_str,
            best_str,
            details_json,
            recs_json,
            now_str,
          ],
        )?;
        let raw = select_comparison(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw.map_or(Outcome::Missing, |r| Outcome::Done((r, inserted > 0))))
      })
      .await?;

    let (raw, inserted) = Self::resolve(session_id, outcome)?;
    let comparison = raw.into_comparison()?;
    if inserted {
      tracing::info!(%session_id, best = %comparison.best_regime, "comparison recorded");
    }
    Ok(comparison)
  }

  async fn get_comparison(&self, session_id: Uuid) -> Result<Option<TaxComparison>> {
    let id_str = encode_uuid(session_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_comparison(conn, &id_str)?))
      .await?;
    raw.map(RawComparison::into_comparison).transpose()
  }

  async fn select_regime(&self, session_id: Uuid, regime: Regime) -> Result<TaxComparison> {
    let id_str = encode_uuid(session_id);

    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        let n = tx.execute(
          "UPDATE tax_comparison SET selected_regime = ?1 WHERE session_id = ?2",
          rusqlite::params![regime.as_str(), id_str],
        )?;
        if n == 0 {
          return Ok(Outcome::Missing);
        }
        let raw = select_comparison(&tx, &id_str)?;
        tx.commit()?;
        Ok(raw.map_or(Outcome::Missing, Outcome::Done))
      })
      .await?;

    let comparison = Self::resolve(session_id, outcome)?.into_comparison()?;
    tracing::info!(%session_id, %regime, "regime selected");
    Ok(comparison)
  }

  // ── Advisory outcomes ─────────────────────────────────────────────────────

  async fn record_advice(&self, outcome: AdvisorOutcome) -> Result<AdvisorOutcome> {
    let session_id = outcome.session_id;
    let id_str = encode_uuid(session_id);
    let recs_json = serde_json::to_string(&outcome.recommendations)?;
    let transcript_json = serde_json::to_string(&outcome.transcript)?;
    let summary = outcome.conversation_summary.clone();
    let at_str = encode_dt(outcome.created_at);

    let written = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        if select_session(&tx, &id_str)?.is_none() {
          return Ok(Outcome::Missing);
        }
        tx.execute(
          "INSERT INTO advisor_outcome (
             session_id, recommendations, conversation_summary, transcript, created_at
           ) VALUES (?1, ?2, ?3, ?4, ?5)
           ON CONFLICT (session_id) DO UPDATE SET
             recommendations = excluded.recommendations,
             conversation_summary = excluded.conversation_summary,
             transcript = excluded.transcript,
             created_at = excluded.created_at",
          rusqlite::params![id_str, recs_json, summary, transcript_json, at_str],
        )?;
        tx.commit()?;
        Ok(Outcome::Done(()))
      })
      .await?;

    Self::resolve(session_id, written)?;
    tracing::info!(
      %session_id,
      recommendations = outcome.recommendations.len(),
      "advisor outcome recorded"
    );
    Ok(outcome)
  }

  async fn get_advice(&self, session_id: Uuid) -> Result<Option<AdvisorOutcome>> {
    let id_str = encode_uuid(session_id);
    let raw = self
      .conn
      .call(move |conn| Ok(select_outcome(conn, &id_str)?))
      .await?;
    raw.map(RawOutcome::into_outcome).transpose()
  }
}
