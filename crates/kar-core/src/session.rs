//! Sessions and the records a session owns.
//!
//! A session owns exactly one [`FinancialProfile`], at most one
//! [`TaxComparison`] and at most one [`AdvisorOutcome`]. Deleting the session
//! deletes both.

use std::{fmt, str::FromStr};

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
  comparator::CalculationDetails,
  profile::FinancialProfile,
  recommendation::Recommendation,
  rules::Regime,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
  Draft,
  Completed,
}

impl SessionStatus {
  pub fn as_str(self) -> &'static str {
    match self {
      Self::Draft => "draft",
      Self::Completed => "completed",
    }
  }
}

impl fmt::Display for SessionStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for SessionStatus {
  type Err = String;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "draft" => Ok(Self::Draft),
      "completed" => Ok(Self::Completed),
      other => Err(format!("unknown session status: {other:?}")),
    }
  }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
  pub session_id:       Uuid,
  /// Opaque identifier supplied by the client, if any.
  pub user_id:          Option<String>,
  pub profile:          FinancialProfile,
  pub status:           SessionStatus,
  pub is_draft:         bool,
  /// Set only while the session is a draft.
  pub draft_expires_at: Option<DateTime<Utc>>,
  pub created_at:       DateTime<Utc>,
  pub updated_at:       DateTime<Utc>,
}

impl Session {
  pub fn is_completed(&self) -> bool { self.status == SessionStatus::Completed }

  /// A draft whose expiry lies at or before `now`. Completed sessions never
  /// expire.
  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    self.is_draft && self.draft_expires_at.is_some_and(|at| at <= now)
  }
}

/// A saved-for-later profile as presented to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Draft {
  pub draft_id:       Uuid,
  pub financial_data: FinancialProfile,
  pub created_at:     DateTime<Utc>,
  pub expires_at:     DateTime<Utc>,
}

impl Draft {
  /// `None` unless `session` is a draft with an expiry.
  pub fn from_session(session: Session) -> Option<Self> {
    if !session.is_draft {
      return None;
    }
    Some(Self {
      draft_id:       session.session_id,
      expires_at:     session.draft_expires_at?,
      financial_data: session.profile,
      created_at:     session.created_at,
    })
  }
}

/// The persisted result of comparing both regimes for one session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaxComparison {
  pub session_id:          Uuid,
  pub tax_old_regime:      Decimal,
  pub tax_new_regime:      Decimal,
  pub best_regime:         Regime,
  /// The user's explicit choice, which may differ from `best_regime`.
  pub selected_regime:     Option<Regime>,
  pub calculation_details: CalculationDetails,
  pub recommendations:     Vec<Recommendation>,
  pub created_at:          DateTime<Utc>,
}

impl TaxComparison {
  /// The user's choice if made, otherwise the cheaper regime.
  pub fn effective_regime(&self) -> Regime {
    self.selected_regime.unwrap_or(self.best_regime)
  }
}

/// One question and the user's answer to it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exchange {
  pub round:    u32,
  pub question: String,
  pub response: String,
}

/// What a finished advisory conversation produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisorOutcome {
  pub session_id:           Uuid,
  pub recommendations:      Vec<Recommendation>,
  pub conversation_summary: String,
  pub transcript:           Vec<Exchange>,
  pub created_at:           DateTime<Utc>,
}

#[cfg(test)]
mod tests {
  use chrono::TimeDelta;
  use rust_decimal_macros::dec;

  use super::*;

  fn draft_session(expires_at: Option<DateTime<Utc>>) -> Session {
    let now = Utc::now();
    Session {
      session_id: Uuid::new_v4(),
      user_id: None,
      profile: FinancialProfile::new("2024-25", 30, dec!(900000), dec!(450000)),
      status: SessionStatus::Draft,
      is_draft: true,
      draft_expires_at: expires_at,
      created_at: now,
      updated_at: now,
    }
  }

  #[test]
  fn drafts_expire_at_their_deadline() {
    let now = Utc::now();
    assert!(draft_session(Some(now)).is_expired(now));
    assert!(!draft_session(Some(now + TimeDelta::days(1))).is_expired(now));
  }

  #[test]
  fn completed_sessions_are_not_drafts() {
    let mut s = draft_session(None);
    s.is_draft = false;
    s.status = SessionStatus::Completed;
    assert!(!s.is_expired(Utc::now()));
    assert!(Draft::from_session(s).is_none());
  }

  #[test]
  fn draft_view_carries_the_expiry() {
    let at = Utc::now() + TimeDelta::days(7);
    let s = draft_session(Some(at));
    let id = s.session_id;
    let d = Draft::from_session(s).unwrap();
    assert_eq!(d.draft_id, id);
    assert_eq!(d.expires_at, at);
  }

  #[test]
  fn status_round_trips_through_its_name() {
    for s in [SessionStatus::Draft, SessionStatus::Completed] {
      assert_eq!(s.as_str().parse::<SessionStatus>().unwrap(), s);
    }
  }
}
