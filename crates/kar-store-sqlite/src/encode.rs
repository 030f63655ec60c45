//! Encoding and decoding helpers between Rust domain types and the plain-text
//! representations stored in SQLite columns.
//!
//! Timestamps are stored as RFC 3339 UTC strings with microsecond precision.
//! Amounts are decimal strings. Structured fields (calculation details,
//! recommendations, transcripts) are compact JSON. UUIDs are stored as
//! hyphenated lowercase strings.

use std::str::FromStr;

use chrono::{DateTime, SecondsFormat, Utc};
use kar_core::{
  comparator::CalculationDetails,
  profile::FinancialProfile,
  recommendation::Recommendation,
  rules::Regime,
  session::{AdvisorOutcome, Exchange, Session, SessionStatus, TaxComparison},
};
use rust_decimal::Decimal;
use uuid::Uuid;

use crate::{Error, Result};

// ─── Scalars ─────────────────────────────────────────────────────────────────

pub fn encode_uuid(id: Uuid) -> String { id.hyphenated().to_string() }

pub fn decode_uuid(s: &str) -> Result<Uuid> { Ok(Uuid::parse_str(s)?) }

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

pub fn encode_decimal(d: Decimal) -> String { d.normalize().to_string() }

pub fn decode_decimal(s: &str) -> Result<Decimal> { Ok(Decimal::from_str(s)?) }

pub fn decode_regime(s: &str) -> Result<Regime> {
  Regime::from_str(s).map_err(Error::Decode)
}

pub fn decode_status(s: &str) -> Result<SessionStatus> {
  SessionStatus::from_str(s).map_err(Error::Decode)
}

// ─── Profile columns ─────────────────────────────────────────────────────────

/// Column list shared by every `SELECT` that builds a [`RawSession`].
pub const SESSION_COLUMNS: &str = "session_id, user_id, financial_year, age, \
  gross_salary, basic_salary, hra_received, rent_paid, lta_received, \
  other_exemptions, deduction_80c, deduction_80d, deduction_80dd, \
  deduction_80e, deduction_80tta, home_loan_interest, other_deductions, \
  other_income, standard_deduction, professional_tax, tds, metro_city, \
  status, is_draft, draft_expires_at, created_at, updated_at";

/// A [`FinancialProfile`] flattened into bindable column values.
pub struct EncodedProfile {
  pub financial_year:     String,
  pub age:                i64,
  pub gross_salary:       String,
  pub basic_salary:       String,
  pub hra_received:       String,
  pub rent_paid:          String,
  pub lta_received:       String,
  pub other_exemptions:   String,
  pub deduction_80c:      String,
  pub deduction_80d:      String,
  pub deduction_80dd:     String,
  pub deduction_80e:      String,
  pub deduction_80tta:    String,
  pub home_loan_interest: String,
  pub other_deductions:   Option<String>,
  pub other_income:       Option<String>,
  pub standard_deduction: String,
  pub professional_tax:   String,
  pub tds:                String,
  pub metro_city:         bool,
}

impl EncodedProfile {
  pub fn new(p: &FinancialProfile) -> Self {
    Self {
      financial_year:     p.financial_year.clone(),
      age:                i64::from(p.age),
      gross_salary:       encode_decimal(p.gross_salary),
      basic_salary:       encode_decimal(p.basic_salary),
      hra_received:       encode_decimal(p.hra_received),
      rent_paid:          encode_decimal(p.rent_paid),
      lta_received:       encode_decimal(p.lta_received),
      other_exemptions:   encode_decimal(p.other_exemptions),
      deduction_80c:      encode_decimal(p.deduction_80c),
      deduction_80d:      encode_decimal(p.deduction_80d),
      deduction_80dd:     encode_decimal(p.deduction_80dd),
      deduction_80e:      encode_decimal(p.deduction_80e),
      deduction_80tta:    encode_decimal(p.deduction_80tta),
      home_loan_interest: encode_decimal(p.home_loan_interest),
      other_deductions:   p.other_deductions.map(encode_decimal),
      other_income:       p.other_income.map(encode_decimal),
      standard_deduction: encode_decimal(p.standard_deduction),
      professional_tax:   encode_decimal(p.professional_tax),
      tds:                encode_decimal(p.tds),
      metro_city:         p.metro_city,
    }
  }
}

// ─── Row types ───────────────────────────────────────────────────────────────

/// Raw values read directly from a `user_financials` row.
pub struct RawSession {
  pub session_id:         String,
  pub user_id:            Option<String>,
  pub financial_year:     String,
  pub age:                i64,
  pub gross_salary:       String,
  pub basic_salary:       String,
  pub hra_received:       String,
  pub rent_paid:          String,
  pub lta_received:       String,
  pub other_exemptions:   String,
  pub deduction_80c:      String,
  pub deduction_80d:      String,
  pub deduction_80dd:     String,
  pub deduction_80e:      String,
  pub deduction_80tta:    String,
  pub home_loan_interest: String,
  pub other_deductions:   Option<String>,
  pub other_income:       Option<String>,
  pub standard_deduction: String,
  pub professional_tax:   String,
  pub tds:                String,
  pub metro_city:         bool,
  pub status:             String,
  pub is_draft:           bool,
  pub draft_expires_at:   Option<String>,
  pub created_at:         String,
  pub updated_at:         String,
}

impl RawSession {
  /// Read a row selected with [`SESSION_COLUMNS`].
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:         row.get("session_id")?,
      user_id:            row.get("user_id")?,
      financial_year:     row.get("financial_year")?,
      age:                row.get("age")?,
      gross_salary:       row.get("gross_salary")?,
      basic_salary:       row.get("basic_salary")?,
      hra_received:       row.get("hra_received")?,
      rent_paid:          row.get("rent_paid")?,
      lta_received:       row.get("lta_received")?,
      other_exemptions:   row.get("other_exemptions")?,
      deduction_80c:      row.get("deduction_80c")?,
      deduction_80d:      row.get("deduction_80d")?,
      deduction_80dd:     row.get("deduction_80dd")?,
      deduction_80e:      row.get("deduction_80e")?,
      deduction_80tta:    row.get("deduction_80tta")?,
      home_loan_interest: row.get("home_loan_interest")?,
      other_deductions:   row.get("other_deductions")?,
      other_income:       row.get("other_income")?,
      standard_deduction: row.get("standard_deduction")?,
      professional_tax:   row.get("professional_tax")?,
      tds:                row.get("tds")?,
      metro_city:         row.get("metro_city")?,
      status:             row.get("status")?,
      is_draft:           row.get("is_draft")?,
      draft_expires_at:   row.get("draft_expires_at")?,
      created_at:         row.get("created_at")?,
      updated_at:         row.get("updated_at")?,
    })
  }

  /// Whether the row's profile columns hold exactly `p`.
  pub fn holds(&self, p: &EncodedProfile) -> bool {
    self.financial_year == p.financial_year
      && self.age == p.age
      && self.gross_salary == p.gross_salary
      && self.basic_salary == p.basic_salary
      && self.hra_received == p.hra_received
      && self.rent_paid == p.rent_paid
      && self.lta_received == p.lta_received
      && self.other_exemptions == p.other_exemptions
      && self.deduction_80c == p.deduction_80c
      && self.deduction_80d == p.deduction_80d
      && self.deduction_80dd == p.deduction_80dd
      && self.deduction_80e == p.deduction_80e
      && self.deduction_80tta == p.deduction_80tta
      && self.home_loan_interest == p.home_loan_interest
      && self.other_deductions == p.other_deductions
      && self.other_income == p.other_income
      && self.standard_deduction == p.standard_deduction
      && self.professional_tax == p.professional_tax
      && self.tds == p.tds
      && self.metro_city == p.metro_city
  }

  /// Anonymous rows are open to everyone; owned rows only to their owner.
  pub fn is_accessible_to(&self, user_id: Option<&str>) -> bool {
    self.user_id.as_deref().is_none_or(|owner| Some(owner) == user_id)
  }

  pub fn into_session(self) -> Result<Session> {
    let age = u32::try_from(self.age)
      .map_err(|_| Error::Decode(format!("age out of range: {}", self.age)))?;
    let optional = |s: Option<String>| s.as_deref().map(decode_decimal).transpose();

    let profile = FinancialProfile {
      financial_year: self.financial_year,
      age,
      gross_salary: decode_decimal(&self.gross_salary)?,
      basic_salary: decode_decimal(&self.basic_salary)?,
      hra_received: decode_decimal(&self.hra_received)?,
      rent_paid: decode_decimal(&self.rent_paid)?,
      lta_received: decode_decimal(&self.lta_received)?,
      other_exemptions: decode_decimal(&self.other_exemptions)?,
      deduction_80c: decode_decimal(&self.deduction_80c)?,
      deduction_80d: decode_decimal(&self.deduction_80d)?,
      deduction_80dd: decode_decimal(&self.deduction_80dd)?,
      deduction_80e: decode_decimal(&self.deduction_80e)?,
      deduction_80tta: decode_decimal(&self.deduction_80tta)?,
      home_loan_interest: decode_decimal(&self.home_loan_interest)?,
      other_deductions: optional(self.other_deductions)?,
      other_income: optional(self.other_income)?,
      standard_deduction: decode_decimal(&self.standard_deduction)?,
      professional_tax: decode_decimal(&self.professional_tax)?,
      tds: decode_decimal(&self.tds)?,
      metro_city: self.metro_city,
    };

    Ok(Session {
      session_id: decode_uuid(&self.session_id)?,
      user_id: self.user_id,
      profile,
      status: decode_status(&self.status)?,
      is_draft: self.is_draft,
      draft_expires_at: self.draft_expires_at.as_deref().map(decode_dt).transpose()?,
      created_at: decode_dt(&self.created_at)?,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}

pub const COMPARISON_COLUMNS: &str = "session_id, tax_old_regime, tax_new_regime, \
  best_regime, selected_regime, calculation_details, recommendations, created_at";

/// Raw strings read directly from a `tax_comparison` row.
pub struct RawComparison {
  pub session_id:          String,
  pub tax_old_regime:      String,
  pub tax_new_regime:      String,
  pub best_regime:         String,
  pub selected_regime:     Option<String>,
  pub calculation_details: String,
  pub recommendations:     String,
  pub created_at:          String,
}

impl RawComparison {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:          row.get("session_id")?,
      tax_old_regime:      row.get("tax_old_regime")?,
      tax_new_regime:      row.get("tax_new_regime")?,
      best_regime:         row.get("best_regime")?,
      selected_regime:     row.get("selected_regime")?,
      calculation_details: row.get("calculation_details")?,
      recommendations:     row.get("recommendations")?,
      created_at:          row.get("created_at")?,
    })
  }

  pub fn into_comparison(self) -> Result<TaxComparison> {
    let calculation_details: CalculationDetails =
      serde_json::from_str(&self.calculation_details)?;
    let recommendations: Vec<Recommendation> =
      serde_json::from_str(&self.recommendations)?;
    Ok(TaxComparison {
      session_id: decode_uuid(&self.session_id)?,
      tax_old_regime: decode_decimal(&self.tax_old_regime)?,
      tax_new_regime: decode_decimal(&self.tax_new_regime)?,
      best_regime: decode_regime(&self.best_regime)?,
      selected_regime: self.selected_regime.as_deref().map(decode_regime).transpose()?,
      calculation_details,
      recommendations,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

/// Raw strings read directly from an `advisor_outcome` row.
pub struct RawOutcome {
  pub session_id:           String,
  pub recommendations:      String,
  pub conversation_summary: String,
  pub transcript:           String,
  pub created_at:           String,
}

impl RawOutcome {
  pub fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      session_id:           row.get("session_id")?,
      recommendations:      row.get("recommendations")?,
      conversation_summary: row.get("conversation_summary")?,
      transcript:           row.get("transcript")?,
      created_at:           row.get("created_at")?,
    })
  }

  pub fn into_outcome(self) -> Result<AdvisorOutcome> {
    let transcript: Vec<Exchange> = serde_json::from_str(&self.transcript)?;
    Ok(AdvisorOutcome {
      session_id: decode_uuid(&self.session_id)?,
      recommendations: serde_json::from_str(&self.recommendations)?,
      conversation_summary: self.conversation_summary,
      transcript,
      created_at: decode_dt(&self.created_at)?,
    })
  }
}

#[cfg(test)]
mod tests {
  use chrono::TimeZone;

  use super::*;

  #[test]
  fn timestamps_sort_as_strings() {
    let early = Utc.with_ymd_and_hms(2024, 4, 1, 9, 5, 0).unwrap();
    let late = early + chrono::TimeDelta::microseconds(1);
    assert!(encode_dt(early) < encode_dt(late));
    assert_eq!(decode_dt(&encode_dt(late)).unwrap(), late);
    assert_eq!(encode_dt(early), "2024-04-01T09:05:00.000000Z");
  }

  #[test]
  fn decimals_are_stored_without_trailing_zeros() {
    let d = Decimal::new(150_000_00, 2);
    assert_eq!(encode_decimal(d), "150000");
    assert_eq!(decode_decimal("1234.5").unwrap(), Decimal::new(12345, 1));
  }
}
