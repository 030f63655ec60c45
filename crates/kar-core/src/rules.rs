//! Tax rule tables: slab rates, rebates and statutory limits per financial
//! year and regime.
//!
//! Amounts are whole rupees and rates are whole percentages so every table can
//! live in a `static`. [`RegimeRules`] converts them to [`Decimal`] on demand.

use std::{fmt, str::FromStr};

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ─── Regime ──────────────────────────────────────────────────────────────────

/// One of the two mutually exclusive income-tax rule sets.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Regime {
  Old,
  New,
}

impl Regime {
  /// The regime a taxpayer lands in unless they opt out.
  pub const DEFAULT: Regime = Regime::New;

  pub fn as_str(self) -> &'static str {
    match self {
      Self::Old => "old",
      Self::New => "new",
    }
  }
}

impl fmt::Display for Regime {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for Regime {
  type Err = String;

  fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
    match s {
      "old" => Ok(Self::Old),
      "new" => Ok(Self::New),
      other => Err(format!("unknown regime: {other:?}")),
    }
  }
}

// ─── Table types ─────────────────────────────────────────────────────────────

/// An income bracket taxed at a single marginal rate. `upper: None` is the
/// open-ended top slab.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slab {
  pub lower:        i64,
  pub upper:        Option<i64>,
  pub rate_percent: u32,
}

/// Sec. 87A rebate: taxable income at or below `threshold` has its tax
/// reduced by up to `max`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rebate {
  pub threshold: i64,
  pub max:       i64,
}

/// The complete rule set for one regime in one financial year, already
/// specialised for the taxpayer's age bracket.
#[derive(Debug, Clone, Copy)]
pub struct RegimeRules {
  pub regime:             Regime,
  pub slabs:              &'static [Slab],
  pub standard_deduction: i64,
  pub rebate:             Rebate,
}

impl RegimeRules {
  pub fn standard_deduction_limit(&self) -> Decimal {
    Decimal::from(self.standard_deduction)
  }
}

// ─── Statutory constants ─────────────────────────────────────────────────────

pub const CESS_PERCENT: u32 = 4;

pub const LIMIT_80C: i64 = 150_000;
pub const LIMIT_80D: i64 = 25_000;
pub const LIMIT_80DD: i64 = 125_000;
pub const LIMIT_80E: i64 = 40_000;
pub const LIMIT_80TTA: i64 = 10_000;
pub const LIMIT_HOME_LOAN_INTEREST: i64 = 200_000;
pub const LIMIT_PROFESSIONAL_TAX: i64 = 2_500;

pub const DEFAULT_STANDARD_DEDUCTION: i64 = 50_000;

/// Ceiling on any single amount in a profile (₹5 crore).
pub const MAX_AMOUNT: i64 = 50_000_000;

pub const SUPPORTED_YEARS: &[&str] = &["2024-25", "2025-26"];

/// `rate` percent as an exact decimal fraction (`4` → `0.04`).
pub fn percent(rate: u32) -> Decimal { Decimal::new(i64::from(rate), 2) }

// ─── Slab tables ─────────────────────────────────────────────────────────────

static OLD_BELOW_60: [Slab; 4] = [
  Slab { lower: 0, upper: Some(250_000), rate_percent: 0 },
  Slab { lower: 250_000, upper: Some(500_000), rate_percent: 5 },
  Slab { lower: 500_000, upper: Some(1_000_000), rate_percent: 20 },
  Slab { lower: 1_000_000, upper: None, rate_percent: 30 },
];

static OLD_SENIOR: [Slab; 4] = [
  Slab { lower: 0, upper: Some(300_000), rate_percent: 0 },
  Slab { lower: 300_000, upper: Some(500_000), rate_percent: 5 },
  Slab { lower: 500_000, upper: Some(1_000_000), rate_percent: 20 },
  Slab { lower: 1_000_000, upper: None, rate_percent: 30 },
];

static OLD_SUPER_SENIOR: [Slab; 3] = [
  Slab { lower: 0, upper: Some(500_000), rate_percent: 0 },
  Slab { lower: 500_000, upper: Some(1_000_000), rate_percent: 20 },
  Slab { lower: 1_000_000, upper: None, rate_percent: 30 },
];

static NEW_2024_25: [Slab; 6] = [
  Slab { lower: 0, upper: Some(300_000), rate_percent: 0 },
  Slab { lower: 300_000, upper: Some(700_000), rate_percent: 5 },
  Slab { lower: 700_000, upper: Some(1_000_000), rate_percent: 10 },
  Slab { lower: 1_000_000, upper: Some(1_200_000), rate_percent: 15 },
  Slab { lower: 1_200_000, upper: Some(1_500_000), rate_percent: 20 },
  Slab { lower: 1_500_000, upper: None, rate_percent: 30 },
];

static NEW_2025_26: [Slab; 7] = [
  Slab { lower: 0, upper: Some(400_000), rate_percent: 0 },
  Slab { lower: 400_000, upper: Some(800_000), rate_percent: 5 },
  Slab { lower: 800_000, upper: Some(1_200_000), rate_percent: 10 },
  Slab { lower: 1_200_000, upper: Some(1_600_000), rate_percent: 15 },
  Slab { lower: 1_600_000, upper: Some(2_000_000), rate_percent: 20 },
  Slab { lower: 2_000_000, upper: Some(2_400_000), rate_percent: 25 },
  Slab { lower: 2_400_000, upper: None, rate_percent: 30 },
];

// ─── Lookup ──────────────────────────────────────────────────────────────────

pub fn is_supported_year(financial_year: &str) -> bool {
  SUPPORTED_YEARS.contains(&financial_year)
}

/// Rules for `regime` in `financial_year`, for a taxpayer of `age`.
///
/// Only the old regime distinguishes senior (60+) and super-senior (80+)
/// taxpayers.
pub fn regime_rules(
  financial_year: &str,
  regime: Regime,
  age: u32,
) -> Result<RegimeRules> {
  if !is_supported_year(financial_year) {
    return Err(Error::UnsupportedFinancialYear(financial_year.to_owned()));
  }

  let rules = match regime {
    Regime::Old => RegimeRules {
      regime,
      slabs: match age {
        80.. => &OLD_SUPER_SENIOR[..],
        60..=79 => &OLD_SENIOR[..],
        _ => &OLD_BELOW_60[..],
      },
      standard_deduction: 50_000,
      rebate: Rebate { threshold: 500_000, max: 12_500 },
    },
    Regime::New if financial_year == "2024-25" => RegimeRules {
      regime,
      slabs: &NEW_2024_25[..],
      standard_deduction: 75_000,
      rebate: Rebate { threshold: 700_000, max: 25_000 },
    },
    Regime::New => RegimeRules {
      regime,
      slabs: &NEW_2025_26[..],
      standard_deduction: 75_000,
      rebate: Rebate { threshold: 1_200_000, max: 60_000 },
    },
  };
  Ok(rules)
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn slabs_are_contiguous_and_open_ended() {
    for year in SUPPORTED_YEARS {
      for regime in [Regime::Old, Regime::New] {
        for age in [30, 65, 85] {
          let rules = regime_rules(year, regime, age).unwrap();
          let slabs = rules.slabs;
          assert_eq!(slabs[0].lower, 0);
          for pair in slabs.windows(2) {
            assert_eq!(pair[0].upper, Some(pair[1].lower));
          }
          assert!(slabs.last().unwrap().upper.is_none());
        }
      }
    }
  }

  #[test]
  fn unknown_year_is_rejected() {
    let err = regime_rules("2019-20", Regime::New, 30).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFinancialYear(y) if y == "2019-20"));
  }

  #[test]
  fn senior_citizens_get_a_higher_exemption_under_the_old_regime() {
    let senior = regime_rules("2024-25", Regime::Old, 65).unwrap();
    assert_eq!(senior.slabs[0].upper, Some(300_000));
    let super_senior = regime_rules("2024-25", Regime::Old, 82).unwrap();
    assert_eq!(super_senior.slabs[0].upper, Some(500_000));
    let new = regime_rules("2024-25", Regime::New, 82).unwrap();
    assert_eq!(new.slabs[0].upper, Some(300_000));
  }

  #[test]
  fn regime_parses_from_its_wire_name() {
    assert_eq!("old".parse::<Regime>().unwrap(), Regime::Old);
    assert_eq!(Regime::New.to_string(), "new");
    assert!("both".parse::<Regime>().is_err());
  }
}
