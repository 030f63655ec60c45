//! The financial profile a tax comparison is computed from, and its
//! validation rules.
//!
//! # Serialization
//!
//! Every amount is an exact [`Decimal`] and may arrive as a JSON number or a
//! numeric string. The two nullable amounts (`other_deductions`,
//! `other_income`) additionally treat the empty string exactly like `null` or
//! a missing key: the value was omitted. Form inputs left blank therefore map
//! to `None`, never to zero.

use rust_decimal::Decimal;
use serde::{Deserialize, Deserializer, Serialize, de};

use crate::{
  Result, ValidationErrors,
  money::format_inr,
  rules::{self, DEFAULT_STANDARD_DEDUCTION},
};

/// Salary, exemption and deduction figures for one taxpayer and one
/// financial year.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialProfile {
  /// `"YYYY-YY"`, e.g. `"2024-25"`.
  #[serde(default = "default_financial_year")]
  pub financial_year:     String,
  /// Age as on 31 March of the financial year.
  pub age:                u32,
  pub gross_salary:       Decimal,
  pub basic_salary:       Decimal,
  #[serde(default)]
  pub hra_received:       Decimal,
  /// Annual rent paid.
  #[serde(default)]
  pub rent_paid:          Decimal,
  #[serde(default)]
  pub lta_received:       Decimal,
  /// Other Section 10 allowances claimed as exempt.
  #[serde(default)]
  pub other_exemptions:   Decimal,
  #[serde(default)]
  pub deduction_80c:      Decimal,
  #[serde(default)]
  pub deduction_80d:      Decimal,
  #[serde(default)]
  pub deduction_80dd:     Decimal,
  #[serde(default)]
  pub deduction_80e:      Decimal,
  #[serde(default)]
  pub deduction_80tta:    Decimal,
  /// Section 24(b) interest on a self-occupied home loan.
  #[serde(default)]
  pub home_loan_interest: Decimal,
  /// 80G, 80U and the like.
  #[serde(default, deserialize_with = "optional_amount")]
  pub other_deductions:   Option<Decimal>,
  /// Income from other sources.
  #[serde(default, deserialize_with = "optional_amount")]
  pub other_income:       Option<Decimal>,
  #[serde(default = "default_standard_deduction")]
  pub standard_deduction: Decimal,
  #[serde(default)]
  pub professional_tax:   Decimal,
  #[serde(default)]
  pub tds:                Decimal,
  /// Selects the 50% (metro) or 40% (other cities) HRA limit.
  #[serde(default = "default_metro_city")]
  pub metro_city:         bool,
}

fn default_financial_year() -> String { "2024-25".to_owned() }

fn default_standard_deduction() -> Decimal {
  Decimal::from(DEFAULT_STANDARD_DEDUCTION)
}

fn default_metro_city() -> bool { true }

/// Accepts `null`, `""`, a number, or a numeric string.
fn optional_amount<'de, D>(deserializer: D) -> Result<Option<Decimal>, D::Error>
where
  D: Deserializer<'de>,
{
  #[derive(Deserialize)]
  #[serde(untagged)]
  enum Raw {
    Number(Decimal),
    Text(String),
  }

  match Option::<Raw>::deserialize(deserializer)? {
    None => Ok(None),
    Some(Raw::Number(n)) => Ok(Some(n)),
    Some(Raw::Text(s)) if s.trim().is_empty() => Ok(None),
    Some(Raw::Text(s)) => s.trim().parse().map(Some).map_err(de::Error::custom),
  }
}

impl FinancialProfile {
  /// A profile with the given salary split and every optional figure at its
  /// default.
  pub fn new(financial_year: &str, age: u32, gross: Decimal, basic: Decimal) -> Self {
    Self {
      financial_year:     financial_year.to_owned(),
      age,
      gross_salary:       gross,
      basic_salary:       basic,
      hra_received:       Decimal::ZERO,
      rent_paid:          Decimal::ZERO,
      lta_received:       Decimal::ZERO,
      other_exemptions:   Decimal::ZERO,
      deduction_80c:      Decimal::ZERO,
      deduction_80d:      Decimal::ZERO,
      deduction_80dd:     Decimal::ZERO,
      deduction_80e:      Decimal::ZERO,
      deduction_80tta:    Decimal::ZERO,
      home_loan_interest: Decimal::ZERO,
      other_deductions:   None,
      other_income:       None,
      standard_deduction: default_standard_deduction(),
      professional_tax:   Decimal::ZERO,
      tds:                Decimal::ZERO,
      metro_city:         true,
    }
  }

  pub fn other_income_or_zero(&self) -> Decimal {
    self.other_income.unwrap_or_default()
  }

  pub fn other_deductions_or_zero(&self) -> Decimal {
    self.other_deductions.unwrap_or_default()
  }

  fn amounts(&self) -> [(&'static str, Decimal); 17] {
    [
      ("gross_salary", self.gross_salary),
      ("basic_salary", self.basic_salary),
      ("hra_received", self.hra_received),
      ("rent_paid", self.rent_paid),
      ("lta_received", self.lta_received),
      ("other_exemptions", self.other_exemptions),
      ("deduction_80c", self.deduction_80c),
      ("deduction_80d", self.deduction_80d),
      ("deduction_80dd", self.deduction_80dd),
      ("deduction_80e", self.deduction_80e),
      ("deduction_80tta", self.deduction_80tta),
      ("home_loan_interest", self.home_loan_interest),
      ("other_deductions", self.other_deductions_or_zero()),
      ("other_income", self.other_income_or_zero()),
      ("standard_deduction", self.standard_deduction),
      ("professional_tax", self.professional_tax),
      ("tds", self.tds),
    ]
  }

  /// Check every field and report all failures together.
  pub fn validate(&self) -> Result<()> {
    let mut errors = ValidationErrors::default();

    if !is_financial_year(&self.financial_year) {
      errors.push("financial_year", "must be in the form YYYY-YY (e.g. 2024-25)");
    } else if !rules::is_supported_year(&self.financial_year) {
      errors.push(
        "financial_year",
        format!("no tax rules available for {}", self.financial_year),
      );
    }

    if !(18..=100).contains(&self.age) {
      errors.push("age", "must be between 18 and 100");
    }

    let ceiling = Decimal::from(rules::MAX_AMOUNT);
    for (field, value) in self.amounts() {
      if value.is_sign_negative() && !value.is_zero() {
        errors.push(field, "cannot be negative");
      } else if value > ceiling {
        errors.push(field, format!("cannot exceed {}", format_inr(ceiling)));
      }
    }

    if self.gross_salary <= Decimal::ZERO {
      errors.push("gross_salary", "must be greater than zero");
    }
    if self.basic_salary > self.gross_salary {
      errors.push("basic_salary", "cannot be greater than gross salary");
    }

    let caps = [
      ("deduction_80c", self.deduction_80c, rules::LIMIT_80C),
      ("deduction_80d", self.deduction_80d, rules::LIMIT_80D),
      ("deduction_80dd", self.deduction_80dd, rules::LIMIT_80DD),
      ("deduction_80e", self.deduction_80e, rules::LIMIT_80E),
      ("deduction_80tta", self.deduction_80tta, rules::LIMIT_80TTA),
      ("home_loan_interest", self.home_loan_interest, rules::LIMIT_HOME_LOAN_INTEREST),
    ];
    for (field, value, limit) in caps {
      let limit = Decimal::from(limit);
      if value > limit {
        errors.push(field, format!("cannot exceed {}", format_inr(limit)));
      }
    }

    errors.into_result()
  }
}

/// `YYYY-YY` where the second year follows the first.
fn is_financial_year(s: &str) -> bool {
  let bytes = s.as_bytes();
  if bytes.len() != 7 || bytes[4] != b'-' {
    return false;
  }
  let (start, end) = (&s[..4], &s[5..]);
  if !start.bytes().chain(end.bytes()).all(|b| b.is_ascii_digit()) {
    return false;
  }
  match (start.parse::<u32>(), end.parse::<u32>()) {
    (Ok(start), Ok(end)) => (start + 1) % 100 == end,
    _ => false,
  }
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;
  use serde_json::json;

  use super::*;
  use crate::Error;

  fn profile() -> FinancialProfile {
    FinancialProfile::new("2024-25", 30, dec!(1200000), dec!(600000))
  }

  fn failing_fields(p: &FinancialProfile) -> Vec<&'static str> {
    match p.validate() {
      Err(Error::Validation(v)) => v.fields().iter().map(|f| f.field).collect(),
      other => panic!("expected validation failure, got {other:?}"),
    }
  }

  #[test]
  fn a_plain_profile_is_valid() {
    assert!(profile().validate().is_ok());
  }

  #[test]
  fn basic_above_gross_is_rejected() {
    let mut p = profile();
    p.basic_salary = dec!(1300000);
    assert_eq!(failing_fields(&p), ["basic_salary"]);
  }

  #[test]
  fn age_outside_range_is_rejected() {
    let mut p = profile();
    p.age = 17;
    assert_eq!(failing_fields(&p), ["age"]);
    p.age = 101;
    assert_eq!(failing_fields(&p), ["age"]);
  }

  #[test]
  fn every_capped_deduction_is_checked() {
    let mut p = profile();
    p.deduction_80c = dec!(150001);
    p.deduction_80d = dec!(25001);
    p.deduction_80dd = dec!(125001);
    p.deduction_80e = dec!(40001);
    p.deduction_80tta = dec!(10001);
    p.home_loan_interest = dec!(200001);
    assert_eq!(
      failing_fields(&p),
      [
        "deduction_80c",
        "deduction_80d",
        "deduction_80dd",
        "deduction_80e",
        "deduction_80tta",
        "home_loan_interest",
      ]
    );
  }

  #[test]
  fn caps_are_inclusive() {
    let mut p = profile();
    p.deduction_80c = dec!(150000);
    p.home_loan_interest = dec!(200000);
    assert!(p.validate().is_ok());
  }

  #[test]
  fn negative_amounts_are_rejected() {
    let mut p = profile();
    p.rent_paid = dec!(-1);
    p.other_income = Some(dec!(-5));
    assert_eq!(failing_fields(&p), ["rent_paid", "other_income"]);
  }

  #[test]
  fn amounts_above_five_crore_are_rejected() {
    let mut p = profile();
    p.gross_salary = dec!(50000000000000000000000000000);
    p.other_income = Some(dec!(50000000000000000000000000000));
    assert_eq!(failing_fields(&p), ["gross_salary", "other_income"]);

    let mut p = profile();
    p.gross_salary = Decimal::from(rules::MAX_AMOUNT);
    assert!(p.validate().is_ok());
    p.rent_paid = Decimal::from(rules::MAX_AMOUNT + 1);
    assert_eq!(failing_fields(&p), ["rent_paid"]);
  }

  #[test]
  fn financial_year_format_and_support() {
    let mut p = profile();
    p.financial_year = "2024-26".into();
    assert_eq!(failing_fields(&p), ["financial_year"]);
    p.financial_year = "24-25".into();
    assert_eq!(failing_fields(&p), ["financial_year"]);
    p.financial_year = "2019-20".into();
    assert_eq!(failing_fields(&p), ["financial_year"]);
    p.financial_year = "2025-26".into();
    assert!(p.validate().is_ok());
  }

  #[test]
  fn blank_optional_amounts_mean_omitted() {
    let p: FinancialProfile = serde_json::from_value(json!({
      "age": 30,
      "gross_salary": 900000,
      "basic_salary": "450000",
      "other_deductions": "",
      "other_income": null,
    }))
    .unwrap();
    assert_eq!(p.other_deductions, None);
    assert_eq!(p.other_income, None);
    assert_eq!(p.basic_salary, dec!(450000));
    assert_eq!(p.standard_deduction, dec!(50000));
    assert_eq!(p.financial_year, "2024-25");
    assert!(p.metro_city);
  }

  #[test]
  fn numeric_strings_fill_optional_amounts() {
    let p: FinancialProfile = serde_json::from_value(json!({
      "age": 30,
      "gross_salary": 900000,
      "basic_salary": 450000,
      "other_income": " 12000 ",
    }))
    .unwrap();
    assert_eq!(p.other_income, Some(dec!(12000)));
  }

  #[test]
  fn garbage_in_an_optional_amount_is_a_parse_error() {
    let r: std::result::Result<FinancialProfile, _> =
      serde_json::from_value(json!({
        "age": 30,
        "gross_salary": 900000,
        "basic_salary": 450000,
        "other_income": "lots",
      }));
    assert!(r.is_err());
  }
}
