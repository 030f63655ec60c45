//! The regime calculator: one [`FinancialProfile`] and one [`Regime`] in, a
//! full tax breakdown out.
//!
//! The calculation is pure. All arithmetic is exact decimal; nothing is
//! rounded here, so `cess_amount` is exactly 4% of the post-rebate tax.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  profile::FinancialProfile,
  rules::{self, Regime, RegimeRules, percent},
};

/// Every amount subtracted from gross total income, capped per statute.
/// Items a regime does not allow are zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeductionBreakdown {
  pub hra_exemption:      Decimal,
  pub lta_exemption:      Decimal,
  pub other_exemptions:   Decimal,
  pub standard_deduction: Decimal,
  pub professional_tax:   Decimal,
  pub deduction_80c:      Decimal,
  pub deduction_80d:      Decimal,
  pub deduction_80dd:     Decimal,
  pub deduction_80e:      Decimal,
  pub deduction_80tta:    Decimal,
  pub home_loan_interest: Decimal,
  pub other_deductions:   Decimal,
  pub total:              Decimal,
}

impl DeductionBreakdown {
  fn sum(&self) -> Decimal {
    self.hra_exemption
      + self.lta_exemption
      + self.other_exemptions
      + self.standard_deduction
      + self.professional_tax
      + self.deduction_80c
      + self.deduction_80d
      + self.deduction_80dd
      + self.deduction_80e
      + self.deduction_80tta
      + self.home_loan_interest
      + self.other_deductions
  }
}

/// The share of taxable income that fell into one slab.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SlabTax {
  pub lower:          Decimal,
  pub upper:          Option<Decimal>,
  pub rate_percent:   u32,
  pub taxable_amount: Decimal,
  pub tax:            Decimal,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegimeBreakdown {
  pub regime:             Regime,
  pub gross_total_income: Decimal,
  pub deductions:         DeductionBreakdown,
  pub taxable_income:     Decimal,
  pub slab_tax:           Vec<SlabTax>,
  pub tax_before_rebate:  Decimal,
  pub rebate:             Decimal,
  pub tax_after_rebate:   Decimal,
  pub cess_amount:        Decimal,
  pub total_tax:          Decimal,
  /// Rate of the slab holding the last rupee of taxable income.
  pub marginal_rate:      u32,
}

/// Compute the tax owed on `profile` under `regime`.
///
/// Fails only when no rule table exists for the profile's financial year.
pub fn calculate(
  profile: &FinancialProfile,
  regime: Regime,
) -> Result<RegimeBreakdown> {
  let rules = rules::regime_rules(&profile.financial_year, regime, profile.age)?;

  let gross_total_income = profile.gross_salary + profile.other_income_or_zero();
  let deductions = deductions(profile, &rules);
  let taxable_income = (gross_total_income - deductions.total).max(Decimal::ZERO);

  let slab_tax = slab_tax(&rules, taxable_income);
  let tax_before_rebate: Decimal = slab_tax.iter().map(|s| s.tax).sum();

  let rebate = if taxable_income <= Decimal::from(rules.rebate.threshold) {
    tax_before_rebate.min(Decimal::from(rules.rebate.max))
  } else {
    Decimal::ZERO
  };
  let tax_after_rebate = tax_before_rebate - rebate;
  let cess_amount = tax_after_rebate * percent(rules::CESS_PERCENT);

  Ok(RegimeBreakdown {
    regime,
    gross_total_income,
    deductions,
    taxable_income,
    marginal_rate: marginal_rate(&rules, taxable_income),
    slab_tax,
    tax_before_rebate,
    rebate,
    tax_after_rebate,
    cess_amount,
    total_tax: tax_after_rebate + cess_amount,
  })
}

fn deductions(profile: &FinancialProfile, rules: &RegimeRules) -> DeductionBreakdown {
  let capped = |value: Decimal, limit: i64| value.min(Decimal::from(limit));

  let mut d = DeductionBreakdown {
    standard_deduction: profile
      .standard_deduction
      .min(rules.standard_deduction_limit()),
    professional_tax: capped(profile.professional_tax, rules::LIMIT_PROFESSIONAL_TAX),
    ..Default::default()
  };

  if rules.regime == Regime::Old {
    d.hra_exemption = hra_exemption(profile);
    d.lta_exemption = profile.lta_received;
    d.other_exemptions = profile.other_exemptions;
    d.deduction_80c = capped(profile.deduction_80c, rules::LIMIT_80C);
    d.deduction_80d = capped(profile.deduction_80d, rules::LIMIT_80D);
    d.deduction_80dd = capped(profile.deduction_80dd, rules::LIMIT_80DD);
    d.deduction_80e = capped(profile.deduction_80e, rules::LIMIT_80E);
    d.deduction_80tta = capped(profile.deduction_80tta, rules::LIMIT_80TTA);
    d.home_loan_interest =
      capped(profile.home_loan_interest, rules::LIMIT_HOME_LOAN_INTEREST);
    d.other_deductions = profile.other_deductions_or_zero();
  }

  d.total = d.sum();
  d
}

/// Least of: HRA actually received, rent paid in excess of 10% of basic, and
/// 50% (metro) or 40% of basic.
pub fn hra_exemption(profile: &FinancialProfile) -> Decimal {
  if profile.hra_received.is_zero() || profile.rent_paid.is_zero() {
    return Decimal::ZERO;
  }
  let basic = profile.basic_salary;
  let rent_over_basic = (profile.rent_paid - basic * percent(10)).max(Decimal::ZERO);
  let city_limit = basic * percent(if profile.metro_city { 50 } else { 40 });
  profile.hra_received.min(rent_over_basic).min(city_limit)
}

fn slab_tax(rules: &RegimeRules, taxable_income: Decimal) -> Vec<SlabTax> {
  rules
    .slabs
    .iter()
    .map(|slab| {
      let lower = Decimal::from(slab.lower);
      let upper = slab.upper.map(Decimal::from);
      (lower, upper, slab.rate_percent)
    })
    .take_while(|(lower, ..)| taxable_income > *lower)
    .map(|(lower, upper, rate_percent)| {
      let top = upper.map_or(taxable_income, |u| u.min(taxable_income));
      let taxable_amount = top - lower;
      SlabTax {
        lower,
        upper,
        rate_percent,
        taxable_amount,
        tax: taxable_amount * percent(rate_percent),
      }
    })
    .collect()
}

fn marginal_rate(rules: &RegimeRules, taxable_income: Decimal) -> u32 {
  rules
    .slabs
    .iter()
    .find(|slab| slab.upper.is_none_or(|u| taxable_income <= Decimal::from(u)))
    .map_or(0, |slab| slab.rate_percent)
}
