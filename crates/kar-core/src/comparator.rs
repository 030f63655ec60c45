//! Old-vs-new comparison and the rule-driven recommendations that accompany
//! it.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::{
  Result,
  calculator::{self, RegimeBreakdown},
  money::format_inr,
  profile::FinancialProfile,
  recommendation::{Priority, Recommendation, RecommendationKind, sort_recommendations},
  rules::{self, Regime, percent},
};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComparisonSummary {
  pub best_regime:        Regime,
  pub tax_savings:        Decimal,
  /// Savings as a percentage of the costlier regime's tax, to 2 dp.
  pub savings_percentage: Decimal,
}

/// Both breakdowns plus their summary. This is the structure persisted with a
/// comparison and returned to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationDetails {
  pub old_regime: RegimeBreakdown,
  pub new_regime: RegimeBreakdown,
  pub comparison: ComparisonSummary,
}

impl CalculationDetails {
  pub fn breakdown(&self, regime: Regime) -> &RegimeBreakdown {
    match regime {
      Regime::Old => &self.old_regime,
      Regime::New => &self.new_regime,
    }
  }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Comparison {
  pub details:         CalculationDetails,
  pub recommendations: Vec<Recommendation>,
}

/// Validate `profile`, run both regimes and derive recommendations.
pub fn compare(profile: &FinancialProfile) -> Result<Comparison> {
  profile.validate()?;
  let old_regime = calculator::calculate(profile, Regime::Old)?;
  let new_regime = calculator::calculate(profile, Regime::New)?;
  let comparison = summarize(&old_regime, &new_regime);
  let details = CalculationDetails { old_regime, new_regime, comparison };
  let recommendations = recommend(profile, &details);
  Ok(Comparison { details, recommendations })
}

/// The cheaper regime wins; an exact tie goes to the new regime.
pub fn summarize(old: &RegimeBreakdown, new: &RegimeBreakdown) -> ComparisonSummary {
  let best_regime = if old.total_tax < new.total_tax { Regime::Old } else { Regime::New };
  let tax_savings = (old.total_tax - new.total_tax).abs();
  let costlier = old.total_tax.max(new.total_tax);
  let savings_percentage = if costlier.is_zero() {
    Decimal::ZERO
  } else {
    (tax_savings / costlier * Decimal::ONE_HUNDRED).round_dp(2)
  };
  ComparisonSummary { best_regime, tax_savings, savings_percentage }
}

/// Rule-driven suggestions, most urgent first.
pub fn recommend(
  profile: &FinancialProfile,
  details: &CalculationDetails,
) -> Vec<Recommendation> {
  let summary = &details.comparison;
  let old = &details.old_regime;
  let mut out = Vec::new();

  out.push(regime_choice(summary));

  // Deduction estimates together never exceed the old-regime tax still owed.
  let marginal = percent(old.marginal_rate);
  let mut payable = old.total_tax;
  let mut estimate = |room: Decimal| {
    let saving = (marginal * room).min(payable).max(Decimal::ZERO);
    payable -= saving;
    saving
  };

  let room_80c = Decimal::from(rules::LIMIT_80C) - profile.deduction_80c;
  let saving_80c = estimate(room_80c);
  if room_80c > Decimal::ZERO && saving_80c > Decimal::ZERO {
    out.push(
      Recommendation::new(
        RecommendationKind::DeductionOptimization,
        Priority::Medium,
        "Maximize Section 80C deductions",
        format!(
          "You can invest {} more under Section 80C (ELSS, PPF, life \
           insurance premiums) to lower your old-regime tax.",
          format_inr(room_80c)
        ),
      )
      .with_savings(saving_80c)
      .with_actions([
        "Review existing 80C investments",
        "Consider ELSS funds for tax saving with equity exposure",
        "Top up PPF before the financial year ends",
      ]),
    );
  }

  let room_80d = Decimal::from(rules::LIMIT_80D) - profile.deduction_80d;
  let saving_80d = estimate(room_80d);
  if room_80d > Decimal::ZERO && saving_80d > Decimal::ZERO {
    out.push(
      Recommendation::new(
        RecommendationKind::DeductionOptimization,
        Priority::Medium,
        "Use the Section 80D health-insurance deduction",
        format!(
          "Health-insurance premiums of up to {} more are deductible under \
           Section 80D in the old regime.",
          format_inr(room_80d)
        ),
      )
      .with_savings(saving_80d)
      .with_actions(["Buy or upgrade health cover for yourself and family"]),
    );
  }

  if old.deductions.hra_exemption.is_zero()
    && profile.gross_salary > Decimal::from(600_000)
  {
    out.push(
      Recommendation::new(
        RecommendationKind::HraOptimization,
        Priority::Low,
        "Claim house rent allowance",
        "No HRA exemption applies to you. If you pay rent, restructuring your \
         salary to include HRA and keeping rent receipts can reduce old-regime \
         tax.",
      )
      .with_actions(["Ask your employer about an HRA component", "Keep rent receipts"]),
    );
  }

  if profile.professional_tax.is_zero() {
    out.push(
      Recommendation::new(
        RecommendationKind::ProfessionalTax,
        Priority::Low,
        "Check professional tax",
        format!(
          "Professional tax paid (up to {}) is deductible in both regimes. \
           Check whether your state levies it and your employer deducts it.",
          format_inr(Decimal::from(rules::LIMIT_PROFESSIONAL_TAX))
        ),
      ),
    );
  }

  sort_recommendations(&mut out);
  out
}

fn regime_choice(summary: &ComparisonSummary) -> Recommendation {
  let savings = format_inr(summary.tax_savings);
  if summary.best_regime != Regime::DEFAULT {
    return Recommendation::new(
      RecommendationKind::RegimeChoice,
      Priority::High,
      "Choose the old regime",
      format!(
        "Your exemptions and deductions make the old regime cheaper by {savings} \
         ({}%). You must opt out of the default new regime when filing.",
        summary.savings_percentage
      ),
    )
    .with_savings(summary.tax_savings)
    .with_actions([
      "Inform your employer of your regime choice",
      "Keep proofs of all exemptions and deductions",
    ]);
  }

  let description = if summary.tax_savings.is_zero() {
    "Both regimes give the same tax. The new regime needs no investment proofs."
      .to_owned()
  } else {
    format!(
      "The new regime saves you {savings} ({}%) with simpler compliance.",
      summary.savings_percentage
    )
  };
  Recommendation::new(
    RecommendationKind::RegimeChoice,
    Priority::Medium,
    "Stay with the new regime",
    description,
  )
  .with_savings(summary.tax_savings)
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  fn salaried() -> FinancialProfile {
    let mut p = FinancialProfile::new("2024-25", 30, dec!(1200000), dec!(600000));
    p.hra_received = dec!(240000);
    p.rent_paid = dec!(300000);
    p.deduction_80c = dec!(150000);
    p.deduction_80d = dec!(25000);
    p
  }

  #[test]
  fn worked_example_prefers_the_old_regime() {
    let c = compare(&salaried()).unwrap();
    let s = &c.details.comparison;
    assert_eq!(c.details.old_regime.total_tax, dec!(61880));
    assert_eq!(c.details.new_regime.total_tax, dec!(75400));
    assert_eq!(s.best_regime, Regime::Old);
    assert_eq!(s.tax_savings, dec!(13520));
    assert_eq!(s.savings_percentage, dec!(17.93));

    let first = &c.recommendations[0];
    assert_eq!(first.kind, RecommendationKind::RegimeChoice);
    assert_eq!(first.priority, Priority::High);
    assert_eq!(first.estimated_savings, dec!(13520));
  }

  #[test]
  fn exact_tie_goes_to_the_new_regime() {
    let p = FinancialProfile::new("2024-25", 30, dec!(400000), dec!(200000));
    let c = compare(&p).unwrap();
    assert_eq!(c.details.old_regime.total_tax, Decimal::ZERO);
    assert_eq!(c.details.new_regime.total_tax, Decimal::ZERO);
    assert_eq!(c.details.comparison.best_regime, Regime::New);
    assert_eq!(c.details.comparison.savings_percentage, Decimal::ZERO);
    let choice = &c.recommendations[0];
    assert_eq!(choice.priority, Priority::Medium);
    assert_eq!(choice.title, "Stay with the new regime");
  }

  #[test]
  fn best_regime_has_strictly_lower_tax() {
    for gross in [dec!(500000), dec!(900000), dec!(1800000), dec!(5000000)] {
      let p = FinancialProfile::new("2024-25", 35, gross, gross / dec!(2));
      let c = compare(&p).unwrap();
      let d = &c.details;
      let best = d.breakdown(d.comparison.best_regime).total_tax;
      let other = match d.comparison.best_regime {
        Regime::Old => d.new_regime.total_tax,
        Regime::New => d.old_regime.total_tax,
      };
      assert!(best <= other);
      if d.comparison.best_regime == Regime::Old {
        assert!(best < other);
      }
    }
  }

  #[test]
  fn unused_80c_room_is_priced_at_the_marginal_rate() {
    let mut p = salaried();
    p.deduction_80c = dec!(50000);
    let c = compare(&p).unwrap();
    assert_eq!(c.details.old_regime.taxable_income, dec!(835000));
    let rec = c
      .recommendations
      .iter()
      .find(|r| r.title.contains("80C"))
      .unwrap();
    assert_eq!(rec.priority, Priority::Medium);
    assert_eq!(rec.estimated_savings, dec!(20000));
  }

  #[test]
  fn deduction_savings_never_exceed_the_old_regime_tax() {
    let p = FinancialProfile::new("2024-25", 30, dec!(600000), dec!(300000));
    let c = compare(&p).unwrap();
    assert_eq!(c.details.old_regime.total_tax, dec!(23400));
    let deduction_advice: Vec<_> = c
      .recommendations
      .iter()
      .filter(|r| r.kind == RecommendationKind::DeductionOptimization)
      .collect();
    assert_eq!(deduction_advice.len(), 1);
    assert!(deduction_advice[0].title.contains("80C"));
    assert_eq!(deduction_advice[0].estimated_savings, dec!(23400));
  }

  #[test]
  fn no_deduction_advice_when_the_rebate_clears_the_tax() {
    let p = FinancialProfile::new("2024-25", 30, dec!(450000), dec!(200000));
    let c = compare(&p).unwrap();
    assert_eq!(c.details.old_regime.total_tax, Decimal::ZERO);
    assert!(
      !c.recommendations
        .iter()
        .any(|r| r.kind == RecommendationKind::DeductionOptimization)
    );
  }

  #[test]
  fn full_deductions_produce_no_deduction_advice() {
    let c = compare(&salaried()).unwrap();
    assert!(
      !c.recommendations
        .iter()
        .any(|r| r.kind == RecommendationKind::DeductionOptimization)
    );
  }

  #[test]
  fn missing_hra_and_professional_tax_get_low_priority_advice() {
    let mut p = salaried();
    p.hra_received = Decimal::ZERO;
    let c = compare(&p).unwrap();
    let kinds: Vec<_> = c
      .recommendations
      .iter()
      .filter(|r| r.priority == Priority::Low)
      .map(|r| r.kind)
      .collect();
    assert_eq!(
      kinds,
      [RecommendationKind::HraOptimization, RecommendationKind::ProfessionalTax]
    );
  }

  #[test]
  fn recommendations_are_ordered() {
    let mut p = FinancialProfile::new("2024-25", 30, dec!(1500000), dec!(700000));
    p.deduction_80c = dec!(100000);
    let c = compare(&p).unwrap();
    for pair in c.recommendations.windows(2) {
      assert!(pair[0].priority <= pair[1].priority);
      if pair[0].priority == pair[1].priority {
        assert!(pair[0].estimated_savings >= pair[1].estimated_savings);
      }
    }
  }

  #[test]
  fn invalid_profiles_never_reach_the_calculator() {
    let mut p = salaried();
    p.basic_salary = dec!(2000000);
    assert!(matches!(compare(&p), Err(crate::Error::Validation(_))));
  }
}
