//! An advisor that needs no external service.
//!
//! Questions and recommendations are derived from the advisory context alone.
//! Used when no advisory service is configured.

use kar_core::{
  money::format_inr,
  recommendation::{Priority, Recommendation, RecommendationKind, sort_recommendations},
  rules::{self, percent},
  session::Exchange,
};
use rust_decimal::Decimal;

use crate::{Advisor, AdvisorError, AdvisoryContext, FinalAdvice, summarize_transcript};

/// Savings above this make the opening question lead with them.
const NOTABLE_SAVINGS: i64 = 5_000;

const FOLLOW_UPS: [&str; 4] = [
  "What's your current approach to tax-saving investments? Are you interested \
   in ELSS mutual funds, PPF, or other options?",
  "Do you have health insurance coverage for your family? This can provide \
   both tax benefits and financial protection.",
  "Are you planning to invest your tax savings, or do you have other financial \
   priorities like home loan prepayment?",
  "What's your risk tolerance for investments? Are you comfortable with equity \
   mutual funds or do you prefer safer options like debt funds?",
];

#[derive(Debug, Clone, Copy, Default)]
pub struct RuleBasedAdvisor;

impl RuleBasedAdvisor {
  pub fn opening(context: &AdvisoryContext) -> String {
    let income = format_inr(context.gross_salary);
    if context.tax_savings > Decimal::from(NOTABLE_SAVINGS) {
      format!(
        "I see you're earning {income} annually with {} in potential tax savings. \
         What's your primary financial goal this year: building an emergency \
         fund, planning for retirement, or maximizing your tax savings?",
        format_inr(context.tax_savings)
      )
    } else {
      format!(
        "With your {income} annual income, what's your main financial priority: \
         building wealth through investments, planning for retirement, or saving \
         for a specific goal?"
      )
    }
  }

  /// The question for round `round` (2 or later), cycling through a fixed
  /// set.
  pub fn follow_up(round: u32) -> &'static str {
    let index = (round.saturating_sub(2) as usize) % FOLLOW_UPS.len();
    FOLLOW_UPS[index]
  }

  pub fn advice(context: &AdvisoryContext, transcript: &[Exchange]) -> FinalAdvice {
    let marginal = percent(context.old_regime_marginal_rate);
    let mut payable = context.old_regime_tax;
    let mut estimate = |room: Decimal| {
      let saving = (marginal * room).min(payable).max(Decimal::ZERO);
      payable -= saving;
      saving
    };
    let mut recommendations = vec![
      Recommendation::new(
        RecommendationKind::TaxOptimization,
        Priority::High,
        "Optimize Tax Regime Selection",
        format!(
          "Choosing the {} regime saves you {}. Investing that amount each year \
           compounds into long-term wealth.",
          context.best_regime,
          format_inr(context.tax_savings)
        ),
      )
      .with_savings(context.tax_savings)
      .with_actions([
        "Review your current tax regime selection",
        "Declare the recommended regime to your employer",
        "Confirm the choice before filing your return",
      ]),
    ];

    let room_80c = Decimal::from(rules::LIMIT_80C) - context.deduction_80c;
    if room_80c > Decimal::ZERO {
      recommendations.push(
        Recommendation::new(
          RecommendationKind::TaxOptimization,
          Priority::High,
          "Maximize 80C Deductions",
          format!(
            "You have {} of unused Section 80C room. ELSS mutual funds, PPF or \
             voluntary EPF contributions can fill it.",
            format_inr(room_80c)
          ),
        )
        .with_savings(estimate(room_80c))
        .with_actions([
          "Start an SIP in ELSS mutual funds",
          "Consider a PPF account",
          "Increase voluntary EPF contributions",
        ]),
      );
    }

    let room_80d = Decimal::from(rules::LIMIT_80D) - context.deduction_80d;
    if room_80d > Decimal::ZERO {
      recommendations.push(
        Recommendation::new(
          RecommendationKind::InvestmentAdvice,
          Priority::Medium,
          "Health Insurance Planning",
          "Comprehensive family health cover protects against medical \
           emergencies and its premium is deductible under Section 80D.",
        )
        .with_savings(estimate(room_80d))
        .with_actions([
          "Research family floater health insurance plans",
          "Compare coverage and premiums",
          "Buy the policy before 31 March to claim it this year",
        ]),
      );
    }

    sort_recommendations(&mut recommendations);
    FinalAdvice { recommendations, summary: summarize_transcript(transcript) }
  }
}

impl Advisor for RuleBasedAdvisor {
  async fn opening_question(&self, context: &AdvisoryContext) -> Result<String, AdvisorError> {
    Ok(Self::opening(context))
  }

  async fn follow_up_question(
    &self,
    _context: &AdvisoryContext,
    transcript: &[Exchange],
  ) -> Result<String, AdvisorError> {
    let next_round = transcript.last().map_or(1, |e| e.round + 1);
    Ok(Self::follow_up(next_round).to_owned())
  }

  async fn final_advice(
    &self,
    context: &AdvisoryContext,
    transcript: &[Exchange],
  ) -> Result<FinalAdvice, AdvisorError> {
    Ok(Self::advice(context, transcript))
  }
}

#[cfg(test)]
mod tests {
  use kar_core::rules::Regime;
  use rust_decimal_macros::dec;

  use super::*;

  pub fn context() -> AdvisoryContext {
    AdvisoryContext {
      financial_year:           "2024-25".into(),
      gross_salary:             dec!(1200000),
      hra_received:             dec!(240000),
      rent_paid:                dec!(300000),
      deduction_80c:            dec!(50000),
      deduction_80d:            dec!(25000),
      old_regime_tax:           dec!(61880),
      new_regime_tax:           dec!(75400),
      best_regime:              Regime::Old,
      tax_savings:              dec!(13520),
      old_regime_marginal_rate: 20,
    }
  }

  #[test]
  fn opening_mentions_notable_savings() {
    let q = RuleBasedAdvisor::opening(&context());
    assert!(q.contains("₹12,00,000"));
    assert!(q.contains("₹13,520"));

    let mut small = context();
    small.tax_savings = dec!(4000);
    let q = RuleBasedAdvisor::opening(&small);
    assert!(q.starts_with("With your ₹12,00,000 annual income"));
  }

  #[test]
  fn follow_ups_cycle() {
    assert_eq!(RuleBasedAdvisor::follow_up(2), FOLLOW_UPS[0]);
    assert_eq!(RuleBasedAdvisor::follow_up(4), FOLLOW_UPS[2]);
    assert_eq!(RuleBasedAdvisor::follow_up(6), FOLLOW_UPS[0]);
  }

  #[test]
  fn advice_covers_regime_and_unused_80c() {
    let transcript = vec![Exchange {
      round:    1,
      question: "Goal?".into(),
      response: "Retirement".into(),
    }];
    let advice = RuleBasedAdvisor::advice(&context(), &transcript);
    let titles: Vec<_> = advice.recommendations.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["Maximize 80C Deductions", "Optimize Tax Regime Selection"]);
    assert_eq!(advice.recommendations[0].estimated_savings, dec!(20000));
    assert_eq!(advice.summary, "Q1: Goal?\nA1: Retirement");
  }

  #[test]
  fn estimated_savings_are_bounded_by_old_regime_tax() {
    let mut ctx = context();
    ctx.deduction_80c = Decimal::ZERO;
    ctx.deduction_80d = Decimal::ZERO;
    ctx.old_regime_tax = dec!(12000);
    let advice = RuleBasedAdvisor::advice(&ctx, &[]);
    let saving = |title: &str| {
      advice
        .recommendations
        .iter()
        .find(|r| r.title == title)
        .map(|r| r.estimated_savings)
        .unwrap()
    };
    assert_eq!(saving("Maximize 80C Deductions"), dec!(12000));
    assert_eq!(saving("Health Insurance Planning"), Decimal::ZERO);
  }

  #[test]
  fn health_cover_is_suggested_when_80d_is_unused() {
    let mut ctx = context();
    ctx.deduction_80d = Decimal::ZERO;
    let advice = RuleBasedAdvisor::advice(&ctx, &[]);
    let health = advice
      .recommendations
      .iter()
      .find(|r| r.kind == RecommendationKind::InvestmentAdvice)
      .unwrap();
    assert_eq!(health.priority, Priority::Medium);
    assert_eq!(health.estimated_savings, dec!(5000));
  }
}
