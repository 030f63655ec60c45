//! Recommendations produced by the comparator and by the advisory service.

use std::cmp::Ordering;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Ordered most urgent first, so sorting ascending by priority puts `High`
/// at the front.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Priority {
  High,
  Medium,
  Low,
}

/// What area a recommendation concerns. The first four are produced by the
/// comparator; the rest come from advisory conversations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecommendationKind {
  RegimeChoice,
  DeductionOptimization,
  HraOptimization,
  ProfessionalTax,
  TaxOptimization,
  InvestmentAdvice,
  LifestyleAdjustments,
  LongTermPlanning,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
  #[serde(rename = "type")]
  pub kind:              RecommendationKind,
  pub title:             String,
  pub description:       String,
  pub priority:          Priority,
  #[serde(default)]
  pub estimated_savings: Decimal,
  #[serde(default)]
  pub action_items:      Vec<String>,
}

impl Recommendation {
  pub fn new(
    kind: RecommendationKind,
    priority: Priority,
    title: impl Into<String>,
    description: impl Into<String>,
  ) -> Self {
    Self {
      kind,
      title: title.into(),
      description: description.into(),
      priority,
      estimated_savings: Decimal::ZERO,
      action_items: Vec::new(),
    }
  }

  pub fn with_savings(mut self, savings: Decimal) -> Self {
    self.estimated_savings = savings;
    self
  }

  pub fn with_actions<I, S>(mut self, actions: I) -> Self
  where
    I: IntoIterator<Item = S>,
    S: Into<String>,
  {
    self.action_items = actions.into_iter().map(Into::into).collect();
    self
  }
}

/// How many recommendations there are at each priority.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecommendationSummary {
  pub total_recommendations: usize,
  pub high_priority:         usize,
  pub medium_priority:       usize,
  pub low_priority:          usize,
}

impl RecommendationSummary {
  pub fn of(recommendations: &[Recommendation]) -> Self {
    let mut summary = Self {
      total_recommendations: recommendations.len(),
      ..Self::default()
    };
    for r in recommendations {
      match r.priority {
        Priority::High => summary.high_priority += 1,
        Priority::Medium => summary.medium_priority += 1,
        Priority::Low => summary.low_priority += 1,
      }
    }
    summary
  }
}

/// Priority first (high → low), then larger estimated savings first. The sort
/// is stable, so equal entries keep their insertion order.
pub fn sort_recommendations(recommendations: &mut [Recommendation]) {
  recommendations.sort_by(|a, b| match a.priority.cmp(&b.priority) {
    Ordering::Equal => b.estimated_savings.cmp(&a.estimated_savings),
    other => other,
  });
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;
  use serde_json::json;

  use super::*;

  #[test]
  fn sorts_by_priority_then_savings() {
    let mut recs = vec![
      Recommendation::new(RecommendationKind::ProfessionalTax, Priority::Low, "a", ""),
      Recommendation::new(RecommendationKind::DeductionOptimization, Priority::Medium, "b", "")
        .with_savings(dec!(5000)),
      Recommendation::new(RecommendationKind::RegimeChoice, Priority::High, "c", ""),
      Recommendation::new(RecommendationKind::DeductionOptimization, Priority::Medium, "d", "")
        .with_savings(dec!(20000)),
      Recommendation::new(RecommendationKind::HraOptimization, Priority::Low, "e", ""),
    ];
    sort_recommendations(&mut recs);
    let titles: Vec<_> = recs.iter().map(|r| r.title.as_str()).collect();
    assert_eq!(titles, ["c", "d", "b", "a", "e"]);

    let summary = RecommendationSummary::of(&recs);
    assert_eq!(summary.total_recommendations, 5);
    assert_eq!(
      (summary.high_priority, summary.medium_priority, summary.low_priority),
      (1, 2, 2)
    );
  }

  #[test]
  fn wire_format_uses_type_and_snake_case() {
    let rec = Recommendation::new(
      RecommendationKind::DeductionOptimization,
      Priority::Medium,
      "Maximize 80C",
      "Invest more",
    )
    .with_savings(dec!(20000))
    .with_actions(["Open a PPF account"]);
    let value = serde_json::to_value(&rec).unwrap();
    assert_eq!(value["type"], "deduction_optimization");
    assert_eq!(value["priority"], "medium");
    assert_eq!(value["action_items"], json!(["Open a PPF account"]));
  }

  #[test]
  fn missing_optional_fields_default() {
    let rec: Recommendation = serde_json::from_value(json!({
      "type": "investment_advice",
      "title": "Health cover",
      "description": "Buy a family floater",
      "priority": "low",
    }))
    .unwrap();
    assert_eq!(rec.estimated_savings, Decimal::ZERO);
    assert!(rec.action_items.is_empty());
  }
}
