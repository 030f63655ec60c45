//! The financial snapshot an advisor reasons over.

use kar_core::{
  money::format_inr,
  profile::FinancialProfile,
  rules::Regime,
  session::TaxComparison,
};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Profile highlights and comparison outcome for one session. Also returned to
/// clients as the conversation's financial summary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdvisoryContext {
  pub financial_year:           String,
  pub gross_salary:             Decimal,
  pub hra_received:             Decimal,
  pub rent_paid:                Decimal,
  pub deduction_80c:            Decimal,
  pub deduction_80d:            Decimal,
  pub old_regime_tax:           Decimal,
  pub new_regime_tax:           Decimal,
  pub best_regime:              Regime,
  pub tax_savings:              Decimal,
  /// Rate of the old-regime slab holding the last rupee of taxable income.
  pub old_regime_marginal_rate: u32,
}

impl AdvisoryContext {
  pub fn new(profile: &FinancialProfile, comparison: &TaxComparison) -> Self {
    let details = &comparison.calculation_details;
    Self {
      financial_year:           profile.financial_year.clone(),
      gross_salary:             profile.gross_salary,
      hra_received:             profile.hra_received,
      rent_paid:                profile.rent_paid,
      deduction_80c:            profile.deduction_80c,
      deduction_80d:            profile.deduction_80d,
      old_regime_tax:           comparison.tax_old_regime,
      new_regime_tax:           comparison.tax_new_regime,
      best_regime:              comparison.best_regime,
      tax_savings:              details.comparison.tax_savings,
      old_regime_marginal_rate: details.old_regime.marginal_rate,
    }
  }

  /// Human-readable digest, used in prompts and logs.
  pub fn describe(&self) -> String {
    format!(
      "FY {}: gross salary {}, HRA {}, rent {}, 80C {}, 80D {}. \
       Old regime tax {}, new regime tax {}; the {} regime saves {}.",
      self.financial_year,
      format_inr(self.gross_salary),
      format_inr(self.hra_received),
      format_inr(self.rent_paid),
      format_inr(self.deduction_80c),
      format_inr(self.deduction_80d),
      format_inr(self.old_regime_tax),
      format_inr(self.new_regime_tax),
      self.best_regime,
      format_inr(self.tax_savings),
    )
  }
}
