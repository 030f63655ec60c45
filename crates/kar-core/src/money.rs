//! Rupee formatting helpers.

use rust_decimal::{Decimal, RoundingStrategy};

/// Format `amount` as whole rupees with Indian digit grouping:
/// `1234567.8` → `₹12,34,568`.
pub fn format_inr(amount: Decimal) -> String {
  let rounded = amount
    .round_dp_with_strategy(0, RoundingStrategy::MidpointAwayFromZero)
    .abs();
  let digits = rounded.trunc().to_string();
  let sign = if amount.is_sign_negative() && !rounded.is_zero() { "-" } else { "" };
  format!("{sign}₹{}", group_indian(&digits))
}

fn group_indian(digits: &str) -> String {
  if digits.len() <= 3 {
    return digits.to_owned();
  }
  let (head, tail) = digits.split_at(digits.len() - 3);
  let mut groups = Vec::new();
  let mut rest = head;
  while rest.len() > 2 {
    let (h, t) = rest.split_at(rest.len() - 2);
    groups.push(t);
    rest = h;
  }
  groups.push(rest);
  groups.reverse();
  format!("{},{tail}", groups.join(","))
}

#[cfg(test)]
mod tests {
  use rust_decimal_macros::dec;

  use super::*;

  #[test]
  fn groups_lakhs_and_crores() {
    assert_eq!(format_inr(dec!(0)), "₹0");
    assert_eq!(format_inr(dec!(999)), "₹999");
    assert_eq!(format_inr(dec!(150000)), "₹1,50,000");
    assert_eq!(format_inr(dec!(12345678)), "₹1,23,45,678");
  }

  #[test]
  fn rounds_to_whole_rupees() {
    assert_eq!(format_inr(dec!(13519.5)), "₹13,520");
    assert_eq!(format_inr(dec!(-2500.2)), "-₹2,500");
  }
}
