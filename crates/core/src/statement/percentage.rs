//! Vertical analysis: every line as a share of one base line.

use std::collections::HashMap;

use rust_decimal::Decimal;
use tracing::warn;

use super::types::ReportWarning;

/// Percentage per line code; `None` when the base is zero or the share
/// overflows.
pub type Percentages = HashMap<String, Option<Decimal>>;

/// Computes percentages of a base line.
pub struct PercentageCalculator;

impl PercentageCalculator {
    /// `value / base * 100` for every line, unrounded.
    ///
    /// A zero (or missing) base yields `None` for every line rather than an
    /// error or an unbounded value. A nonzero base whose share exceeds the
    /// decimal range also yields `None`, plus a `PercentageOverflow` warning
    /// for that line (warnings sorted by line code).
    #[must_use]
    pub fn percentages(
        values: &HashMap<String, Decimal>,
        base_line: &str,
    ) -> (Percentages, Vec<ReportWarning>) {
        let base = values.get(base_line).copied().unwrap_or(Decimal::ZERO);
        let mut overflowed = Vec::new();

        let percentages = values
            .iter()
            .map(|(code, value)| {
                if base.is_zero() {
                    return (code.clone(), None);
                }
                let pct = value
                    .checked_div(base)
                    .and_then(|ratio| ratio.checked_mul(Decimal::ONE_HUNDRED));
                if pct.is_none() {
                    warn!(line = %code, base_line, "Percentage overflowed");
                    overflowed.push(code.clone());
                }
                (code.clone(), pct)
            })
            .collect();

        overflowed.sort_unstable();
        let warnings = overflowed
            .into_iter()
            .map(|line| ReportWarning::PercentageOverflow { line })
            .collect();

        (percentages, warnings)
    }
}
