//! Report assembly: presentation order, rounding and the summary block.

use rust_decimal::Decimal;

use super::evaluator::Evaluation;
use super::percentage::Percentages;
use super::types::{LineResult, ReportSummary, RoleMapping, StatementLineDefinition, SummaryRole};

/// Turns evaluated values into presentable report lines.
pub struct ReportAssembler;

impl ReportAssembler {
    /// Builds one `LineResult` per definition, sorted by `order`.
    ///
    /// This is the only place values and percentages are rounded, once, to
    /// `scale` decimals.
    #[must_use]
    pub fn assemble(
        lines: &[StatementLineDefinition],
        evaluation: &Evaluation,
        percentages: &Percentages,
        scale: u32,
    ) -> Vec<LineResult> {
        let mut sorted: Vec<&StatementLineDefinition> = lines.iter().collect();
        sorted.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.code.cmp(&b.code)));

        sorted
            .into_iter()
            .map(|line| LineResult {
                code: line.code.clone(),
                description: line.description.clone(),
                level: line.level,
                value: present(evaluation.value(&line.code), scale),
                percentage_of_base: percentages
                    .get(&line.code)
                    .copied()
                    .flatten()
                    .map(|pct| present(pct, scale)),
                bold: line.bold,
                degraded: evaluation.is_degraded(&line.code),
            })
            .collect()
    }

    /// Resolves the summary block through the statement's role mapping.
    #[must_use]
    pub fn summarize(roles: &RoleMapping, lines: &[LineResult]) -> ReportSummary {
        let mut summary = ReportSummary::default();
        for role in SummaryRole::ALL {
            let value = roles
                .get(&role)
                .and_then(|code| lines.iter().find(|l| &l.code == code))
                .map(|l| l.value);
            summary.set(role, value);
        }
        summary
    }
}

/// Rounds to `scale` places and pads so `8500` prints as `8500.00`.
fn present(value: Decimal, scale: u32) -> Decimal {
    let mut rounded = value.round_dp(scale);
    rounded.rescale(scale);
    rounded
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::types::LineKind;
    use demonstra_shared::types::StatementId;
    use rust_decimal_macros::dec;
    use std::collections::{HashMap, HashSet};

    fn line(code: &str, order: i32, bold: bool) -> StatementLineDefinition {
        StatementLineDefinition {
            code: code.to_string(),
            description: format!("{code} description"),
            level: 2,
            kind: LineKind::Leaf,
            formula: None,
            sign_flip: false,
            bold,
            order,
            statement_id: StatementId::new(1),
        }
    }

    fn evaluation(pairs: &[(&str, Decimal)], degraded: &[&str]) -> Evaluation {
        let values: HashMap<String, Decimal> = pairs
            .iter()
            .map(|(c, v)| ((*c).to_string(), *v))
            .collect();
        Evaluation {
            booked: values.clone(),
            values,
            degraded: degraded.iter().map(|c| (*c).to_string()).collect::<HashSet<_>>(),
            warnings: Vec::new(),
        }
    }

    #[test]
    fn test_sorted_by_order_not_input() {
        let lines = vec![line("C", 3, false), line("A", 1, true), line("B", 2, false)];
        let eval = evaluation(&[("A", dec!(1)), ("B", dec!(2)), ("C", dec!(3))], &[]);
        let result = ReportAssembler::assemble(&lines, &eval, &Percentages::new(), 2);

        let codes: Vec<&str> = result.iter().map(|l| l.code.as_str()).collect();
        assert_eq!(codes, vec!["A", "B", "C"]);
        assert!(result[0].bold);
        assert_eq!(result[0].description, "A description");
        assert_eq!(result[0].level, 2);
    }

    #[test]
    fn test_rounding_happens_once_at_presentation() {
        let lines = vec![line("THIRD", 1, false)];
        let third = dec!(100) / dec!(3);
        let eval = evaluation(&[("THIRD", third)], &[]);
        let pct = Percentages::from([("THIRD".to_string(), Some(dec!(33.335)))]);
        let result = ReportAssembler::assemble(&lines, &eval, &pct, 2);

        assert_eq!(result[0].value, dec!(33.33));
        assert_eq!(result[0].value.to_string(), "33.33");
        // banker's rounding on an exact midpoint
        assert_eq!(result[0].percentage_of_base, Some(dec!(33.34)));
    }

    #[test]
    fn test_values_padded_to_scale() {
        let lines = vec![line("NET", 1, true)];
        let eval = evaluation(&[("NET", dec!(8500))], &[]);
        let result = ReportAssembler::assemble(&lines, &eval, &Percentages::new(), 2);
        assert_eq!(result[0].value.to_string(), "8500.00");
        assert_eq!(result[0].percentage_of_base, None);
    }

    #[test]
    fn test_degraded_flag_carried() {
        let lines = vec![line("RATIO", 1, false), line("REV", 2, false)];
        let eval = evaluation(&[("RATIO", Decimal::ZERO), ("REV", dec!(5))], &["RATIO"]);
        let result = ReportAssembler::assemble(&lines, &eval, &Percentages::new(), 2);
        assert!(result[0].degraded);
        assert!(!result[1].degraded);
    }

    #[test]
    fn test_summary_uses_role_mapping() {
        let lines = vec![line("RB", 1, false), line("LL", 2, true)];
        let eval = evaluation(&[("RB", dec!(1000)), ("LL", dec!(120.5))], &[]);
        let result = ReportAssembler::assemble(&lines, &eval, &Percentages::new(), 2);

        let roles = RoleMapping::from([
            (SummaryRole::GrossRevenue, "RB".to_string()),
            (SummaryRole::NetResult, "LL".to_string()),
        ]);
        let summary = ReportAssembler::summarize(&roles, &result);
        assert_eq!(summary.gross_revenue, Some(dec!(1000)));
        assert_eq!(summary.net_result, Some(dec!(120.50)));
        assert_eq!(summary.ebitda, None);
        assert_eq!(summary.get(SummaryRole::NetRevenue), None);
    }
}
