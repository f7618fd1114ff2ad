//! Statement data types.

use std::collections::{BTreeMap, HashMap};

use chrono::NaiveDate;
use demonstra_shared::types::{AccountId, StatementId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::SourceError;

/// How a statement line gets its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LineKind {
    /// Sum of the bound chart-of-account balances.
    Leaf,
    /// Formula over other lines of the same statement.
    Computed,
}

/// One configured line of a statement layout.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StatementLineDefinition {
    /// Code, unique within the statement (e.g. "OF-05").
    pub code: String,
    /// Label shown on the report.
    pub description: String,
    /// Indentation level.
    pub level: u8,
    /// Leaf or computed.
    pub kind: LineKind,
    /// Formula, present iff the line is computed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub formula: Option<String>,
    /// Negate positive leaf sums (deduction lines stored as debits).
    #[serde(default)]
    pub sign_flip: bool,
    /// Render in bold.
    #[serde(default)]
    pub bold: bool,
    /// Display position; also the tie-break between independent lines.
    pub order: i32,
    /// Statement this line belongs to.
    pub statement_id: StatementId,
}

/// Binds a leaf line to one chart-of-account entry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AccountBinding {
    /// Leaf line code.
    pub line_code: String,
    /// Bound account.
    pub account_id: AccountId,
}

/// Signed ledger total of one account over the requested period.
///
/// Produced by the data-access layer from confirmed entries only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountAggregate {
    /// Account.
    pub account_id: AccountId,
    /// Signed amount.
    pub signed_amount: Decimal,
}

/// Semantic roles surfaced in the report summary block.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum SummaryRole {
    /// Gross revenue.
    GrossRevenue,
    /// Net revenue (revenue after deductions).
    NetRevenue,
    /// Gross profit.
    GrossProfit,
    /// EBITDA-equivalent.
    Ebitda,
    /// Net result for the period.
    NetResult,
}

impl SummaryRole {
    /// All roles, in summary order.
    pub const ALL: [Self; 5] = [
        Self::GrossRevenue,
        Self::NetRevenue,
        Self::GrossProfit,
        Self::Ebitda,
        Self::NetResult,
    ];

    /// Returns the snake_case role name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::GrossRevenue => "gross_revenue",
            Self::NetRevenue => "net_revenue",
            Self::GrossProfit => "gross_profit",
            Self::Ebitda => "ebitda",
            Self::NetResult => "net_result",
        }
    }
}

impl std::fmt::Display for SummaryRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-statement mapping of summary roles to line codes.
pub type RoleMapping = BTreeMap<SummaryRole, String>;

/// Everything the configuration store holds for one statement type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementStructure {
    /// Statement type.
    pub statement_id: StatementId,
    /// Statement name.
    pub name: String,
    /// Line definitions, in any order.
    pub lines: Vec<StatementLineDefinition>,
    /// Account bindings for leaf lines.
    #[serde(default)]
    pub bindings: Vec<AccountBinding>,
    /// Summary role mapping.
    #[serde(default)]
    pub roles: RoleMapping,
    /// Line every percentage is expressed against.
    pub base_line: String,
}

/// Inclusive reporting window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ReportPeriod {
    /// First day.
    pub start: NaiveDate,
    /// Last day.
    pub end: NaiveDate,
}

impl ReportPeriod {
    /// Creates a new period.
    #[must_use]
    pub const fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Returns true if `start <= end`.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.start <= self.end
    }
}

/// Leaf-line bindings grouped by line code.
pub type LineBindings = HashMap<String, Vec<AccountId>>;

/// Period totals keyed by account.
pub type AccountAggregates = HashMap<AccountId, Decimal>;

/// Folds aggregate rows into a map, summing repeated accounts.
///
/// # Errors
///
/// Returns `SourceError::InvalidData` when repeated rows for one account
/// sum past the decimal range.
pub fn aggregate_map(rows: &[AccountAggregate]) -> Result<AccountAggregates, SourceError> {
    let mut map = AccountAggregates::with_capacity(rows.len());
    for row in rows {
        let total = map.entry(row.account_id).or_insert(Decimal::ZERO);
        *total = total.checked_add(row.signed_amount).ok_or_else(|| {
            SourceError::InvalidData(format!(
                "aggregate sum overflowed for account {}",
                row.account_id
            ))
        })?;
    }
    Ok(map)
}

/// Recoverable problems collected while producing a report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ReportWarning {
    /// A formula divided by zero; the line shows 0.
    DivisionByZero {
        /// Affected line.
        line: String,
    },
    /// A formula step exceeded decimal range; the line shows 0.
    ArithmeticOverflow {
        /// Affected line.
        line: String,
    },
    /// A percentage exceeded decimal range; the percentage shows null.
    PercentageOverflow {
        /// Affected line.
        line: String,
    },
    /// A leaf line has no account bound; the line shows 0.
    UnboundLeaf {
        /// Affected line.
        line: String,
    },
    /// The ledger returned an account no line is bound to; ignored.
    UnknownAccount {
        /// Account from the aggregates.
        account: AccountId,
    },
}

impl ReportWarning {
    /// Returns the warning code for API responses.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::DivisionByZero { .. } => "DIVISION_BY_ZERO",
            Self::ArithmeticOverflow { .. } => "ARITHMETIC_OVERFLOW",
            Self::PercentageOverflow { .. } => "PERCENTAGE_OVERFLOW",
            Self::UnboundLeaf { .. } => "UNBOUND_LEAF",
            Self::UnknownAccount { .. } => "UNKNOWN_ACCOUNT",
        }
    }
}

/// One presented line of the report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineResult {
    /// Line code.
    pub code: String,
    /// Label.
    pub description: String,
    /// Indentation level.
    pub level: u8,
    /// Value, rounded to the presentation scale.
    pub value: Decimal,
    /// Share of the base line in percent, `None` when the base is zero.
    pub percentage_of_base: Option<Decimal>,
    /// Render in bold.
    pub bold: bool,
    /// The value was replaced by 0 because of a computation warning.
    pub degraded: bool,
}

/// Named figures resolved through the statement's role mapping.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportSummary {
    /// Gross revenue.
    pub gross_revenue: Option<Decimal>,
    /// Net revenue.
    pub net_revenue: Option<Decimal>,
    /// Gross profit.
    pub gross_profit: Option<Decimal>,
    /// EBITDA-equivalent.
    pub ebitda: Option<Decimal>,
    /// Net result.
    pub net_result: Option<Decimal>,
}

impl ReportSummary {
    /// Sets the figure for one role.
    pub fn set(&mut self, role: SummaryRole, value: Option<Decimal>) {
        let slot = match role {
            SummaryRole::GrossRevenue => &mut self.gross_revenue,
            SummaryRole::NetRevenue => &mut self.net_revenue,
            SummaryRole::GrossProfit => &mut self.gross_profit,
            SummaryRole::Ebitda => &mut self.ebitda,
            SummaryRole::NetResult => &mut self.net_result,
        };
        *slot = value;
    }

    /// Returns the figure for one role.
    #[must_use]
    pub const fn get(&self, role: SummaryRole) -> Option<Decimal> {
        match role {
            SummaryRole::GrossRevenue => self.gross_revenue,
            SummaryRole::NetRevenue => self.net_revenue,
            SummaryRole::GrossProfit => self.gross_profit,
            SummaryRole::Ebitda => self.ebitda,
            SummaryRole::NetResult => self.net_result,
        }
    }
}

/// A fully evaluated statement for one period.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatementReport {
    /// Statement type.
    pub statement_id: StatementId,
    /// Statement name.
    pub statement_name: String,
    /// Reporting window.
    pub period: ReportPeriod,
    /// Version of the structure the plan was built from.
    pub structure_hash: u64,
    /// Whether the plan came from the cache.
    pub plan_cached: bool,
    /// Lines in display order.
    pub lines: Vec<LineResult>,
    /// Summary block.
    pub summary: ReportSummary,
    /// Recoverable problems.
    pub warnings: Vec<ReportWarning>,
}

impl StatementReport {
    /// Looks up a line by code.
    #[must_use]
    pub fn line(&self, code: &str) -> Option<&LineResult> {
        self.lines.iter().find(|l| l.code == code)
    }

    /// Returns true if any line was degraded.
    #[must_use]
    pub fn is_degraded(&self) -> bool {
        self.lines.iter().any(|l| l.degraded)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn test_period_validity() {
        assert!(ReportPeriod::new(date(2024, 1, 1), date(2024, 1, 31)).is_valid());
        assert!(ReportPeriod::new(date(2024, 1, 1), date(2024, 1, 1)).is_valid());
        assert!(!ReportPeriod::new(date(2024, 2, 1), date(2024, 1, 31)).is_valid());
    }

    #[test]
    fn test_repeated_accounts_are_summed() {
        let rows = [
            AccountAggregate {
                account_id: AccountId::new(1),
                signed_amount: dec!(10.5),
            },
            AccountAggregate {
                account_id: AccountId::new(2),
                signed_amount: dec!(3),
            },
            AccountAggregate {
                account_id: AccountId::new(1),
                signed_amount: dec!(-0.5),
            },
        ];
        let map = aggregate_map(&rows).unwrap();
        assert_eq!(map.len(), 2);
        assert_eq!(map[&AccountId::new(1)], dec!(10));
        assert_eq!(map[&AccountId::new(2)], dec!(3));
    }

    #[test]
    fn test_repeated_accounts_overflowing_decimal_range_are_rejected() {
        let rows = vec![
            AccountAggregate {
                account_id: AccountId::new(7),
                signed_amount: Decimal::MAX,
            },
            AccountAggregate {
                account_id: AccountId::new(7),
                signed_amount: Decimal::MAX,
            },
        ];
        let err = aggregate_map(&rows).unwrap_err();
        assert!(matches!(err, SourceError::InvalidData(ref msg) if msg.contains('7')));

        // opposite signs stay in range
        let rows = vec![
            AccountAggregate {
                account_id: AccountId::new(7),
                signed_amount: Decimal::MAX,
            },
            AccountAggregate {
                account_id: AccountId::new(7),
                signed_amount: Decimal::MIN,
            },
        ];
        assert_eq!(aggregate_map(&rows).unwrap()[&AccountId::new(7)], Decimal::ZERO);
    }

    #[test]
    fn test_warning_json_is_tagged() {
        let warning = ReportWarning::DivisionByZero {
            line: "MARGIN".into(),
        };
        let json = serde_json::to_value(&warning).unwrap();
        assert_eq!(json["kind"], "division_by_zero");
        assert_eq!(json["line"], "MARGIN");
        assert_eq!(warning.code(), "DIVISION_BY_ZERO");

        let unknown = ReportWarning::UnknownAccount {
            account: AccountId::new(999),
        };
        let json = serde_json::to_value(&unknown).unwrap();
        assert_eq!(json["kind"], "unknown_account");
        assert_eq!(json["account"], 999);
    }

    #[test]
    fn test_summary_set_and_get() {
        let mut summary = ReportSummary::default();
        for role in SummaryRole::ALL {
            assert_eq!(summary.get(role), None);
        }
        summary.set(SummaryRole::Ebitda, Some(dec!(42)));
        assert_eq!(summary.ebitda, Some(dec!(42)));
        assert_eq!(summary.get(SummaryRole::Ebitda), Some(dec!(42)));
        summary.set(SummaryRole::Ebitda, None);
        assert_eq!(summary.ebitda, None);
    }

    #[test]
    fn test_line_definition_from_json() {
        let line: StatementLineDefinition = serde_json::from_value(serde_json::json!({
            "code": "3.01",
            "description": "Receita Bruta",
            "level": 1,
            "kind": "leaf",
            "formula": null,
            "sign_flip": false,
            "bold": true,
            "order": 10,
            "statement_id": 1
        }))
        .unwrap();
        assert_eq!(line.kind, LineKind::Leaf);
        assert_eq!(line.statement_id, StatementId::new(1));
    }
}
