//! Plan execution.
//!
//! Leaf lines sum their bound account balances; computed lines evaluate their
//! formula against values already produced earlier in the plan. Arithmetic
//! is checked `Decimal` at full precision. Nothing is rounded here.
//!
//! Sign flip is how a deduction line is shown, not what formulas see: a
//! formula referencing a flipped leaf reads the sum as booked, so
//! `NET = REV - DED` subtracts the positive deduction.

use std::collections::{BTreeSet, HashMap, HashSet};

use demonstra_shared::types::AccountId;
use rust_decimal::Decimal;
use tracing::{error, warn};

use super::ast::{BinaryOperator, FormulaExpr};
use super::error::EvaluationError;
use super::plan::{EvaluationPlan, PlanStep};
use super::types::{AccountAggregates, LineBindings, ReportWarning};

/// Raw (unrounded) values for every line of a plan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Evaluation {
    /// Value per line code, sign flip applied.
    pub values: HashMap<String, Decimal>,
    /// Value per line code as formulas see it (before sign flip).
    pub booked: HashMap<String, Decimal>,
    /// Lines whose value was forced to zero.
    pub degraded: HashSet<String>,
    /// Recoverable problems, lines in plan order then unknown accounts.
    pub warnings: Vec<ReportWarning>,
}

impl Evaluation {
    /// Value of a line, zero if absent.
    #[must_use]
    pub fn value(&self, code: &str) -> Decimal {
        self.values.get(code).copied().unwrap_or(Decimal::ZERO)
    }

    /// Whether a line was degraded.
    #[must_use]
    pub fn is_degraded(&self, code: &str) -> bool {
        self.degraded.contains(code)
    }
}

/// Why a single line could not be computed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Fault {
    DivisionByZero,
    Overflow,
    Missing(String),
}

/// Executes evaluation plans.
pub struct Evaluator;

impl Evaluator {
    /// Evaluates every step of `plan` in order.
    ///
    /// Division by zero, decimal overflow and unbound leaf lines degrade only
    /// the affected line to zero. Aggregates for accounts bound to no line are
    /// ignored and reported.
    ///
    /// # Errors
    ///
    /// Returns `MissingDependencyValue` if a formula reaches a line that has
    /// not been evaluated yet, which only a malformed plan can cause.
    pub fn evaluate(
        plan: &EvaluationPlan,
        bindings: &LineBindings,
        aggregates: &AccountAggregates,
    ) -> Result<Evaluation, EvaluationError> {
        let mut evaluation = Evaluation {
            values: HashMap::with_capacity(plan.len()),
            booked: HashMap::with_capacity(plan.len()),
            ..Evaluation::default()
        };

        for step in plan.steps() {
            let (outcome, flip) = match step {
                PlanStep::Leaf { code, sign_flip } => {
                    match bindings.get(code).filter(|accounts| !accounts.is_empty()) {
                        Some(accounts) => (Self::sum_accounts(accounts, aggregates), *sign_flip),
                        None => {
                            warn!(line = %code, "Leaf line has no bound accounts");
                            evaluation
                                .degrade(code, ReportWarning::UnboundLeaf { line: code.clone() });
                            continue;
                        }
                    }
                }
                PlanStep::Computed { expr, .. } => (Self::eval(expr, &evaluation.booked), false),
            };

            let code = step.code();
            match outcome {
                Ok(booked) => {
                    // Deductions booked as positive debits are shown negative
                    let value = if flip && booked > Decimal::ZERO { -booked } else { booked };
                    evaluation.booked.insert(code.to_string(), booked);
                    evaluation.values.insert(code.to_string(), value);
                }
                Err(Fault::DivisionByZero) => {
                    warn!(line = %code, "Division by zero, line degraded to 0");
                    evaluation.degrade(
                        code,
                        ReportWarning::DivisionByZero { line: code.to_string() },
                    );
                }
                Err(Fault::Overflow) => {
                    warn!(line = %code, "Arithmetic overflow, line degraded to 0");
                    evaluation.degrade(
                        code,
                        ReportWarning::ArithmeticOverflow { line: code.to_string() },
                    );
                }
                Err(Fault::Missing(reference)) => {
                    error!(
                        line = %code,
                        reference = %reference,
                        "Plan evaluated a line before its dependency"
                    );
                    return Err(EvaluationError::MissingDependencyValue {
                        line: code.to_string(),
                        reference,
                    });
                }
            }
        }

        let bound: HashSet<AccountId> = bindings.values().flatten().copied().collect();
        let unknown: BTreeSet<AccountId> = aggregates
            .keys()
            .filter(|id| !bound.contains(*id))
            .copied()
            .collect();
        for account in unknown {
            warn!(account = %account, "Aggregate for an account no line is bound to, ignored");
            evaluation.warnings.push(ReportWarning::UnknownAccount { account });
        }

        Ok(evaluation)
    }

    fn sum_accounts(
        accounts: &[AccountId],
        aggregates: &AccountAggregates,
    ) -> Result<Decimal, Fault> {
        accounts.iter().try_fold(Decimal::ZERO, |sum, account| {
            let amount = aggregates.get(account).copied().unwrap_or(Decimal::ZERO);
            sum.checked_add(amount).ok_or(Fault::Overflow)
        })
    }

    fn eval(expr: &FormulaExpr, values: &HashMap<String, Decimal>) -> Result<Decimal, Fault> {
        match expr {
            FormulaExpr::Ref(code) => values
                .get(code)
                .copied()
                .ok_or_else(|| Fault::Missing(code.clone())),
            FormulaExpr::Const(value) => Ok(*value),
            FormulaExpr::Bin { op, left, right } => {
                let left = Self::eval(left, values)?;
                let right = Self::eval(right, values)?;
                Self::apply(*op, left, right)
            }
        }
    }

    fn apply(op: BinaryOperator, left: Decimal, right: Decimal) -> Result<Decimal, Fault> {
        let result = match op {
            BinaryOperator::Add => left.checked_add(right),
            BinaryOperator::Subtract => left.checked_sub(right),
            BinaryOperator::Multiply => left.checked_mul(right),
            BinaryOperator::Divide => {
                if right.is_zero() {
                    return Err(Fault::DivisionByZero);
                }
                left.checked_div(right)
            }
        };
        result.ok_or(Fault::Overflow)
    }
}

impl Evaluation {
    fn degrade(&mut self, code: &str, warning: ReportWarning) {
        self.booked.insert(code.to_string(), Decimal::ZERO);
        self.values.insert(code.to_string(), Decimal::ZERO);
        self.degraded.insert(code.to_string());
        self.warnings.push(warning);
    }
}
