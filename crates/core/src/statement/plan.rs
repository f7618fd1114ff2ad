//! Dependency resolution for statement lines.
//!
//! Every computed line depends on the lines its formula references. The
//! resolver parses all formulas up front, then orders the lines so that each
//! line comes after everything it references. Lines that do not depend on each
//! other keep ascending `order`, which makes plans reproducible but has no
//! bearing on the computed values.

use std::collections::{HashMap, HashSet};

use demonstra_shared::types::StatementId;
use tracing::debug;

use super::ast::FormulaExpr;
use super::error::StructureError;
use super::parser::parse_formula;
use super::types::{LineKind, StatementLineDefinition};

/// One evaluation step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanStep {
    /// Sum the accounts bound to the line.
    Leaf {
        /// Line code.
        code: String,
        /// Negate positive sums.
        sign_flip: bool,
    },
    /// Evaluate a parsed formula.
    Computed {
        /// Line code.
        code: String,
        /// Parsed formula.
        expr: FormulaExpr,
    },
}

impl PlanStep {
    /// Returns the line code of this step.
    #[must_use]
    pub fn code(&self) -> &str {
        match self {
            Self::Leaf { code, .. } | Self::Computed { code, .. } => code,
        }
    }
}

/// Validated, topologically ordered list of evaluation steps.
///
/// A plan is immutable. A changed structure gets a new plan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationPlan {
    statement_id: StatementId,
    steps: Vec<PlanStep>,
}

impl EvaluationPlan {
    /// Statement the plan was built for.
    #[must_use]
    pub const fn statement_id(&self) -> StatementId {
        self.statement_id
    }

    /// Steps in evaluation order.
    #[must_use]
    pub fn steps(&self) -> &[PlanStep] {
        &self.steps
    }

    /// Line codes in evaluation order.
    #[must_use]
    pub fn order(&self) -> Vec<&str> {
        self.steps.iter().map(PlanStep::code).collect()
    }

    /// Position of a line in the evaluation order.
    #[must_use]
    pub fn position(&self, code: &str) -> Option<usize> {
        self.steps.iter().position(|s| s.code() == code)
    }

    /// Number of steps.
    #[must_use]
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// Returns true for a plan without lines.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// Builds a plan from steps without any validation.
    #[cfg(test)]
    pub(crate) fn from_steps_unchecked(statement_id: StatementId, steps: Vec<PlanStep>) -> Self {
        Self {
            statement_id,
            steps,
        }
    }
}

/// Builds evaluation plans from line definitions.
pub struct DependencyResolver;

impl DependencyResolver {
    /// Validates the lines and orders them by dependency.
    ///
    /// # Errors
    ///
    /// Returns a `StructureError` for duplicate codes, a missing or unexpected
    /// formula, a formula that does not parse, an unknown reference, or a
    /// circular reference.
    pub fn build_plan(
        statement_id: StatementId,
        lines: &[StatementLineDefinition],
    ) -> Result<EvaluationPlan, StructureError> {
        let mut known_codes = HashSet::with_capacity(lines.len());
        for line in lines {
            if !known_codes.insert(line.code.clone()) {
                return Err(StructureError::DuplicateCode(line.code.clone()));
            }
        }

        // Input order is never trusted; everything below walks this order
        let mut sorted: Vec<&StatementLineDefinition> = lines.iter().collect();
        sorted.sort_by(|a, b| a.order.cmp(&b.order).then_with(|| a.code.cmp(&b.code)));

        let rank: HashMap<&str, usize> = sorted
            .iter()
            .enumerate()
            .map(|(i, line)| (line.code.as_str(), i))
            .collect();

        let mut exprs: HashMap<&str, FormulaExpr> = HashMap::new();
        for line in &sorted {
            let formula = line.formula.as_deref().map(str::trim).filter(|f| !f.is_empty());
            match (line.kind, formula) {
                (LineKind::Leaf, None) => {}
                (LineKind::Leaf, Some(_)) => {
                    return Err(StructureError::UnexpectedFormula(line.code.clone()));
                }
                (LineKind::Computed, None) => {
                    return Err(StructureError::MissingFormula(line.code.clone()));
                }
                (LineKind::Computed, Some(formula)) => {
                    let expr = parse_formula(formula, &known_codes)
                        .map_err(|e| StructureError::from_formula(&line.code, formula, e))?;
                    exprs.insert(line.code.as_str(), expr);
                }
            }
        }

        let mut dependencies: HashMap<&str, Vec<&str>> = HashMap::with_capacity(exprs.len());
        for (code, expr) in &exprs {
            // Re-key references onto the line definitions so the graph does not borrow `exprs`
            let mut refs: Vec<&str> = expr
                .references()
                .into_iter()
                .filter_map(|r| rank.get_key_value(r).map(|(k, _)| *k))
                .collect();
            refs.sort_by_key(|r| rank.get(r).copied().unwrap_or(usize::MAX));
            dependencies.insert(*code, refs);
        }

        let mut sort = TopoSort {
            dependencies: &dependencies,
            marks: HashMap::with_capacity(sorted.len()),
            path: Vec::new(),
            order: Vec::with_capacity(sorted.len()),
        };
        for line in &sorted {
            sort.visit(line.code.as_str())?;
        }

        let by_code: HashMap<&str, &StatementLineDefinition> =
            sorted.iter().map(|line| (line.code.as_str(), *line)).collect();

        let steps = sort
            .order
            .iter()
            .filter_map(|code| {
                let line = by_code.get(code)?;
                Some(match exprs.remove(code) {
                    Some(expr) => PlanStep::Computed {
                        code: line.code.clone(),
                        expr,
                    },
                    None => PlanStep::Leaf {
                        code: line.code.clone(),
                        sign_flip: line.sign_flip,
                    },
                })
            })
            .collect::<Vec<_>>();

        debug!(
            statement_id = %statement_id,
            steps = steps.len(),
            "Built evaluation plan"
        );

        Ok(EvaluationPlan {
            statement_id,
            steps,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Active,
    Done,
}

/// Depth-first topological sort with an active-path check.
struct TopoSort<'g, 'a> {
    dependencies: &'g HashMap<&'a str, Vec<&'a str>>,
    marks: HashMap<&'a str, Mark>,
    path: Vec<&'a str>,
    order: Vec<&'a str>,
}

impl<'a> TopoSort<'_, 'a> {
    fn visit(&mut self, code: &'a str) -> Result<(), StructureError> {
        match self.marks.get(code) {
            Some(Mark::Done) => return Ok(()),
            Some(Mark::Active) => {
                // Back edge: the loop is the active path from `code` onward
                let start = self.path.iter().position(|c| *c == code).unwrap_or(0);
                let mut cycle: Vec<String> =
                    self.path[start..].iter().map(|c| (*c).to_string()).collect();
                cycle.push(code.to_string());
                return Err(StructureError::Cycle { cycle });
            }
            None => {}
        }

        self.marks.insert(code, Mark::Active);
        self.path.push(code);

        let dependencies = self.dependencies;
        if let Some(deps) = dependencies.get(code) {
            for dep in deps {
                self.visit(*dep)?;
            }
        }

        self.path.pop();
        self.marks.insert(code, Mark::Done);
        self.order.push(code);
        Ok(())
    }
}
