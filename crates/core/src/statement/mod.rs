//! Configurable financial statements (DRE).
//!
//! A statement is a list of lines. Leaf lines sum bound ledger accounts;
//! computed lines are arithmetic formulas over other lines. Structures are
//! compiled once into an evaluation plan, cached, and evaluated per period.

pub mod assembler;
pub mod ast;
pub mod cache;
pub mod compiled;
pub mod error;
pub mod evaluator;
pub mod parser;
pub mod percentage;
pub mod plan;
pub mod service;
pub mod source;
pub mod types;


pub use assembler::ReportAssembler;
pub use ast::{BinaryOperator, FormulaExpr};
pub use cache::PlanCache;
pub use compiled::{CompiledStatement, structure_hash};
pub use error::{EvaluationError, FormulaError, ReportError, SourceError, StructureError};
pub use evaluator::{Evaluation, Evaluator};
pub use parser::parse_formula;
pub use percentage::{PercentageCalculator, Percentages};
pub use plan::{DependencyResolver, EvaluationPlan, PlanStep};
pub use service::{ReportService, run_pipeline};
pub use source::{InMemorySource, LedgerEntry, StatementSource};
pub use types::{
    AccountAggregate, AccountAggregates, AccountBinding, LineBindings, LineKind, LineResult,
    ReportPeriod, ReportSummary, ReportWarning, RoleMapping, StatementLineDefinition,
    StatementReport, StatementStructure, SummaryRole, aggregate_map,
};
