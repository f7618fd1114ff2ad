//! Statement engine error types.
//!
//! Structure errors are configuration-time and fatal: no report is produced
//! from a structure that fails to compile. Computation warnings live in
//! [`ReportWarning`](super::types::ReportWarning) instead, since they never
//! abort a report.

use chrono::NaiveDate;
use demonstra_shared::AppError;
use demonstra_shared::types::{AccountId, StatementId};
use thiserror::Error;

use super::types::SummaryRole;

/// Errors produced while parsing a single formula.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FormulaError {
    /// Unbalanced parentheses, trailing operator, unexpected character.
    #[error("{message} at position {position}")]
    Syntax {
        /// Byte offset of the offending token.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// An identifier that is not a code of this statement.
    #[error("Unknown line reference '{reference}' at position {position}")]
    UnknownReference {
        /// Byte offset of the identifier.
        position: usize,
        /// The identifier as written.
        reference: String,
    },
}

/// Errors that reject a statement structure outright.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StructureError {
    /// Two lines share a code.
    #[error("Duplicate line code: {0}")]
    DuplicateCode(String),

    /// A computed line has no formula.
    #[error("Computed line {0} has no formula")]
    MissingFormula(String),

    /// A leaf line carries a formula.
    #[error("Leaf line {0} must not have a formula")]
    UnexpectedFormula(String),

    /// A formula does not parse.
    #[error("Formula syntax error in line {line} ('{formula}'): {message} at position {position}")]
    FormulaSyntax {
        /// Line holding the formula.
        line: String,
        /// The formula text.
        formula: String,
        /// Byte offset of the offending token.
        position: usize,
        /// What went wrong.
        message: String,
    },

    /// A formula references a code that does not exist.
    #[error("Line {line} references unknown line {reference}")]
    UnknownReference {
        /// Line holding the formula.
        line: String,
        /// Missing code.
        reference: String,
    },

    /// Formulas reference each other in a loop.
    #[error("Circular reference: {}", cycle.join(" -> "))]
    Cycle {
        /// Codes along the loop, first code repeated at the end.
        cycle: Vec<String>,
    },

    /// A binding targets an unknown or computed line.
    #[error("Account {account} cannot be bound to line {line}")]
    InvalidBinding {
        /// Target line code.
        line: String,
        /// Bound account.
        account: AccountId,
    },

    /// The percentage base line does not exist.
    #[error("Percentage base line {0} does not exist")]
    UnknownBaseLine(String),

    /// A line definition belongs to a different statement.
    #[error("Line {line} belongs to statement {owner}, not {statement}")]
    ForeignLine {
        /// Line code.
        line: String,
        /// Statement the line declares.
        owner: StatementId,
        /// Statement being compiled.
        statement: StatementId,
    },

    /// A summary role points at a code that does not exist.
    #[error("Summary role {role} maps to unknown line {code}")]
    UnknownRoleLine {
        /// Role.
        role: SummaryRole,
        /// Missing code.
        code: String,
    },
}

impl StructureError {
    /// Builds the structure error for a formula that failed to parse.
    #[must_use]
    pub fn from_formula(line: &str, formula: &str, error: FormulaError) -> Self {
        match error {
            FormulaError::Syntax { position, message } => Self::FormulaSyntax {
                line: line.to_string(),
                formula: formula.to_string(),
                position,
                message,
            },
            FormulaError::UnknownReference { reference, .. } => Self::UnknownReference {
                line: line.to_string(),
                reference,
            },
        }
    }

    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::DuplicateCode(_) => "DUPLICATE_CODE",
            Self::MissingFormula(_) => "MISSING_FORMULA",
            Self::UnexpectedFormula(_) => "UNEXPECTED_FORMULA",
            Self::FormulaSyntax { .. } => "FORMULA_SYNTAX",
            Self::UnknownReference { .. } => "UNKNOWN_REFERENCE",
            Self::Cycle { .. } => "CIRCULAR_REFERENCE",
            Self::InvalidBinding { .. } => "INVALID_BINDING",
            Self::UnknownBaseLine(_) => "UNKNOWN_BASE_LINE",
            Self::ForeignLine { .. } => "FOREIGN_LINE",
            Self::UnknownRoleLine { .. } => "UNKNOWN_ROLE_LINE",
        }
    }
}

/// Invariant breaches during evaluation.
///
/// These indicate a defect in plan construction, never bad input.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvaluationError {
    /// A formula referenced a line that had not been evaluated yet.
    #[error("Line {line} was evaluated before its dependency {reference}")]
    MissingDependencyValue {
        /// Line being evaluated.
        line: String,
        /// Reference without a value.
        reference: String,
    },
}

/// Errors raised by a [`StatementSource`](super::source::StatementSource).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    /// No structure stored under this id.
    #[error("Statement not found: {0}")]
    NotFound(StatementId),

    /// The backing store failed.
    #[error("Statement source unavailable: {0}")]
    Unavailable(String),

    /// The source returned data the engine cannot use.
    #[error("Statement source returned invalid data: {0}")]
    InvalidData(String),

    /// The fetch exceeded the configured timeout.
    #[error("Statement source timed out after {0} seconds")]
    Timeout(u64),
}

/// Errors that abort report generation.
#[derive(Debug, Error)]
pub enum ReportError {
    /// Invalid date range.
    #[error("Invalid date range: start {start} is after end {end}")]
    InvalidDateRange {
        /// Start date.
        start: NaiveDate,
        /// End date.
        end: NaiveDate,
    },

    /// The statement structure is malformed.
    #[error(transparent)]
    Structure(#[from] StructureError),

    /// Evaluation hit an internal invariant breach.
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Loading data failed.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The blocking evaluation task did not complete.
    #[error("Report worker failed: {0}")]
    Worker(String),

    /// The request was cancelled between pipeline stages.
    #[error("Report generation cancelled")]
    Cancelled,
}

impl ReportError {
    /// Returns the error code for API responses.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::InvalidDateRange { .. } => "INVALID_DATE_RANGE",
            Self::Structure(e) => e.error_code(),
            Self::Evaluation(_) => "EVALUATION_INVARIANT",
            Self::Source(SourceError::NotFound(_)) => "STATEMENT_NOT_FOUND",
            Self::Source(SourceError::Unavailable(_)) => "SOURCE_UNAVAILABLE",
            Self::Source(SourceError::InvalidData(_)) => "SOURCE_INVALID_DATA",
            Self::Source(SourceError::Timeout(_)) => "SOURCE_TIMEOUT",
            Self::Worker(_) => "WORKER_FAILED",
            Self::Cancelled => "CANCELLED",
        }
    }
}

impl From<ReportError> for AppError {
    fn from(err: ReportError) -> Self {
        let message = err.to_string();
        match err {
            ReportError::InvalidDateRange { .. } => Self::Validation(message),
            ReportError::Structure(_) => Self::Configuration(message),
            ReportError::Source(SourceError::NotFound(_)) => Self::NotFound(message),
            ReportError::Source(SourceError::Unavailable(_) | SourceError::InvalidData(_)) => {
                Self::ExternalService(message)
            }
            ReportError::Source(SourceError::Timeout(_)) => Self::Timeout(message),
            ReportError::Evaluation(_) | ReportError::Worker(_) => Self::Internal(message),
            ReportError::Cancelled => Self::Cancelled(message),
        }
    }
}
