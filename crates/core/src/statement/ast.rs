//! Formula abstract syntax tree.

use std::fmt;

use rust_decimal::Decimal;

/// Arithmetic operators allowed in statement formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOperator {
    /// `+`
    Add,
    /// `-`
    Subtract,
    /// `*`
    Multiply,
    /// `/`
    Divide,
}

impl BinaryOperator {
    /// Returns the operator symbol.
    #[must_use]
    pub const fn symbol(self) -> char {
        match self {
            Self::Add => '+',
            Self::Subtract => '-',
            Self::Multiply => '*',
            Self::Divide => '/',
        }
    }
}

/// Formula expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FormulaExpr {
    /// Value of another line.
    Ref(String),
    /// Numeric literal.
    Const(Decimal),
    /// Binary operation.
    Bin {
        /// Operator.
        op: BinaryOperator,
        /// Left operand.
        left: Box<FormulaExpr>,
        /// Right operand.
        right: Box<FormulaExpr>,
    },
}

impl FormulaExpr {
    /// Builds a binary node.
    #[must_use]
    pub fn bin(op: BinaryOperator, left: Self, right: Self) -> Self {
        Self::Bin {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Distinct line codes referenced by the expression, in first-use order.
    #[must_use]
    pub fn references(&self) -> Vec<&str> {
        let mut refs = Vec::new();
        self.collect_references(&mut refs);
        refs
    }

    fn collect_references<'a>(&'a self, refs: &mut Vec<&'a str>) {
        match self {
            Self::Ref(code) => {
                if !refs.contains(&code.as_str()) {
                    refs.push(code);
                }
            }
            Self::Const(_) => {}
            Self::Bin { left, right, .. } => {
                left.collect_references(refs);
                right.collect_references(refs);
            }
        }
    }
}

impl fmt::Display for FormulaExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ref(code) => write!(f, "[{code}]"),
            Self::Const(value) => write!(f, "{value}"),
            Self::Bin { op, left, right } => write!(f, "({left} {} {right})", op.symbol()),
        }
    }
}
