//! Formula parser
//!
//! A recursive descent parser for statement formulas. The grammar is
//! deliberately tiny: line codes, decimal literals, `+ - * /` and
//! parentheses. There are no function calls and nothing is ever executed.
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | primary
//! primary := CODE | NUMBER | '(' expr ')'
//! ```
//!
//! Line codes may contain `-` and `.` (`EB-05`, `3.1.01`), so the lexer tries
//! the longest known code at every position before it looks at operators or
//! numbers. Without that, `EB-05` would read as `EB` minus `05`.

use std::collections::HashSet;
use std::str::FromStr;

use rust_decimal::Decimal;

use super::ast::{BinaryOperator, FormulaExpr};
use super::error::FormulaError;

/// Deepest allowed nesting of parentheses and unary signs.
pub const MAX_NESTING: usize = 256;

/// Most operators (binary or unary) one formula may contain.
pub const MAX_OPERATORS: usize = 1024;

/// Parses a formula into an AST, resolving references against `known_codes`.
pub fn parse_formula(
    formula: &str,
    known_codes: &HashSet<String>,
) -> Result<FormulaExpr, FormulaError> {
    let tokens = tokenize(formula, known_codes)?;
    let mut parser = FormulaParser {
        tokens,
        pos: 0,
        depth: 0,
        operators: 0,
    };

    if parser.peek().token == Token::Eof {
        return Err(syntax(0, "Empty formula"));
    }

    let expr = parser.parse_expression()?;

    // Make sure we consumed all input
    let rest = parser.peek();
    match &rest.token {
        Token::Eof => Ok(expr),
        Token::RightParen => Err(syntax(rest.position, "Unexpected ')'")),
        other => Err(syntax(
            rest.position,
            format!("Expected operator, found {}", other.describe()),
        )),
    }
}

/// Token types
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Token {
    Ref(String),
    Number(Decimal),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
    Eof,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Self::Ref(code) => format!("line '{code}'"),
            Self::Number(value) => format!("number {value}"),
            Self::Plus => "'+'".to_string(),
            Self::Minus => "'-'".to_string(),
            Self::Star => "'*'".to_string(),
            Self::Slash => "'/'".to_string(),
            Self::LeftParen => "'('".to_string(),
            Self::RightParen => "')'".to_string(),
            Self::Eof => "end of formula".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Spanned {
    pub(crate) token: Token,
    pub(crate) position: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> FormulaError {
    FormulaError::Syntax {
        position,
        message: message.into(),
    }
}

/// Characters that may continue a code; a known code only matches when the
/// next character is not one of these.
fn is_code_char(c: char) -> bool {
    c.is_alphanumeric() || c == '.' || c == '_'
}

/// Splits a formula into tokens. The last token is always `Eof`.
pub(crate) fn tokenize(
    formula: &str,
    known_codes: &HashSet<String>,
) -> Result<Vec<Spanned>, FormulaError> {
    Lexer {
        input: formula,
        pos: 0,
        known_codes,
    }
    .run()
}

struct Lexer<'a> {
    input: &'a str,
    pos: usize,
    known_codes: &'a HashSet<String>,
}

impl<'a> Lexer<'a> {
    fn run(mut self) -> Result<Vec<Spanned>, FormulaError> {
        let mut tokens = Vec::new();

        loop {
            self.skip_whitespace();
            let position = self.pos;

            let Some(c) = self.peek_char() else {
                tokens.push(Spanned {
                    token: Token::Eof,
                    position,
                });
                return Ok(tokens);
            };

            if let Some(code) = self.match_known_code() {
                self.pos += code.len();
                tokens.push(Spanned {
                    token: Token::Ref(code.to_string()),
                    position,
                });
                continue;
            }

            let token = match c {
                '+' => self.single(Token::Plus),
                '-' => self.single(Token::Minus),
                '*' => self.single(Token::Star),
                '/' => self.single(Token::Slash),
                '(' => self.single(Token::LeftParen),
                ')' => self.single(Token::RightParen),
                c if c.is_ascii_digit() => self.scan_number()?,
                c if c.is_alphanumeric() || c == '_' => {
                    return Err(self.scan_unknown_identifier());
                }
                other => {
                    return Err(syntax(position, format!("Unexpected character '{other}'")));
                }
            };

            tokens.push(Spanned { token, position });
        }
    }

    /// Longest known code starting at the cursor that ends on a code boundary.
    fn match_known_code(&self) -> Option<&'a str> {
        let rest = &self.input[self.pos..];
        self.known_codes
            .iter()
            .filter(|code| !code.is_empty() && rest.starts_with(code.as_str()))
            .filter(|code| rest[code.len()..].chars().next().is_none_or(|c| !is_code_char(c)))
            .max_by_key(|code| code.len())
            .map(String::as_str)
    }

    fn single(&mut self, token: Token) -> Token {
        self.advance();
        token
    }

    fn scan_number(&mut self) -> Result<Token, FormulaError> {
        let start = self.pos;

        // Integer part
        while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
            self.advance();
        }

        // Decimal part
        if self.peek_char() == Some('.') && self.peek_char_at(1).is_some_and(|c| c.is_ascii_digit())
        {
            self.advance();
            while self.peek_char().is_some_and(|c| c.is_ascii_digit()) {
                self.advance();
            }
        }

        // `3.1.01` or `2A` is a code-shaped word, not a number
        if self.peek_char().is_some_and(is_code_char) {
            self.pos = start;
            return Err(self.scan_unknown_identifier());
        }

        let text = &self.input[start..self.pos];
        Decimal::from_str(text)
            .map(Token::Number)
            .map_err(|_| syntax(start, format!("Invalid number '{text}'")))
    }

    fn scan_unknown_identifier(&mut self) -> FormulaError {
        let start = self.pos;

        while let Some(c) = self.peek_char() {
            let dash_then_digit =
                c == '-' && self.peek_char_at(1).is_some_and(|n| n.is_ascii_digit());
            if !(is_code_char(c) || dash_then_digit) {
                break;
            }
            self.advance();
        }

        FormulaError::UnknownReference {
            position: start,
            reference: self.input[start..self.pos].to_string(),
        }
    }

    // === Helper methods ===

    fn peek_char(&self) -> Option<char> {
        self.input[self.pos..].chars().next()
    }

    fn peek_char_at(&self, offset: usize) -> Option<char> {
        self.input[self.pos..].chars().nth(offset)
    }

    fn advance(&mut self) {
        if let Some(c) = self.peek_char() {
            self.pos += c.len_utf8();
        }
    }

    fn skip_whitespace(&mut self) {
        while self.peek_char().is_some_and(char::is_whitespace) {
            self.advance();
        }
    }
}

/// Formula parser over a token stream.
///
/// Nesting and operator counts are bounded so hostile input fails with a
/// syntax error instead of exhausting the stack here or in the evaluator.
struct FormulaParser {
    tokens: Vec<Spanned>,
    pos: usize,
    depth: usize,
    operators: usize,
}

impl FormulaParser {
    fn peek(&self) -> &Spanned {
        // The stream always ends with Eof, so clamping keeps us on it.
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn consume(&mut self) -> Spanned {
        let token = self.peek().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn enter(&mut self, position: usize) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_NESTING {
            return Err(syntax(position, "Formula nested too deeply"));
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.depth -= 1;
    }

    fn count_operator(&mut self, position: usize) -> Result<(), FormulaError> {
        self.operators += 1;
        if self.operators > MAX_OPERATORS {
            return Err(syntax(position, "Formula has too many operators"));
        }
        Ok(())
    }

    // === Expression parsing with precedence ===
    // Precedence (lowest to highest):
    // 1. Addition/Subtraction: +, -
    // 2. Multiplication/Division: *, /
    // 3. Unary: -, +
    // 4. Primary: codes, numbers, parentheses

    fn parse_expression(&mut self) -> Result<FormulaExpr, FormulaError> {
        self.parse_additive()
    }

    fn parse_additive(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut left = self.parse_multiplicative()?;

        loop {
            let op = match self.peek().token {
                Token::Plus => BinaryOperator::Add,
                Token::Minus => BinaryOperator::Subtract,
                _ => break,
            };

            let position = self.consume().position;
            self.count_operator(position)?;
            let right = self.parse_multiplicative()?;
            left = FormulaExpr::bin(op, left, right);
        }

        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> Result<FormulaExpr, FormulaError> {
        let mut left = self.parse_unary()?;

        loop {
            let op = match self.peek().token {
                Token::Star => BinaryOperator::Multiply,
                Token::Slash => BinaryOperator::Divide,
                _ => break,
            };

            let position = self.consume().position;
            self.count_operator(position)?;
            let right = self.parse_unary()?;
            left = FormulaExpr::bin(op, left, right);
        }

        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<FormulaExpr, FormulaError> {
        let negate = match self.peek().token {
            Token::Minus => true,
            Token::Plus => false,
            _ => return self.parse_primary(),
        };

        let position = self.consume().position;
        self.count_operator(position)?;
        self.enter(position)?;
        let operand = self.parse_unary()?;
        self.leave();

        // Negation is `0 - x` so the tree only ever has ref/const/bin nodes
        Ok(if negate {
            FormulaExpr::bin(
                BinaryOperator::Subtract,
                FormulaExpr::Const(Decimal::ZERO),
                operand,
            )
        } else {
            operand
        })
    }

    fn parse_primary(&mut self) -> Result<FormulaExpr, FormulaError> {
        let Spanned { token, position } = self.consume();

        match token {
            Token::Ref(code) => Ok(FormulaExpr::Ref(code)),
            Token::Number(value) => Ok(FormulaExpr::Const(value)),
            Token::LeftParen => {
                self.enter(position)?;
                let expr = self.parse_expression()?;
                self.leave();
                if self.peek().token == Token::RightParen {
                    self.consume();
                    Ok(expr)
                } else {
                    Err(syntax(position, "Unclosed parenthesis"))
                }
            }
            Token::Eof => Err(syntax(position, "Expected operand, found end of formula")),
            other => Err(syntax(
                position,
                format!("Expected operand, found {}", other.describe()),
            )),
        }
    }
}
