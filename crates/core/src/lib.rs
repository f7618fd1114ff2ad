//! Core financial statement engine for Demonstra.
//!
//! This crate contains the statement computation logic with ZERO web or
//! database dependencies. Structures, ledger balances and reports are plain
//! data; I/O is reached only through the `StatementSource` port.
//!
//! # Modules
//!
//! - `statement` - Formula parsing, dependency ordering, evaluation and reports

pub mod statement;
