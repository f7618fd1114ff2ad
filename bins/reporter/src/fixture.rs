//! JSON fixtures: statement structures plus dated ledger entries.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use chrono::{Datelike, Months, NaiveDate};
use serde::Deserialize;

use demonstra_core::statement::{
    InMemorySource, LedgerEntry, ReportError, ReportPeriod, StatementStructure,
};

/// Contents of a fixture file.
#[derive(Debug, Deserialize)]
pub struct Fixture {
    /// Statement structures.
    pub statements: Vec<StatementStructure>,
    /// Ledger postings shared by every statement.
    #[serde(default)]
    pub ledger: Vec<LedgerEntry>,
}

impl Fixture {
    /// Reads and parses a fixture file.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        Self::parse(&raw).with_context(|| format!("failed to parse {}", path.display()))
    }

    /// Parses fixture JSON.
    pub fn parse(raw: &str) -> Result<Self> {
        let fixture: Self = serde_json::from_str(raw)?;
        if fixture.statements.is_empty() {
            bail!("fixture contains no statements");
        }
        Ok(fixture)
    }

    /// Serves the fixture through an in-memory source.
    pub fn into_source(self) -> InMemorySource {
        InMemorySource::from_parts(self.statements, self.ledger)
    }
}

/// Splits `[from, to]` into calendar months, clipped to the range.
///
/// A reversed range is rejected the same way a single report rejects it.
pub fn months(from: NaiveDate, to: NaiveDate) -> Result<Vec<ReportPeriod>, ReportError> {
    let invalid = || ReportError::InvalidDateRange {
        start: from,
        end: to,
    };
    if !ReportPeriod::new(from, to).is_valid() {
        return Err(invalid());
    }

    let mut periods = Vec::new();
    let mut start = from;

    while start <= to {
        let next_month = start
            .with_day(1)
            .and_then(|first| first.checked_add_months(Months::new(1)))
            .ok_or_else(invalid)?;
        let month_end = next_month.pred_opt().ok_or_else(invalid)?;
        let end = month_end.min(to);
        periods.push(ReportPeriod::new(start, end));
        start = next_month;
    }

    Ok(periods)
}
