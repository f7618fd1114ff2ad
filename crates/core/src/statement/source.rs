//! Data-access port for statement structures and ledger balances.

use std::future::Future;

use chrono::NaiveDate;
use dashmap::DashMap;
use demonstra_shared::types::{AccountId, StatementId};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::error::SourceError;
use super::types::{AccountAggregate, ReportPeriod, StatementStructure};

/// Source of statement structures and per-account period balances.
///
/// Implemented by whatever owns the chart of accounts and the ledger.
pub trait StatementSource: Send + Sync {
    /// Loads the current structure of a statement.
    fn load_structure(
        &self,
        id: StatementId,
    ) -> impl Future<Output = Result<StatementStructure, SourceError>> + Send;

    /// Loads signed per-account sums for a period.
    fn load_aggregates(
        &self,
        id: StatementId,
        period: ReportPeriod,
    ) -> impl Future<Output = Result<Vec<AccountAggregate>, SourceError>> + Send;
}

/// A single posted ledger amount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Account posted to.
    pub account_id: AccountId,
    /// Posting date.
    pub date: NaiveDate,
    /// Signed amount (credit positive for revenue accounts).
    pub signed_amount: Decimal,
}

/// In-memory `StatementSource`.
///
/// Structures are stored per statement; the ledger is shared by every
/// statement and summed per account for the requested period.
#[derive(Debug, Default)]
pub struct InMemorySource {
    structures: DashMap<StatementId, StatementStructure>,
    ledger: DashMap<AccountId, Vec<(NaiveDate, Decimal)>>,
}

impl InMemorySource {
    /// Creates an empty source.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a source from structures and ledger entries.
    #[must_use]
    pub fn from_parts(
        structures: impl IntoIterator<Item = StatementStructure>,
        entries: impl IntoIterator<Item = LedgerEntry>,
    ) -> Self {
        let source = Self::new();
        for structure in structures {
            source.insert_structure(structure);
        }
        for entry in entries {
            source.post(entry);
        }
        source
    }

    /// Stores a structure under its statement id.
    pub fn insert_structure(&self, structure: StatementStructure) {
        self.structures.insert(structure.statement_id, structure);
    }

    /// Replaces a structure, returning the previous one.
    pub fn replace_structure(&self, structure: StatementStructure) -> Option<StatementStructure> {
        self.structures.insert(structure.statement_id, structure)
    }

    /// Posts a ledger entry.
    pub fn post(&self, entry: LedgerEntry) {
        self.ledger
            .entry(entry.account_id)
            .or_default()
            .push((entry.date, entry.signed_amount));
    }

    /// Ids of every stored statement, ascending.
    #[must_use]
    pub fn statement_ids(&self) -> Vec<StatementId> {
        let mut ids: Vec<StatementId> = self.structures.iter().map(|e| *e.key()).collect();
        ids.sort();
        ids
    }

    fn aggregates(&self, period: ReportPeriod) -> Result<Vec<AccountAggregate>, SourceError> {
        let mut rows = Vec::new();
        for entry in &self.ledger {
            let mut total = Decimal::ZERO;
            let mut posted = false;
            for (date, amount) in entry.value() {
                if *date < period.start || *date > period.end {
                    continue;
                }
                total = total.checked_add(*amount).ok_or_else(|| {
                    SourceError::InvalidData(format!(
                        "ledger sum overflowed for account {}",
                        entry.key()
                    ))
                })?;
                posted = true;
            }
            if posted {
                rows.push(AccountAggregate {
                    account_id: *entry.key(),
                    signed_amount: total,
                });
            }
        }
        rows.sort_by_key(|row| row.account_id);
        Ok(rows)
    }
}

impl StatementSource for InMemorySource {
    async fn load_structure(&self, id: StatementId) -> Result<StatementStructure, SourceError> {
        self.structures
            .get(&id)
            .map(|s| s.value().clone())
            .ok_or(SourceError::NotFound(id))
    }

    async fn load_aggregates(
        &self,
        _id: StatementId,
        period: ReportPeriod,
    ) -> Result<Vec<AccountAggregate>, SourceError> {
        self.aggregates(period)
    }
}
