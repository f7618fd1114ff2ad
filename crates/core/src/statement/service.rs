//! Report generation service.
//!
//! The only layer that does I/O. Fetches are bounded by a timeout; the
//! computation itself is synchronous and checked for cancellation between
//! stages.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use demonstra_shared::EngineConfig;
use demonstra_shared::types::StatementId;
use futures::future::try_join_all;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::assembler::ReportAssembler;
use super::cache::PlanCache;
use super::compiled::CompiledStatement;
use super::error::{ReportError, SourceError};
use super::evaluator::Evaluator;
use super::percentage::PercentageCalculator;
use super::source::StatementSource;
use super::types::{AccountAggregate, ReportPeriod, StatementReport, aggregate_map};

/// Generates statement reports from a `StatementSource`.
pub struct ReportService<S: StatementSource> {
    source: Arc<S>,
    cache: PlanCache,
    fetch_timeout: Duration,
    presentation_scale: u32,
}

impl<S: StatementSource> ReportService<S> {
    /// Creates a service with its own plan cache.
    #[must_use]
    pub fn new(source: Arc<S>, config: &EngineConfig) -> Self {
        Self {
            source,
            cache: PlanCache::with_config(config.plan_cache_capacity, config.plan_cache_idle_secs),
            fetch_timeout: Duration::from_secs(config.fetch_timeout_secs),
            presentation_scale: config.presentation_scale,
        }
    }

    /// The plan cache.
    #[must_use]
    pub const fn cache(&self) -> &PlanCache {
        &self.cache
    }

    /// Loads and compiles a statement without evaluating it.
    ///
    /// # Errors
    ///
    /// Returns `Source` or `Structure` errors.
    pub async fn compile(
        &self,
        id: StatementId,
    ) -> Result<(Arc<CompiledStatement>, bool), ReportError> {
        let structure = self.fetch(self.source.load_structure(id)).await?;
        Ok(self.cache.get_or_compile(&structure)?)
    }

    /// Generates one report.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - `period` starts after it ends
    /// - a fetch fails or times out
    /// - the structure is malformed
    /// - `cancel` fires before evaluation or assembly
    pub async fn generate(
        &self,
        id: StatementId,
        period: ReportPeriod,
        cancel: &CancellationToken,
    ) -> Result<StatementReport, ReportError> {
        validate_period(period)?;

        let (compiled, cached) = self.compile(id).await?;
        let aggregates = self.fetch(self.source.load_aggregates(id, period)).await?;

        run_pipeline(&compiled, period, &aggregates, cached, self.presentation_scale, cancel)
    }

    /// Generates one report per period against a single compiled plan.
    ///
    /// Aggregates are fetched concurrently and evaluated in parallel on the
    /// rayon pool, off the async worker. Reports come back in the order of
    /// `periods`; the first failure aborts the batch.
    ///
    /// # Errors
    ///
    /// Same as [`generate`](Self::generate), for any of the periods.
    pub async fn generate_batch(
        &self,
        id: StatementId,
        periods: &[ReportPeriod],
        cancel: &CancellationToken,
    ) -> Result<Vec<StatementReport>, ReportError> {
        for period in periods {
            validate_period(*period)?;
        }

        let (compiled, cached) = self.compile(id).await?;
        let fetched = try_join_all(
            periods
                .iter()
                .map(|period| self.fetch(self.source.load_aggregates(id, *period))),
        )
        .await?;

        debug!(statement_id = %id, periods = periods.len(), "Evaluating batch");

        let scale = self.presentation_scale;
        let periods = periods.to_vec();
        let cancel = cancel.clone();
        tokio::task::spawn_blocking(move || {
            periods
                .par_iter()
                .zip(fetched.par_iter())
                .map(|(period, aggregates)| {
                    run_pipeline(&compiled, *period, aggregates, cached, scale, &cancel)
                })
                .collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(|e| ReportError::Worker(e.to_string()))?
    }

    async fn fetch<T>(
        &self,
        request: impl Future<Output = Result<T, SourceError>>,
    ) -> Result<T, SourceError> {
        tokio::time::timeout(self.fetch_timeout, request)
            .await
            .map_err(|_| SourceError::Timeout(self.fetch_timeout.as_secs()))?
    }
}

fn validate_period(period: ReportPeriod) -> Result<(), ReportError> {
    if period.is_valid() {
        Ok(())
    } else {
        Err(ReportError::InvalidDateRange {
            start: period.start,
            end: period.end,
        })
    }
}

fn check_cancelled(cancel: &CancellationToken) -> Result<(), ReportError> {
    if cancel.is_cancelled() {
        Err(ReportError::Cancelled)
    } else {
        Ok(())
    }
}

/// Evaluate, then percentages, assembly and summary, for one period.
///
/// # Errors
///
/// Returns `Cancelled` if `cancel` fired before evaluation or assembly,
/// `Source` when the aggregate rows overflow, and `Evaluation` on an
/// invariant breach.
pub fn run_pipeline(
    compiled: &CompiledStatement,
    period: ReportPeriod,
    aggregates: &[AccountAggregate],
    plan_cached: bool,
    scale: u32,
    cancel: &CancellationToken,
) -> Result<StatementReport, ReportError> {
    check_cancelled(cancel)?;
    let aggregates = aggregate_map(aggregates)?;
    let evaluation = Evaluator::evaluate(&compiled.plan, &compiled.bindings, &aggregates)?;

    check_cancelled(cancel)?;
    let (percentages, overflowed) =
        PercentageCalculator::percentages(&evaluation.values, &compiled.base_line);
    let lines = ReportAssembler::assemble(&compiled.lines, &evaluation, &percentages, scale);
    let summary = ReportAssembler::summarize(&compiled.roles, &lines);

    let mut warnings = evaluation.warnings;
    warnings.extend(overflowed);

    info!(
        statement_id = %compiled.statement_id,
        start = %period.start,
        end = %period.end,
        lines = lines.len(),
        warnings = warnings.len(),
        plan_cached,
        "Report generated"
    );

    Ok(StatementReport {
        statement_id: compiled.statement_id,
        statement_name: compiled.name.clone(),
        period,
        structure_hash: compiled.structure_hash,
        plan_cached,
        lines,
        summary,
        warnings,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::statement::error::StructureError;
    use crate::statement::source::{InMemorySource, LedgerEntry};
    use crate::statement::types::{
        AccountBinding, LineKind, ReportWarning, RoleMapping, StatementLineDefinition,
        StatementStructure, SummaryRole,
    };
    use chrono::{Datelike, NaiveDate};
    use demonstra_shared::types::AccountId;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn month(m: u32) -> ReportPeriod {
        let end = if m == 12 {
            date(2024, 12, 31)
        } else {
            date(2024, m + 1, 1).pred_opt().unwrap()
        };
        ReportPeriod::new(date(2024, m, 1), end)
    }

    fn line(
        code: &str,
        kind: LineKind,
        formula: Option<&str>,
        sign_flip: bool,
        order: i32,
    ) -> StatementLineDefinition {
        StatementLineDefinition {
            code: code.to_string(),
            description: code.to_string(),
            level: 1,
            kind,
            formula: formula.map(str::to_string),
            sign_flip,
            bold: kind == LineKind::Computed,
            order,
            statement_id: StatementId::new(1),
        }
    }

    fn dre() -> StatementStructure {
        StatementStructure {
            statement_id: StatementId::new(1),
            name: "DRE".to_string(),
            lines: vec![
                line("REV", LineKind::Leaf, None, false, 1),
                line("DED", LineKind::Leaf, None, true, 2),
                line("NET", LineKind::Computed, Some("REV - DED"), false, 3),
            ],
            bindings: vec![
                AccountBinding {
                    line_code: "REV".into(),
                    account_id: AccountId::new(4100),
                },
                AccountBinding {
                    line_code: "DED".into(),
                    account_id: AccountId::new(4200),
                },
            ],
            roles: RoleMapping::from([
                (SummaryRole::GrossRevenue, "REV".to_string()),
                (SummaryRole::NetRevenue, "NET".to_string()),
            ]),
            base_line: "NET".to_string(),
        }
    }

    fn post(account: i64, d: NaiveDate, amount: Decimal) -> LedgerEntry {
        LedgerEntry {
            account_id: AccountId::new(account),
            date: d,
            signed_amount: amount,
        }
    }

    fn source() -> Arc<InMemorySource> {
        Arc::new(InMemorySource::from_parts(
            vec![dre()],
            vec![
                post(4100, date(2024, 1, 10), dec!(6000)),
                post(4100, date(2024, 1, 20), dec!(4000)),
                post(4200, date(2024, 1, 15), dec!(1500)),
                post(4100, date(2024, 2, 10), dec!(2000)),
            ],
        ))
    }

    fn service(source: Arc<InMemorySource>) -> ReportService<InMemorySource> {
        ReportService::new(source, &EngineConfig::default())
    }

    #[tokio::test]
    async fn test_generate_scenario_report() {
        let svc = service(source());
        let report = svc
            .generate(StatementId::new(1), month(1), &CancellationToken::new())
            .await
            .unwrap();

        let rev = report.line("REV").unwrap();
        let ded = report.line("DED").unwrap();
        let net = report.line("NET").unwrap();
        assert_eq!(rev.value, dec!(10000.00));
        assert_eq!(ded.value, dec!(-1500.00));
        assert_eq!(net.value, dec!(8500.00));
        assert_eq!(rev.percentage_of_base, Some(dec!(117.65)));
        assert_eq!(ded.percentage_of_base, Some(dec!(-17.65)));
        assert_eq!(net.percentage_of_base, Some(dec!(100.00)));

        assert_eq!(report.summary.gross_revenue, Some(dec!(10000.00)));
        assert_eq!(report.summary.net_revenue, Some(dec!(8500.00)));
        assert_eq!(report.summary.net_result, None);
        assert!(report.warnings.is_empty());
        assert!(!report.plan_cached);
    }

    #[tokio::test]
    async fn test_second_call_hits_plan_cache() {
        let svc = service(source());
        let cancel = CancellationToken::new();

        let first = svc.generate(StatementId::new(1), month(1), &cancel).await.unwrap();
        let second = svc.generate(StatementId::new(1), month(2), &cancel).await.unwrap();

        assert!(!first.plan_cached);
        assert!(second.plan_cached);
        assert_eq!(first.structure_hash, second.structure_hash);
        assert_eq!(second.line("REV").map(|l| l.value), Some(dec!(2000)));
    }

    #[tokio::test]
    async fn test_structure_edit_rebuilds_plan() {
        let src = source();
        let svc = service(Arc::clone(&src));
        let cancel = CancellationToken::new();

        let before = svc.generate(StatementId::new(1), month(1), &cancel).await.unwrap();

        let mut edited = dre();
        edited.lines[2].formula = Some("REV + DED".into());
        src.replace_structure(edited);

        let after = svc.generate(StatementId::new(1), month(1), &cancel).await.unwrap();
        assert!(!after.plan_cached);
        assert_ne!(before.structure_hash, after.structure_hash);
        assert_eq!(after.line("NET").map(|l| l.value), Some(dec!(11500)));
    }

    #[tokio::test]
    async fn test_invalid_period_rejected_before_fetch() {
        let svc = service(Arc::new(InMemorySource::new()));
        let period = ReportPeriod::new(date(2024, 2, 1), date(2024, 1, 1));
        let err = svc
            .generate(StatementId::new(1), period, &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidDateRange { .. }));
    }

    #[tokio::test]
    async fn test_unknown_statement_is_not_found() {
        let svc = service(source());
        let err = svc
            .generate(StatementId::new(42), month(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Source(SourceError::NotFound(_))));
    }

    #[tokio::test]
    async fn test_malformed_structure_aborts() {
        let src = source();
        let mut broken = dre();
        broken.lines[2].formula = Some("REV - COGS".into());
        src.replace_structure(broken);

        let svc = service(src);
        let err = svc
            .generate(StatementId::new(1), month(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            ReportError::Structure(StructureError::UnknownReference { .. })
        ));
        svc.cache().run_pending_tasks();
        assert_eq!(svc.cache().entry_count(), 0);
    }

    #[tokio::test]
    async fn test_cancelled_token_stops_pipeline() {
        let svc = service(source());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = svc
            .generate(StatementId::new(1), month(1), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Cancelled));
    }

    struct SlowSource;

    impl StatementSource for SlowSource {
        async fn load_structure(
            &self,
            _id: StatementId,
        ) -> Result<StatementStructure, SourceError> {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok(dre())
        }

        async fn load_aggregates(
            &self,
            _id: StatementId,
            _period: ReportPeriod,
        ) -> Result<Vec<AccountAggregate>, SourceError> {
            Ok(Vec::new())
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_fetch_timeout() {
        let config = EngineConfig {
            fetch_timeout_secs: 1,
            ..EngineConfig::default()
        };
        let svc = ReportService::new(Arc::new(SlowSource), &config);
        let err = svc
            .generate(StatementId::new(1), month(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Source(SourceError::Timeout(1))));
    }

    #[tokio::test]
    async fn test_batch_keeps_period_order() {
        let svc = service(source());
        let periods = [month(2), month(1), month(3)];
        let reports = svc
            .generate_batch(StatementId::new(1), &periods, &CancellationToken::new())
            .await
            .unwrap();

        let revenue: Vec<Decimal> = reports
            .iter()
            .map(|r| r.line("REV").map_or(Decimal::ZERO, |l| l.value))
            .collect();
        assert_eq!(revenue, vec![dec!(2000), dec!(10000), Decimal::ZERO]);
        assert!(reports.iter().all(|r| r.period.start.year() == 2024));

        // no ledger activity in March: leaves still bound, nothing degraded
        assert!(!reports[2].is_degraded());
        // base line is zero, so every percentage is null
        assert!(reports[2].lines.iter().all(|l| l.percentage_of_base.is_none()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_batch_leaves_runtime_responsive() {
        let svc = service(source());
        let periods: Vec<ReportPeriod> = (1..=12).map(month).collect();
        let cancel = CancellationToken::new();

        let heartbeat = tokio::spawn(async {
            let mut ticks = 0u32;
            for _ in 0..5 {
                tokio::time::sleep(Duration::from_millis(1)).await;
                ticks += 1;
            }
            ticks
        });
        let reports = svc
            .generate_batch(StatementId::new(1), &periods, &cancel)
            .await
            .unwrap();

        assert_eq!(heartbeat.await.unwrap(), 5);
        assert_eq!(reports.len(), 12);
        assert_eq!(reports[0].line("NET").map(|l| l.value), Some(dec!(8500)));
        assert_eq!(reports[11].period, month(12));
    }

    #[tokio::test]
    async fn test_cancelled_batch_stops_evaluation() {
        let svc = service(source());
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = svc
            .generate_batch(StatementId::new(1), &[month(1), month(2)], &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Cancelled));
    }

    struct DuplicateRowsSource;

    impl StatementSource for DuplicateRowsSource {
        async fn load_structure(
            &self,
            _id: StatementId,
        ) -> Result<StatementStructure, SourceError> {
            Ok(dre())
        }

        async fn load_aggregates(
            &self,
            _id: StatementId,
            _period: ReportPeriod,
        ) -> Result<Vec<AccountAggregate>, SourceError> {
            let row = AccountAggregate {
                account_id: AccountId::new(4100),
                signed_amount: Decimal::MAX,
            };
            Ok(vec![row, row])
        }
    }

    #[tokio::test]
    async fn test_overflowing_duplicate_rows_fail_the_report() {
        let svc = ReportService::new(Arc::new(DuplicateRowsSource), &EngineConfig::default());
        let err = svc
            .generate(StatementId::new(1), month(1), &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::Source(SourceError::InvalidData(_))));
        assert_eq!(err.error_code(), "SOURCE_INVALID_DATA");
    }

    #[test]
    fn test_overflowing_percentage_is_warned() {
        let mut structure = dre();
        structure.base_line = "DED".into();
        let compiled = CompiledStatement::compile(&structure).unwrap();
        // DED = 1e-28 so every other share leaves the decimal range
        let rows = vec![
            AccountAggregate {
                account_id: AccountId::new(4100),
                signed_amount: dec!(1000),
            },
            AccountAggregate {
                account_id: AccountId::new(4200),
                signed_amount: Decimal::new(1, 28),
            },
        ];
        let report = run_pipeline(
            &compiled,
            month(1),
            &rows,
            false,
            2,
            &CancellationToken::new(),
        )
        .unwrap();

        let codes: Vec<&str> = report.warnings.iter().map(ReportWarning::code).collect();
        assert_eq!(codes, vec!["PERCENTAGE_OVERFLOW", "PERCENTAGE_OVERFLOW"]);
        assert_eq!(report.line("REV").unwrap().percentage_of_base, None);
        assert_eq!(report.line("NET").unwrap().percentage_of_base, None);
        assert!(!report.is_degraded());
    }

    #[tokio::test]
    async fn test_batch_rejects_any_invalid_period() {
        let svc = service(source());
        let bad = ReportPeriod::new(date(2024, 5, 1), date(2024, 4, 1));
        let err = svc
            .generate_batch(StatementId::new(1), &[month(1), bad], &CancellationToken::new())
            .await
            .unwrap_err();
        assert!(matches!(err, ReportError::InvalidDateRange { .. }));
    }
}
