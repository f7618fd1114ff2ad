//! Demonstra report generator
//!
//! Command-line entry point that evaluates statements from a JSON fixture.
//!
//! ```bash
//! demonstra report --fixture fixtures/sample_dre.json --from 2024-01-01 --to 2024-03-31
//! demonstra report --fixture fixtures/sample_dre.json --from 2024-01-01 --to 2024-03-31 --monthly
//! demonstra check --fixture fixtures/sample_dre.json
//! ```

mod fixture;

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use demonstra_core::statement::{
    CompiledStatement, PlanStep, ReportPeriod, ReportService, StatementSource,
};
use demonstra_shared::types::StatementId;
use demonstra_shared::{AppConfig, AppError, LoggingConfig};

use fixture::{Fixture, months};

/// Evaluate configurable financial statements.
#[derive(Parser, Debug)]
#[command(name = "demonstra")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate a statement report for a period
    Report {
        /// Fixture with structures and ledger entries
        #[arg(long, value_name = "FILE")]
        fixture: PathBuf,

        /// Statement id (defaults to the lowest in the fixture)
        #[arg(long)]
        statement: Option<i64>,

        /// First day of the period (YYYY-MM-DD)
        #[arg(long)]
        from: NaiveDate,

        /// Last day of the period (YYYY-MM-DD)
        #[arg(long)]
        to: NaiveDate,

        /// One report per calendar month
        #[arg(long)]
        monthly: bool,

        /// Pretty-print the JSON output
        #[arg(long)]
        pretty: bool,
    },
    /// Compile every statement and print its evaluation plan
    Check {
        /// Fixture with structures
        #[arg(long, value_name = "FILE")]
        fixture: PathBuf,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    // Load environment variables from .env file
    dotenvy::dotenv().ok();

    let cli = Cli::parse();

    let config = match AppConfig::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load configuration: {e}");
            return ExitCode::from(2);
        }
    };
    init_tracing(&config.logging);

    match run(cli.command, &config).await {
        Ok(code) => code,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.filter));
    let registry = tracing_subscriber::registry().with(filter);

    // stdout carries the report, logs go to stderr
    if logging.json {
        registry
            .with(fmt::layer().json().with_writer(io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(io::stderr)).init();
    }
}

async fn run(command: Command, config: &AppConfig) -> Result<ExitCode> {
    match command {
        Command::Report {
            fixture,
            statement,
            from,
            to,
            monthly,
            pretty,
        } => {
            let source = Arc::new(Fixture::load(&fixture)?.into_source());
            let id = match statement {
                Some(id) => StatementId::new(id),
                None => *source
                    .statement_ids()
                    .first()
                    .context("fixture contains no statements")?,
            };
            let service = ReportService::new(source, &config.engine);

            let cancel = CancellationToken::new();
            let on_interrupt = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    warn!("Interrupted, cancelling report");
                    on_interrupt.cancel();
                }
            });

            let output = if monthly {
                match months(from, to) {
                    Ok(periods) => service
                        .generate_batch(id, &periods, &cancel)
                        .await
                        .map(|reports| to_json(&reports, pretty)),
                    Err(e) => Err(e),
                }
            } else {
                service
                    .generate(id, ReportPeriod::new(from, to), &cancel)
                    .await
                    .map(|report| to_json(&report, pretty))
            };

            match output {
                Ok(json) => {
                    let mut stdout = io::stdout().lock();
                    writeln!(stdout, "{}", json?)?;
                    Ok(ExitCode::SUCCESS)
                }
                Err(e) => Ok(report_failure(&AppError::from(e))),
            }
        }
        Command::Check { fixture } => {
            let source = Fixture::load(&fixture)?.into_source();
            let mut failed = false;
            for id in source.statement_ids() {
                let structure = source.load_structure(id).await?;
                match CompiledStatement::compile(&structure) {
                    Ok(compiled) => print_plan(&compiled)?,
                    Err(e) => {
                        failed = true;
                        let code = e.error_code();
                        eprintln!("statement {id} ({}): [{code}] {e}", structure.name);
                    }
                }
            }
            Ok(if failed {
                ExitCode::FAILURE
            } else {
                ExitCode::SUCCESS
            })
        }
    }
}

fn to_json<T: serde::Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}

fn report_failure(err: &AppError) -> ExitCode {
    eprintln!("error [{}] {}: {err}", err.error_code(), err.status_code());
    match err {
        AppError::Validation(_) | AppError::NotFound(_) => ExitCode::from(2),
        AppError::Configuration(_) => ExitCode::from(3),
        _ => ExitCode::FAILURE,
    }
}

fn print_plan(compiled: &CompiledStatement) -> Result<()> {
    let mut stdout = io::stdout().lock();
    writeln!(
        stdout,
        "statement {} ({}) hash={:016x} base={}",
        compiled.statement_id, compiled.name, compiled.structure_hash, compiled.base_line
    )?;
    for (i, step) in compiled.plan.steps().iter().enumerate() {
        match step {
            PlanStep::Leaf { code, sign_flip } => {
                let accounts = compiled.bindings.get(code).map_or(0, Vec::len);
                let flip = if *sign_flip { " flipped" } else { "" };
                writeln!(stdout, "  {:>3}. {code} <- {accounts} account(s){flip}", i + 1)?;
            }
            PlanStep::Computed { code, expr } => {
                writeln!(stdout, "  {:>3}. {code} = {expr}", i + 1)?;
            }
        }
    }
    info!(statement_id = %compiled.statement_id, steps = compiled.plan.len(), "Plan checked");
    Ok(())
}
