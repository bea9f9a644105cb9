// src/main.rs

use anyhow::Context;
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::PathBuf;
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::FmtSubscriber;

mod effective_date;
mod extracts;
mod filters;
mod gripp;
mod normalize;
mod period;
mod reconcile;

use extracts::{
    ExtractDir, ExtractError, TableSource, TABLE_COMPANIES, TABLE_PROJECTS, TABLE_PROJECT_LINES,
    TABLE_TIME_ENTRIES,
};
use filters::StatusFilter;
use gripp::Company;
use period::{Period, PeriodError};
use reconcile::{
    aggregate, LineAmountField, ReconcileInput, ReconcilePolicy, ReconciledSummary,
};

// --- Error Handling ---

#[derive(Error, Debug)]
enum AppError {
    #[error("Extract loading failed: {0}")]
    Extract(#[from] ExtractError),
    #[error("{0}")]
    Period(#[from] PeriodError),
    #[error("Invalid date '{0}': expected YYYY-MM-DD")]
    InvalidDate(String),
    #[error("--from and --to must be given together")]
    IncompletePeriod,
    #[error("Configuration error: {0}")]
    Config(#[from] envy::Error),
    #[error("Failed to write summary CSV: {0}")]
    CsvExport(#[from] csv::Error),
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),
}

// --- Configuration ---

/// Settings read from the environment (`.env` supported), all prefixed
/// with DUNION_. CLI flags take precedence.
#[derive(Debug, Deserialize, Default)]
struct EnvConfig {
    extract_dir: Option<PathBuf>,
}

// --- CLI ---

#[derive(Parser, Debug)]
#[command(
    name = "dunion-core",
    about = "Reconciles Gripp hour registrations against project lines"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Build the per-company reconciliation summary from table extracts.
    Reconcile(ReconcileArgs),
}

#[derive(clap::Args, Debug)]
struct ReconcileArgs {
    /// Directory holding the table extracts (<table>.json or <table>.csv).
    #[arg(long)]
    extract_dir: Option<PathBuf>,
    /// Period start, inclusive (YYYY-MM-DD).
    #[arg(long)]
    from: Option<String>,
    /// Period end, inclusive (YYYY-MM-DD).
    #[arg(long)]
    to: Option<String>,
    /// Which registration statuses count as actuals.
    #[arg(long, value_enum)]
    statuses: StatusArg,
    /// Which project-line quantity feeds the hour totals.
    #[arg(long, value_enum)]
    line_amount: AmountArg,
    /// Also count lines flagged hidden-for-timewriting.
    #[arg(long)]
    include_hidden: bool,
    /// Only show companies carrying this tag (exact match).
    #[arg(long)]
    tag: Option<String>,
    /// Also print the per-project breakdown.
    #[arg(long)]
    per_project: bool,
    /// Write the per-company summary to a CSV file.
    #[arg(long)]
    output_csv: Option<PathBuf>,
}

// The status and amount flags are required on purpose: the engine has no
// default policy, and neither does the CLI.
#[derive(Clone, Copy, Debug, ValueEnum)]
enum StatusArg {
    Approved,
    All,
}

impl From<StatusArg> for StatusFilter {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Approved => StatusFilter::ApprovedOnly,
            StatusArg::All => StatusFilter::AllStatuses,
        }
    }
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum AmountArg {
    Written,
    Planned,
}

impl From<AmountArg> for LineAmountField {
    fn from(arg: AmountArg) -> Self {
        match arg {
            AmountArg::Written => LineAmountField::Written,
            AmountArg::Planned => LineAmountField::Planned,
        }
    }
}

fn parse_cli_date(value: &str) -> Result<NaiveDate, AppError> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| AppError::InvalidDate(value.to_string()))
}

fn period_from_args(args: &ReconcileArgs) -> Result<Option<Period>, AppError> {
    match (&args.from, &args.to) {
        (None, None) => Ok(None),
        (Some(from), Some(to)) => {
            let period = Period::new(parse_cli_date(from)?, parse_cli_date(to)?)?;
            Ok(Some(period))
        }
        _ => Err(AppError::IncompletePeriod),
    }
}

// --- Main Application Logic ---

fn main() -> anyhow::Result<()> {
    dotenv::dotenv().ok();
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .expect("setting default subscriber failed");

    let cli = Cli::parse();
    match cli.command {
        Command::Reconcile(args) => {
            run_reconcile(&args).context("reconciliation failed")?;
        }
    }
    Ok(())
}

fn run_reconcile(args: &ReconcileArgs) -> Result<(), AppError> {
    let env_config: EnvConfig = envy::prefixed("DUNION_").from_env()?;
    let extract_dir = args
        .extract_dir
        .clone()
        .or(env_config.extract_dir)
        .unwrap_or_else(|| PathBuf::from("./extracts"));
    info!("Loading extracts from {}", extract_dir.display());

    let source = ExtractDir::new(extract_dir);
    let time_entries = normalize::normalize_time_entries(&source.load_table(TABLE_TIME_ENTRIES)?);
    let project_lines =
        normalize::normalize_project_lines(&source.load_table(TABLE_PROJECT_LINES)?);
    let projects = normalize::normalize_projects(&source.load_table(TABLE_PROJECTS)?);
    let companies = normalize::normalize_companies(&source.load_table(TABLE_COMPANIES)?);

    let period = period_from_args(args)?;
    let mut policy = ReconcilePolicy::new(args.statuses.into(), args.line_amount.into());
    policy.include_hidden_lines = args.include_hidden;

    let summary = aggregate(
        &ReconcileInput {
            time_entries: &time_entries,
            project_lines: &project_lines,
            projects: &projects,
            companies: &companies,
        },
        period.as_ref(),
        &policy,
    );

    print_company_table(&summary, args.tag.as_deref(), &companies);
    if args.per_project {
        print_project_table(&summary);
    }
    print_diagnostics(&summary, period.as_ref());

    if let Some(path) = &args.output_csv {
        write_summary_csv(path, &summary)?;
        info!("Summary written to {}", path.display());
    }
    Ok(())
}

// --- Output Rendering ---

fn print_company_table(summary: &ReconciledSummary, tag: Option<&str>, companies: &[Company]) {
    let company_by_id: HashMap<&str, &Company> =
        companies.iter().map(|c| (c.id.as_str(), c)).collect();

    println!(
        "{:<12} {:<32} {:>14} {:>14} {:>12}  {}",
        "company", "name", "registered", "lines", "difference", "classification"
    );
    let mut shown = 0usize;
    for row in &summary.companies {
        if let Some(tag) = tag {
            let matches = company_by_id
                .get(row.company_id.as_str())
                .map(|c| c.has_tag(tag))
                .unwrap_or(false);
            if !matches {
                continue;
            }
        }
        shown += 1;
        println!(
            "{:<12} {:<32} {:>14} {:>14} {:>12}  {}",
            row.company_id,
            row.company_name,
            row.registration_hours.round_dp(2),
            row.line_hours.round_dp(2),
            row.difference.round_dp(2),
            row.classification.as_str()
        );
    }
    if let Some(tag) = tag {
        if shown == 0 {
            warn!("No companies carry the tag '{}'", tag);
        }
        println!(
            "(showing {} of {} companies, tag '{}')",
            shown,
            summary.companies.len(),
            tag
        );
    }
    println!(
        "{:<12} {:<32} {:>14} {:>14} {:>12}",
        "TOTAL",
        "",
        summary.totals.registration_hours.round_dp(2),
        summary.totals.line_hours.round_dp(2),
        summary.totals.difference.round_dp(2)
    );
}

fn print_project_table(summary: &ReconciledSummary) {
    println!();
    println!(
        "{:<12} {:<12} {:>14} {:>14} {:>12}  {}",
        "project", "company", "registered", "lines", "difference", "classification"
    );
    for row in &summary.projects {
        println!(
            "{:<12} {:<12} {:>14} {:>14} {:>12}  {}",
            row.project_id,
            row.company_id,
            row.registration_hours.round_dp(2),
            row.line_hours.round_dp(2),
            row.difference.round_dp(2),
            row.classification.as_str()
        );
    }
}

/// The diagnostics block is part of every report: a total without its
/// partition and exclusion counts is exactly the ambiguity this tool
/// exists to remove.
fn print_diagnostics(summary: &ReconciledSummary, period: Option<&Period>) {
    let diag = &summary.diagnostics;
    println!();
    match period {
        Some(period) => println!("Period: {} .. {} (inclusive)", period.start(), period.end()),
        None => println!("Period: full history"),
    }
    for (label, source) in [
        ("registrations", &diag.registrations),
        ("project lines", &diag.lines),
    ] {
        println!(
            "{}: {} in range, {} undated (included, {} h), {} out of range (excluded, {} h), {} unparseable, {} missing amount, {} unmapped",
            label,
            source.partitions.in_range,
            source.partitions.undated,
            source.partitions.undated_hours.round_dp(2),
            source.partitions.out_of_range,
            source.partitions.out_of_range_hours.round_dp(2),
            source.unparseable_amounts,
            source.missing_amounts,
            source.unmapped_companies
        );
    }
    if diag.excluded_statuses.total_count() > 0 {
        println!("excluded by status filter:");
        for (status, tally) in &diag.excluded_statuses.by_status {
            println!(
                "  {:<10} {} entries, {} h",
                status.as_str(),
                tally.count,
                tally.hours.round_dp(2)
            );
        }
    }
    if !diag.non_hour_units.by_unit.is_empty() {
        println!("non-hour units (not in hour totals):");
        for (unit, tally) in &diag.non_hour_units.by_unit {
            println!(
                "  {:<10} {} lines, qty {}",
                unit,
                tally.count,
                tally.hours.round_dp(2)
            );
        }
    }
    if diag.hidden_lines_skipped > 0 {
        println!(
            "hidden-for-timewriting lines skipped: {}",
            diag.hidden_lines_skipped
        );
    }
}

fn write_summary_csv(path: &PathBuf, summary: &ReconciledSummary) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record([
        "company_id",
        "company_name",
        "registration_hours",
        "line_hours",
        "difference",
        "classification",
    ])?;
    for row in &summary.companies {
        writer.write_record([
            row.company_id.as_str(),
            row.company_name.as_str(),
            &row.registration_hours.round_dp(2).to_string(),
            &row.line_hours.round_dp(2).to_string(),
            &row.difference.round_dp(2).to_string(),
            row.classification.as_str(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_args() -> ReconcileArgs {
        ReconcileArgs {
            extract_dir: None,
            from: None,
            to: None,
            statuses: StatusArg::Approved,
            line_amount: AmountArg::Written,
            include_hidden: false,
            tag: None,
            per_project: false,
            output_csv: None,
        }
    }

    #[test]
    fn test_period_flags_must_come_in_pairs() {
        let mut args = base_args();
        args.from = Some("2024-01-01".to_string());
        assert!(matches!(
            period_from_args(&args),
            Err(AppError::IncompletePeriod)
        ));
    }

    #[test]
    fn test_period_flags_parse_and_validate() {
        let mut args = base_args();
        args.from = Some("2024-01-01".to_string());
        args.to = Some("2024-06-30".to_string());
        let period = period_from_args(&args).unwrap().unwrap();
        assert_eq!(period.start(), parse_cli_date("2024-01-01").unwrap());

        args.to = Some("2023-01-01".to_string());
        assert!(matches!(
            period_from_args(&args),
            Err(AppError::Period(PeriodError::StartAfterEnd { .. }))
        ));

        args.to = Some("not-a-date".to_string());
        assert!(matches!(
            period_from_args(&args),
            Err(AppError::InvalidDate(_))
        ));
    }
}
