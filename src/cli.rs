// src/cli.rs

// Command-line surface: argument definitions, the `run` and `list`
// commands, and the mapping from outcomes to process exit codes.

use chrono::{DateTime, Local};
use clap::{Args, Parser, Subcommand};
use once_cell::sync::Lazy;
use regex::Regex;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::core::aggregator::{Aggregator, ExportFormat};
use crate::core::catalog::Catalog;
use crate::core::config::ScanConfig;
use crate::core::error::{ExportError, ScanError, TransportError};
use crate::core::models::{Category, RunStatus, ScanRun, Target};
use crate::core::scanner::Session;

pub const EXIT_OK: u8 = 0;
pub const EXIT_INVALID_ARGS: u8 = 1;
pub const EXIT_TIMED_OUT: u8 = 2;
pub const EXIT_EXPORT_FAILED: u8 = 3;

/// Probe a domain for exposed API paths, missing security headers, open
/// cloud storage and leftover files.
#[derive(Parser, Debug)]
#[command(name = "recon-rs-scanner", version, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Show debug output on stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Only show errors on stderr
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Scan a target and export the findings
    Run(RunArgs),
    /// Show the categories and patterns the scanner knows
    List {
        /// Only show this category
        #[arg(short, long)]
        category: Option<String>,
    },
}

#[derive(Args, Debug)]
pub struct RunArgs {
    /// Domain to scan, e.g. example.com
    pub target: String,

    /// Category to scan; repeat or comma-separate for several, or use `all`
    #[arg(short, long = "category", required = true, value_delimiter = ',')]
    pub categories: Vec<String>,

    /// Probes in flight at once
    #[arg(long, env = "RECON_CONCURRENCY", default_value_t = 4)]
    pub concurrency: usize,

    /// Timeout for a single probe (e.g. 500ms, 10s, 1m)
    #[arg(long, env = "RECON_TIMEOUT", default_value = "10s", value_parser = parse_duration)]
    pub timeout: Duration,

    /// Deadline for each category run
    #[arg(long, env = "RECON_DEADLINE", default_value = "60s", value_parser = parse_duration)]
    pub deadline: Duration,

    /// Retries for a probe that failed at the transport level
    #[arg(long, env = "RECON_RETRIES", default_value_t = 2)]
    pub retries: u32,

    /// Delay before the first retry; doubles on each further retry
    #[arg(long, env = "RECON_BACKOFF", default_value = "250ms", value_parser = parse_duration)]
    pub backoff: Duration,

    /// Export format
    #[arg(short, long, value_enum)]
    pub export: ExportFormat,

    /// Output file; defaults to recon_results_<timestamp>.<ext>
    #[arg(short, long)]
    pub out: Option<PathBuf>,

    /// A previous JSON export whose findings are kept ahead of the new ones
    #[arg(long)]
    pub merge: Option<PathBuf>,
}

impl RunArgs {
    pub fn scan_config(&self) -> ScanConfig {
        let defaults = ScanConfig::default();
        ScanConfig {
            max_concurrency: self.concurrency,
            per_probe_timeout: self.timeout,
            overall_deadline: self.deadline,
            max_retries: self.retries,
            retry_base_delay: self.backoff,
            retry_max_delay: defaults.retry_max_delay.max(self.backoff),
        }
    }
}

#[derive(Error, Debug)]
pub enum CliError {
    #[error(transparent)]
    Scan(#[from] ScanError),

    #[error("cannot load previous results from {path}: {source}")]
    Merge { path: PathBuf, source: ExportError },

    #[error(transparent)]
    Export(#[from] ExportError),

    #[error("cannot start HTTP client: {0}")]
    Transport(#[from] TransportError),
}

impl CliError {
    pub fn exit_code(&self) -> u8 {
        match self {
            CliError::Scan(_) | CliError::Merge { .. } | CliError::Transport(_) => EXIT_INVALID_ARGS,
            CliError::Export(_) => EXIT_EXPORT_FAILED,
        }
    }
}

static DURATION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\s*(\d+)\s*(ms|s|m)?\s*$").unwrap());

/// Parses `250ms`, `10s`, `2m` or a bare number of seconds.
pub fn parse_duration(input: &str) -> Result<Duration, String> {
    let caps = DURATION_RE
        .captures(input)
        .ok_or_else(|| format!("invalid duration '{}', expected e.g. 500ms, 10s or 1m", input))?;
    let value: u64 = caps[1]
        .parse()
        .map_err(|_| format!("duration '{}' is out of range", input))?;
    let duration = match caps.get(2).map(|m| m.as_str()) {
        Some("ms") => Duration::from_millis(value),
        Some("m") => Duration::from_secs(value.saturating_mul(60)),
        _ => Duration::from_secs(value),
    };
    Ok(duration)
}

/// Resolves category names, expanding `all`, dropping duplicates and keeping
/// the order given.
pub fn parse_categories(names: &[String]) -> Result<Vec<Category>, ScanError> {
    let mut categories = Vec::new();
    for name in names.iter().map(|n| n.trim()).filter(|n| !n.is_empty()) {
        let resolved = if name.eq_ignore_ascii_case("all") {
            Category::all()
        } else {
            vec![Category::parse(name)?]
        };
        for category in resolved {
            if !categories.contains(&category) {
                categories.push(category);
            }
        }
    }
    if categories.is_empty() {
        return Err(ScanError::UnknownCategory(String::new()));
    }
    Ok(categories)
}

/// `recon_results_<YYYYMMDD_HHMMSS>.<ext>` in the working directory.
pub fn default_export_path(format: ExportFormat, now: DateTime<Local>) -> PathBuf {
    PathBuf::from(format!(
        "recon_results_{}.{}",
        now.format("%Y%m%d_%H%M%S"),
        format.extension()
    ))
}

/// Runs the `run` command against `session` and returns the exit code.
pub async fn run_scan(session: &Session, args: &RunArgs) -> Result<u8, CliError> {
    let target = Target::parse(&args.target)?;
    let categories = parse_categories(&args.categories)?;
    let config = args.scan_config();
    config.validate()?;
    for category in &categories {
        session.catalog().entry(*category)?;
    }

    if let Some(path) = &args.merge {
        let previous = load_previous(path).await.map_err(|source| CliError::Merge {
            path: path.clone(),
            source,
        })?;
        info!(path = %path.display(), findings = previous.len(), "Loaded previous results.");
        session.import(previous).await;
    }

    let runs = session.run_all(&target, &categories, &config).await?;
    for run in &runs {
        print_run_summary(run);
    }

    let path = args
        .out
        .clone()
        .unwrap_or_else(|| default_export_path(args.export, Local::now()));
    let written = session.write_export(args.export, &path).await?;
    println!(
        "Exported {} findings ({} bytes, {}) to {}",
        session.finding_count().await,
        written,
        args.export,
        path.display()
    );

    if runs.iter().any(ScanRun::is_partial) {
        warn!("At least one run timed out; the export is partial.");
        return Ok(EXIT_TIMED_OUT);
    }
    Ok(EXIT_OK)
}

async fn load_previous(path: &Path) -> Result<Aggregator, ExportError> {
    let bytes = tokio::fs::read(path).await?;
    Aggregator::from_structured(&bytes)
}

fn print_run_summary(run: &ScanRun) {
    let status = match run.status {
        RunStatus::Completed => "completed",
        RunStatus::TimedOut => "timed out",
        RunStatus::PartiallyFailed => "partially failed",
    };
    println!(
        "[{}] {} on {}: {} findings, {} failed probes",
        status,
        run.category.title(),
        run.target,
        run.findings.len(),
        run.failures.len()
    );
    for finding in &run.findings {
        println!("    {} -> {}", finding.label, finding.detail);
    }
    for failure in &run.failures {
        println!("    ! {} ({} attempts): {}", failure.url, failure.attempts, failure.error);
    }
}

/// Prints the catalog, optionally limited to one category.
pub fn list_catalog(catalog: &Catalog, category: Option<&str>) -> Result<u8, CliError> {
    let categories = match category {
        Some(name) => {
            let category = Category::parse(name)?;
            catalog.entry(category)?;
            vec![category]
        }
        None => catalog.categories(),
    };
    for category in categories {
        println!("{} ({})", category.title(), category);
        for pattern in catalog.patterns_for(category)? {
            println!("    {:<28} {}", pattern.name, pattern.template);
        }
    }
    Ok(EXIT_OK)
}

/// Dispatches a parsed command line. Returns the process exit code.
pub async fn execute(cli: Cli) -> u8 {
    let result = match &cli.command {
        Commands::Run(args) => match Session::with_http() {
            Ok(session) => run_scan(&session, args).await,
            Err(e) => Err(CliError::from(e)),
        },
        Commands::List { category } => list_catalog(&Catalog::builtin(), category.as_deref()),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            error!(error = %e, "Command failed.");
            eprintln!("error: {}", e);
            e.exit_code()
        }
    }
}
