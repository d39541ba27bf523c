use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use chrono::{NaiveDate, Utc};
use clap::{Parser, Subcommand};
use gatewatch_detect::{
    build_snapshots, parse_rows, write_snapshots, ChangeDetector, DetectConfig, EXIT_ERROR,
};
use gatewatch_storage::SnapshotStore;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "gatewatch")]
#[command(about = "Detects changes in daily gate schedules before publishing")]
struct Cli {
    /// YAML config file; environment overrides still apply.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Compare each date file against its last published version.
    Compare {
        #[arg(long)]
        report_json: Option<PathBuf>,
    },
    /// Consolidate raw scraper rows into per-date snapshot files.
    Consolidate {
        #[arg(long)]
        input: PathBuf,
        /// Date for rows without a usable `date` or `datetime`. Defaults to today (UTC).
        #[arg(long)]
        date: Option<String>,
    },
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();
    let cli = Cli::parse();
    let status = exit_status(run(cli).await);
    ExitCode::from(u8::try_from(status).unwrap_or(u8::MAX))
}

async fn run(cli: Cli) -> Result<i32> {
    let mut config = DetectConfig::load(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }

    match cli.command.unwrap_or(Commands::Compare { report_json: None }) {
        Commands::Compare { report_json } => compare(&config, report_json).await,
        Commands::Consolidate { input, date } => {
            consolidate(&config, input, date).await?;
            Ok(0)
        }
    }
}

// 1 means "unchanged", so no failure may surface as 1.
fn exit_status(result: Result<i32>) -> i32 {
    match result {
        Ok(code) => code,
        Err(err) => {
            error!(error = ?err, "gatewatch failed");
            EXIT_ERROR
        }
    }
}

async fn compare(config: &DetectConfig, report_json: Option<PathBuf>) -> Result<i32> {
    let outcome = match ChangeDetector::new(config).run_once().await {
        Ok(outcome) => outcome,
        Err(err) => {
            error!(%err, "change detection aborted");
            return Ok(err.exit_code());
        }
    };

    println!("{}", outcome.render());

    let signal = outcome.signal();
    match &config.output_path {
        Some(path) => signal.append_to(path).await?,
        None => print!("{}", signal.to_key_values()),
    }

    if let Some(path) = report_json {
        let json = serde_json::to_vec_pretty(&outcome).context("serializing run report")?;
        tokio::fs::write(&path, json)
            .await
            .with_context(|| format!("writing {}", path.display()))?;
        info!(path = %path.display(), "run report written");
    }

    Ok(outcome.exit_code())
}

async fn consolidate(config: &DetectConfig, input: PathBuf, date: Option<String>) -> Result<()> {
    let text = tokio::fs::read_to_string(&input)
        .await
        .with_context(|| format!("reading {}", input.display()))?;
    let rows = parse_rows(&text)?;
    let now = Utc::now();
    let fallback_date = match date {
        Some(date) => NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
            .with_context(|| format!("--date {date} is not YYYY-MM-DD"))?,
        None => now.date_naive(),
    }
    .format("%Y-%m-%d")
    .to_string();

    let built = build_snapshots(&rows, &fallback_date, now);
    let store = SnapshotStore::new(config.data_dir.clone(), config.layout());
    let stored = write_snapshots(&store, &built).await?;
    println!(
        "consolidated {} row(s) into {} snapshot(s) ({} skipped)",
        rows.len(),
        stored.len(),
        built.warnings.len()
    );
    Ok(())
}
