//! drug-reconcile: match two drug catalogs and export the result.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use drug_reconcile_core::{
    input_fingerprint, load_csv, new_batch_id, Database, MatchConfig, MatchMode, MatchRun,
    MatchingEngine, ResultSink, RunControl, RunError, RunSummary, WeightScheme,
};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Log progress every this many source records.
const PROGRESS_EVERY: usize = 100;

#[derive(Parser)]
#[command(name = "drug-reconcile")]
#[command(version, about = "Reconcile two pharmaceutical drug catalogs", long_about = None)]
#[command(after_help = "EXAMPLES:
    # Match with defaults and print a summary
    drug-reconcile match --source dha.csv --target doh.csv --summary

    # Persist results and resume an interrupted batch
    drug-reconcile match --source dha.csv --target doh.csv --db results.sqlite --resume <BATCH>")]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Match a source list against a target list
    Match(MatchArgs),

    /// Print the effective configuration as JSON
    Config,
}

/// Arguments for the `match` subcommand
#[derive(Parser)]
struct MatchArgs {
    /// Source list (CSV, positional columns)
    #[arg(long)]
    source: PathBuf,

    /// Target list (CSV, positional columns)
    #[arg(long)]
    target: PathBuf,

    /// Minimum overall score for a candidate
    #[arg(long)]
    threshold: Option<f64>,

    /// Also report targets that no source matched
    #[arg(long)]
    bidirectional: bool,

    /// Keep only the best target per source
    #[arg(long)]
    single_best: bool,

    /// Use the five-attribute weighting without packaging attributes
    #[arg(long)]
    legacy_weights: bool,

    /// SQLite database for persisting results
    #[arg(long)]
    db: Option<PathBuf>,

    /// Resume a previous batch, skipping sources it already processed
    #[arg(long, value_name = "BATCH", requires = "db")]
    resume: Option<String>,

    /// Stop after this many seconds; completed records are kept
    #[arg(long, value_name = "N")]
    max_seconds: Option<u64>,

    /// Write candidates as CSV
    #[arg(long, value_name = "FILE")]
    out_csv: Option<PathBuf>,

    /// Write unmatched records as CSV
    #[arg(long, value_name = "FILE")]
    out_unmatched: Option<PathBuf>,

    /// Write the full run as JSON
    #[arg(long, value_name = "FILE")]
    out_json: Option<PathBuf>,

    /// Print a summary report
    #[arg(long)]
    summary: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| log_level.to_string()),
        ))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Match(args) => run_match(config, args),
        Commands::Config => {
            println!("{}", config.to_json()?);
            Ok(())
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<MatchConfig> {
    let mut config = match path {
        Some(path) => MatchConfig::load(path)
            .with_context(|| format!("load config: {}", path.display()))?,
        None => MatchConfig::default(),
    };
    config.validate()?;
    Ok(config)
}

fn run_match(mut config: MatchConfig, args: MatchArgs) -> Result<()> {
    if let Some(threshold) = args.threshold {
        config.threshold = threshold;
    }
    if args.bidirectional {
        config.bidirectional = true;
    }
    if args.single_best {
        config.mode = MatchMode::SingleBest;
    }
    if args.legacy_weights {
        config.weight_scheme = WeightScheme::Legacy;
    }
    let engine = MatchingEngine::new(config).context("invalid configuration")?;

    let sources = load_csv(&args.source)
        .with_context(|| format!("load source list: {}", args.source.display()))?;
    let targets = load_csv(&args.target)
        .with_context(|| format!("load target list: {}", args.target.display()))?;
    let fingerprint = input_fingerprint(&sources, &targets)?;

    let mut db = args
        .db
        .as_deref()
        .map(|path| {
            Database::open(path).with_context(|| format!("open database: {}", path.display()))
        })
        .transpose()?;

    let batch_id = args.resume.clone().unwrap_or_else(new_batch_id);
    let mut control = RunControl::new().with_batch_id(batch_id.clone());

    match (db.as_ref(), args.resume.is_some()) {
        (Some(db), true) => {
            let point = db.resume_point(&batch_id, &fingerprint)?;
            tracing::info!(
                batch_id = %batch_id,
                already_processed = point.source_codes.len(),
                targets_stored = point.target_codes.len(),
                "resuming batch"
            );
            control = control
                .resume_from(point.source_codes)
                .resume_targets_from(point.target_codes);
        }
        // Written up front so a killed run can still be resumed
        (Some(db), false) => {
            db.begin_run(&batch_id, engine.config(), &fingerprint, sources.len(), targets.len())?;
        }
        (None, true) => bail!("--resume requires --db"),
        (None, false) => {}
    }

    // Graceful shutdown flag
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop_flag = Arc::clone(&stop);
        if let Err(err) = ctrlc::set_handler(move || stop_flag.store(true, Ordering::Relaxed)) {
            tracing::warn!(error = %err, "could not install Ctrl-C handler");
        }
    }
    control = control.with_cancel_flag(stop);

    if let Some(seconds) = args.max_seconds {
        control = control.with_time_budget(Duration::from_secs(seconds));
    }

    let mut progress = |processed: usize, total: usize| {
        if processed % PROGRESS_EVERY == 0 || processed == total {
            tracing::info!(processed, total, "progress");
        }
    };
    control = control.with_progress(&mut progress);
    if let Some(db) = db.as_mut() {
        control = control.with_sink(db as &mut dyn ResultSink);
    }

    let (run, storage_failed) = match engine.run(&sources, &targets, control) {
        Ok(run) => (run, false),
        Err(err @ RunError::StorageUnavailable { .. }) => {
            tracing::error!(error = %err, "results were not persisted");
            (err.into_run(), true)
        }
    };

    if let Some(db) = db.as_ref() {
        if let Err(err) = db.record_run(&run, &fingerprint) {
            tracing::warn!(error = %err, "failed to record run");
        }
        if run.cancelled {
            tracing::info!(batch_id = %run.batch_id, "run stopped early; continue it with --resume");
        }
    }

    write_outputs(&run, &args)?;

    if args.summary {
        print!("{}", RunSummary::build(&run, &sources, &targets).render_text());
    }

    if storage_failed {
        bail!("storage unavailable: computed results were exported but not persisted");
    }
    Ok(())
}

fn write_outputs(run: &MatchRun, args: &MatchArgs) -> Result<()> {
    if let Some(path) = &args.out_csv {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        run.write_candidates_csv(file)
            .with_context(|| format!("write candidates: {}", path.display()))?;
    }
    if let Some(path) = &args.out_unmatched {
        let file = File::create(path).with_context(|| format!("create {}", path.display()))?;
        run.write_unmatched_csv(file)
            .with_context(|| format!("write unmatched: {}", path.display()))?;
    }
    if let Some(path) = &args.out_json {
        std::fs::write(path, run.to_json()?)
            .with_context(|| format!("write run JSON: {}", path.display()))?;
    }
    Ok(())
}
