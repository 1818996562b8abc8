//! fscore CLI binary.
//!
//! Scores tickers with the Piotroski F-Score and manages the statement cache.

mod integration;

use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use fscore::{BatchOptions, Engine};
use fscore_data::{Confidence, DEFAULT_LOOKBACK, FetchOptions, PeriodId, PeriodKind, PipelineConfig};
use fscore_factors::{FScoreCalculator, LeverageMode, ScoreOptions};
use indicatif::{ProgressBar, ProgressStyle};
use integration::sources::SourceSettings;
use integration::{cache_manager, logging, sources};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use std::time::Duration as StdDuration;
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "fscore")]
#[command(about = "Piotroski F-Score screener over multi-source fundamentals", long_about = None)]
#[command(version)]
struct Cli {
    /// Emit logs as JSON lines on stderr
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Score one or more tickers
    Score(ScoreArgs),

    /// Inspect or clear the statement cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },
}

#[derive(clap::Args)]
struct ScoreArgs {
    /// Ticker symbols, e.g. VOLV-B.ST
    #[arg(required = true)]
    tickers: Vec<String>,

    /// Compare quarters with the same quarter a year earlier
    #[arg(long)]
    quarterly: bool,

    /// Score the N most recent adjacent period pairs
    #[arg(long, value_name = "N")]
    trend: Option<usize>,

    /// Explicit periods, newest first (TTM, FY2024, Q2-2025)
    #[arg(long = "period", value_name = "PERIOD")]
    periods: Vec<PeriodId>,

    /// Older periods to try when recent ones are not yet published
    #[arg(long, value_name = "N", default_value_t = DEFAULT_LOOKBACK)]
    lookback: usize,

    /// Reference date for the default period window (default: today)
    #[arg(long, value_name = "YYYY-MM-DD")]
    as_of: Option<NaiveDate>,

    /// Skip cache reads; fresh results are still cached
    #[arg(long)]
    refresh: bool,

    /// Disable caching entirely
    #[arg(long)]
    no_cache: bool,

    /// Report registry file mapping tickers to annual report URLs
    #[arg(long, value_name = "FILE")]
    registry: Option<PathBuf>,

    /// Tickers resolved at once
    #[arg(long, default_value_t = fscore::batch::DEFAULT_CONCURRENCY)]
    concurrency: usize,

    /// Leverage measure for the leverage test
    #[arg(long, value_enum, default_value_t = LeverageArg::DebtToAssets)]
    leverage: LeverageArg,

    /// Relative share increase still counted as no dilution
    #[arg(long, default_value_t = 0.0)]
    share_threshold: f64,

    /// Lowest accepted AI self-declared confidence
    #[arg(long, default_value = "medium")]
    min_confidence: Confidence,

    /// AI extraction timeout in seconds
    #[arg(long, value_name = "SECS")]
    ai_timeout: Option<u64>,
}

#[derive(Subcommand)]
enum CacheAction {
    /// Show entry counts
    Stats,

    /// Remove cached statements
    Clear {
        /// Only remove entries for this ticker
        #[arg(long)]
        ticker: Option<String>,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum LeverageArg {
    /// Debt to assets ratio
    DebtToAssets,
    /// Absolute debt
    AbsoluteDebt,
}

impl From<LeverageArg> for LeverageMode {
    fn from(arg: LeverageArg) -> Self {
        match arg {
            LeverageArg::DebtToAssets => Self::DebtToAssets,
            LeverageArg::AbsoluteDebt => Self::AbsoluteDebt,
        }
    }
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let cli = Cli::parse();
    logging::init(cli.json_logs);

    if let Err(e) = run(cli).await {
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Score(args) => score(args).await?,
        Commands::Cache { action } => cache(action)?,
    }
    Ok(())
}

fn fetch_options(args: &ScoreArgs) -> FetchOptions {
    let mut options = FetchOptions {
        kind: if args.quarterly { PeriodKind::Quarterly } else { PeriodKind::Annual },
        lookback: args.lookback,
        force_refresh: args.refresh,
        ..FetchOptions::default()
    };
    if let Some(as_of) = args.as_of {
        options.as_of = as_of;
    }
    if let Some(points) = args.trend {
        options.history = points + 1;
    }
    if !args.periods.is_empty() {
        options.periods = Some(args.periods.clone());
    }
    options
}

async fn score(args: ScoreArgs) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = PipelineConfig::default();
    if let Some(secs) = args.ai_timeout {
        config.ai_pdf_timeout_secs = secs;
    }
    let settings = SourceSettings {
        registry: args.registry.clone(),
        min_confidence: args.min_confidence,
        config,
    };

    let cache = if args.no_cache {
        None
    } else {
        match cache_manager::open_cache() {
            Ok(cache) => Some(cache),
            Err(e) => {
                warn!(error = %e, "Cache unavailable, continuing without it");
                None
            }
        }
    };

    let pipeline = sources::build_pipeline(&settings, cache)?;
    info!(sources = ?pipeline.sources(), "Pipeline ready");

    let calculator = FScoreCalculator::with_options(ScoreOptions {
        leverage: args.leverage.into(),
        share_change_threshold: args.share_threshold,
    });
    let engine = Engine::with_calculator(pipeline, calculator);

    let tickers: Vec<String> = args.tickers.iter().map(|t| t.trim().to_uppercase()).collect();
    let batch = BatchOptions {
        concurrency: args.concurrency,
        trend: args.trend.is_some(),
    };

    let pb = ProgressBar::new(tickers.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
            .progress_chars("█▓░"),
    );
    pb.enable_steady_tick(StdDuration::from_millis(100));
    pb.set_message("Scoring...");

    let outcome = engine
        .score_batch(&tickers, &fetch_options(&args), &batch, |ticker, scored| {
            pb.set_message(format!("{} {}", ticker, if scored { "scored" } else { "skipped" }));
            pb.inc(1);
        })
        .await;
    pb.finish_with_message(format!(
        "Scored {}, skipped {}",
        outcome.scored.len(),
        outcome.skipped.len()
    ));

    let reports: Vec<_> = outcome.scored.iter().flat_map(|s| s.reports.iter()).collect();
    let output = json!({
        "reports": reports,
        "skipped": outcome.skipped,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn cache(action: CacheAction) -> Result<(), Box<dyn std::error::Error>> {
    let cache = cache_manager::open_cache()?;
    match action {
        CacheAction::Stats => {
            let stats = cache.stats()?;
            let output = json!({
                "path": cache_manager::cache_path(),
                "entries": stats.entries,
                "expired": stats.expired,
                "by_source": stats.by_source,
            });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
        CacheAction::Clear { ticker } => {
            let ticker = ticker.map(|t| t.trim().to_uppercase());
            let removed = cache.clear(ticker.as_deref())?;
            match ticker {
                Some(t) => println!("Removed {} cached statement(s) for {}", removed, t),
                None => println!("Removed {} cached statement(s)", removed),
            }
        }
    }
    Ok(())
}
