//! Concurrent scoring of many tickers.
//!
//! Tickers are independent: each one is resolved and scored on its own, and a
//! failure only skips that ticker. The shared cache is the only common state.

use crate::engine::Engine;
use crate::error::EngineError;
use fscore_data::{FetchOptions, SourceAttempt};
use fscore_factors::FScoreReport;
use futures::stream::{self, StreamExt};
use serde::Serialize;
use tracing::warn;

/// Default number of tickers resolved at once.
pub const DEFAULT_CONCURRENCY: usize = 4;

/// Batch configuration.
#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Tickers in flight at once (default: 4)
    pub concurrency: usize,
    /// Score every adjacent period pair instead of only the latest (default: false)
    pub trend: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            concurrency: DEFAULT_CONCURRENCY,
            trend: false,
        }
    }
}

/// Reports for one ticker, newest pair first.
#[derive(Debug, Clone, Serialize)]
pub struct TickerScores {
    /// Ticker symbol
    pub ticker: String,
    /// One report, or one per adjacent pair in trend mode
    pub reports: Vec<FScoreReport>,
}

/// A ticker the batch could not score.
#[derive(Debug, Clone, Serialize)]
pub struct SkippedTicker {
    /// Ticker symbol
    pub ticker: String,
    /// Error message
    pub reason: String,
    /// Source attempts made before giving up
    pub attempts: Vec<SourceAttempt>,
}

/// Result of a batch, both lists in input order.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchOutcome {
    /// Scored tickers
    pub scored: Vec<TickerScores>,
    /// Skipped tickers
    pub skipped: Vec<SkippedTicker>,
}

impl Engine {
    /// Score many tickers concurrently.
    ///
    /// # Arguments
    /// * `tickers` - Tickers to score
    /// * `options` - Fetch options shared by every ticker
    /// * `batch` - Concurrency and trend settings
    /// * `on_done` - Called with each ticker as it finishes, and whether it scored
    pub async fn score_batch<F>(
        &self,
        tickers: &[String],
        options: &FetchOptions,
        batch: &BatchOptions,
        mut on_done: F,
    ) -> BatchOutcome
    where
        F: FnMut(&str, bool),
    {
        let mut results: Vec<(usize, String, Result<Vec<FScoreReport>, EngineError>)> =
            stream::iter(tickers.iter().enumerate())
                .map(|(index, ticker)| async move {
                    let result = if batch.trend {
                        self.score_trend(ticker, options).await
                    } else {
                        self.score(ticker, options).await.map(|report| vec![report])
                    };
                    (index, ticker.clone(), result)
                })
                .buffer_unordered(batch.concurrency.max(1))
                .inspect(|(_, ticker, result)| on_done(ticker, result.is_ok()))
                .collect()
                .await;
        results.sort_by_key(|(index, _, _)| *index);

        let mut outcome = BatchOutcome::default();
        for (_, ticker, result) in results {
            match result {
                Ok(reports) => outcome.scored.push(TickerScores { ticker, reports }),
                Err(e) => {
                    warn!(ticker = %ticker, error = %e, "Skipping ticker");
                    outcome.skipped.push(SkippedTicker {
                        reason: e.to_string(),
                        attempts: e.attempts().to_vec(),
                        ticker,
                    });
                }
            }
        }
        outcome
    }
}
