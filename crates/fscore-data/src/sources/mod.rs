//! Data source adapters.
//!
//! Each adapter turns a ticker and period into canonical statements or a typed
//! [`AdapterFailure`]. Adapters never retry; fallback and retry policy belong
//! to the [`SourcePipeline`](crate::pipeline::SourcePipeline).

pub mod ai_pdf;
pub mod market_data;
pub mod web_scrape;

pub use ai_pdf::{AiPdfAdapter, OpenAiExtractor, ReportEntry, ReportExtractor, ReportRegistry};
pub use market_data::{MarketDataAdapter, MarketDataProvider, ProviderPeriod, YahooTimeseriesProvider};
pub use web_scrape::{HttpPageFetcher, PageFetcher, WebScrapeAdapter};

use crate::normalize::NormalizationFailure;
use crate::statement::{Confidence, DataSource, FinancialStatement, PeriodId, PeriodKind};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use thiserror::Error;

/// Expected, recoverable failure of one adapter call.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum AdapterFailure {
    /// No report registered for the ticker and period
    #[error("no registered report for {ticker} {period}")]
    NotRegistered {
        /// Ticker symbol
        ticker: String,
        /// Requested period
        period: PeriodId,
    },

    /// The call exceeded its time budget
    #[error("timed out after {timeout_secs}s")]
    Timeout {
        /// Budget in seconds
        timeout_secs: u64,
    },

    /// The underlying transport failed
    #[error("transport error: {0}")]
    Transport(String),

    /// The payload could not be read
    #[error("unparseable output: {0}")]
    Unparseable(String),

    /// The payload was read but no label matched a canonical field
    #[error("normalization failed: {0}")]
    Normalization(NormalizationFailure),

    /// The payload does not cover the requested period
    #[error("period {0} not reported")]
    PeriodNotReported(PeriodId),

    /// The extraction declared a confidence below the accepted minimum
    #[error("declared confidence {declared} below minimum {minimum}")]
    LowConfidence {
        /// Confidence the extraction declared
        declared: Confidence,
        /// Minimum accepted confidence
        minimum: Confidence,
    },

    /// The figures failed a sanity check
    #[error("implausible figures: {0}")]
    Implausible(String),
}

impl From<reqwest::Error> for AdapterFailure {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<NormalizationFailure> for AdapterFailure {
    fn from(e: NormalizationFailure) -> Self {
        Self::Normalization(e)
    }
}

/// Older periods tried past the default window when recent ones do not resolve.
pub const DEFAULT_LOOKBACK: usize = 2;

/// Per-request options.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchOptions {
    /// Annual or quarterly comparison
    pub kind: PeriodKind,
    /// Reference date for the default period window
    pub as_of: NaiveDate,
    /// Explicit periods, newest first; overrides the default window
    pub periods: Option<Vec<PeriodId>>,
    /// Number of periods in the default window (at least 2)
    pub history: usize,
    /// Older periods tried when the default window does not fully resolve,
    /// e.g. before the latest annual report is published
    pub lookback: usize,
    /// Skip cache reads for this request; fresh results are still written
    pub force_refresh: bool,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            kind: PeriodKind::Annual,
            as_of: Utc::now().date_naive(),
            periods: None,
            history: 2,
            lookback: DEFAULT_LOOKBACK,
            force_refresh: false,
        }
    }
}

impl FetchOptions {
    /// Quarterly options as of today.
    pub fn quarterly() -> Self {
        Self { kind: PeriodKind::Quarterly, ..Self::default() }
    }

    /// Periods this request resolves, newest first.
    pub fn periods(&self) -> Vec<PeriodId> {
        match &self.periods {
            Some(periods) => periods.clone(),
            None => self.kind.default_window(self.as_of, self.history.max(2)),
        }
    }

    /// Number of consecutive periods that satisfies the request.
    pub fn target(&self) -> usize {
        self.periods.as_ref().map_or(self.history.max(2), Vec::len)
    }

    /// Periods to try, newest first: the explicit periods, or the default
    /// window followed by `lookback` older comparable periods.
    pub fn candidate_periods(&self) -> Vec<PeriodId> {
        match &self.periods {
            Some(periods) => periods.clone(),
            None => self.kind.default_window(self.as_of, self.history.max(2) + self.lookback),
        }
    }
}

/// Common capability of the data source adapters.
#[async_trait]
pub trait StatementSource: Send + Sync + Debug {
    /// Which source this adapter represents.
    fn kind(&self) -> DataSource;

    /// Fetch the statement for `period`.
    ///
    /// The returned list holds the requested period's statement and may hold
    /// statements for other periods found in the same payload. A list without
    /// the requested period is treated as [`AdapterFailure::PeriodNotReported`].
    async fn fetch(
        &self,
        ticker: &str,
        period: &PeriodId,
        options: &FetchOptions,
    ) -> Result<Vec<FinancialStatement>, AdapterFailure>;
}

/// How one source attempt for one period ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Served from cache
    CacheHit,
    /// Fetched live
    Fetched,
    /// The adapter failed
    Failed {
        /// Why
        failure: AdapterFailure,
    },
}

/// Audit record of one source attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceAttempt {
    /// Source tried
    pub source: DataSource,
    /// Period requested
    pub period: PeriodId,
    /// Result
    pub outcome: AttemptOutcome,
}

impl SourceAttempt {
    /// Whether the attempt produced a statement.
    pub const fn succeeded(&self) -> bool {
        !matches!(self.outcome, AttemptOutcome::Failed { .. })
    }
}
