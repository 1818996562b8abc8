//! Source resolution pipeline.
//!
//! For each requested period the pipeline walks the sources in priority order
//! (AI-parsed report, web scrape, market data), reading the cache before every
//! live call. The first complete statement wins. Partial statements are merged
//! field by field with the next source, the higher-priority value winning.

use crate::cache::StatementCache;
use crate::error::{DataError, Result};
use crate::normalize::NormalizationFailure;
use crate::sources::{AdapterFailure, AttemptOutcome, FetchOptions, SourceAttempt, StatementSource};
use crate::statement::{CanonicalField, DataSource, FinancialStatement, PeriodId};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Per-source time budgets.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// AI extraction budget in seconds
    pub ai_pdf_timeout_secs: u64,
    /// Web scrape budget in seconds
    pub web_scrape_timeout_secs: u64,
    /// Market data budget in seconds
    pub market_data_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            ai_pdf_timeout_secs: 180,
            web_scrape_timeout_secs: 30,
            market_data_timeout_secs: 30,
        }
    }
}

impl PipelineConfig {
    /// The AI budget must be strictly longer than the other two.
    pub fn validate(&self) -> Result<()> {
        if self.ai_pdf_timeout_secs <= self.web_scrape_timeout_secs
            || self.ai_pdf_timeout_secs <= self.market_data_timeout_secs
        {
            return Err(DataError::Config(format!(
                "AI timeout ({}s) must exceed web scrape ({}s) and market data ({}s) timeouts",
                self.ai_pdf_timeout_secs, self.web_scrape_timeout_secs, self.market_data_timeout_secs
            )));
        }
        if self.web_scrape_timeout_secs == 0 || self.market_data_timeout_secs == 0 {
            return Err(DataError::Config("timeouts must be positive".to_string()));
        }
        Ok(())
    }

    /// Budget in seconds for one call to `source`.
    pub const fn timeout_secs(&self, source: DataSource) -> u64 {
        match source {
            DataSource::AiPdf => self.ai_pdf_timeout_secs,
            DataSource::WebScrape => self.web_scrape_timeout_secs,
            DataSource::MarketData => self.market_data_timeout_secs,
        }
    }

    /// Budget for one call to `source`.
    pub const fn timeout_for(&self, source: DataSource) -> Duration {
        Duration::from_secs(self.timeout_secs(source))
    }
}

/// Outcome of resolving one period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResolvedPeriod {
    /// Period requested
    pub period: PeriodId,
    /// Complete statement, if the sources together provided every field
    pub statement: Option<FinancialStatement>,
    /// Fields still missing after every source was tried
    pub missing_fields: Vec<CanonicalField>,
    /// Every source attempt for this period, in order
    pub attempts: Vec<SourceAttempt>,
    /// Normalization and merge problems worth surfacing
    pub warnings: Vec<String>,
}

impl ResolvedPeriod {
    /// Whether the period resolved to a complete statement.
    pub const fn is_usable(&self) -> bool {
        self.statement.is_some()
    }
}

/// Result of resolving a ticker.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Resolution {
    /// Ticker symbol
    pub ticker: String,
    /// Complete statements, newest first
    pub statements: Vec<FinancialStatement>,
    /// Per-period detail, in request order
    pub periods: Vec<ResolvedPeriod>,
}

impl Resolution {
    /// All source attempts across periods.
    pub fn attempts(&self) -> Vec<SourceAttempt> {
        self.periods.iter().flat_map(|p| p.attempts.iter().cloned()).collect()
    }

    /// All warnings across periods.
    pub fn warnings(&self) -> Vec<String> {
        self.periods.iter().flat_map(|p| p.warnings.iter().cloned()).collect()
    }
}

/// Builder for [`SourcePipeline`].
#[derive(Debug, Default)]
pub struct SourcePipelineBuilder {
    ai_pdf: Option<Arc<dyn StatementSource>>,
    web_scrape: Option<Arc<dyn StatementSource>>,
    market_data: Option<Arc<dyn StatementSource>>,
    cache: Option<StatementCache>,
    config: PipelineConfig,
}

impl SourcePipelineBuilder {
    /// Highest-priority source.
    pub fn ai_pdf(mut self, adapter: Arc<dyn StatementSource>) -> Self {
        self.ai_pdf = Some(adapter);
        self
    }

    /// Second-priority source.
    pub fn web_scrape(mut self, adapter: Arc<dyn StatementSource>) -> Self {
        self.web_scrape = Some(adapter);
        self
    }

    /// Universal fallback source.
    pub fn market_data(mut self, adapter: Arc<dyn StatementSource>) -> Self {
        self.market_data = Some(adapter);
        self
    }

    /// Cache consulted before every live call.
    pub fn cache(mut self, cache: StatementCache) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Time budgets.
    pub fn config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<SourcePipeline> {
        self.config.validate()?;

        let mut sources = Vec::new();
        for (slot, adapter) in [
            (DataSource::AiPdf, self.ai_pdf),
            (DataSource::WebScrape, self.web_scrape),
            (DataSource::MarketData, self.market_data),
        ] {
            let Some(adapter) = adapter else { continue };
            if adapter.kind() != slot {
                return Err(DataError::Config(format!(
                    "{} adapter registered in the {} slot",
                    adapter.kind(),
                    slot
                )));
            }
            sources.push(adapter);
        }
        if sources.is_empty() {
            return Err(DataError::Config("no data sources configured".to_string()));
        }

        Ok(SourcePipeline {
            sources,
            cache: self.cache,
            config: self.config,
        })
    }
}

/// Resolves statements across sources with caching, fallback and merge.
#[derive(Debug, Clone)]
pub struct SourcePipeline {
    sources: Vec<Arc<dyn StatementSource>>,
    cache: Option<StatementCache>,
    config: PipelineConfig,
}

impl SourcePipeline {
    /// Start building a pipeline.
    pub fn builder() -> SourcePipelineBuilder {
        SourcePipelineBuilder::default()
    }

    /// Configured sources in priority order.
    pub fn sources(&self) -> Vec<DataSource> {
        self.sources.iter().map(|s| s.kind()).collect()
    }

    /// The cache, if one is configured.
    pub const fn cache(&self) -> Option<&StatementCache> {
        self.cache.as_ref()
    }

    /// Resolve every requested period for a ticker.
    ///
    /// Without explicit periods, older periods are tried (up to
    /// [`FetchOptions::lookback`]) until the requested number of consecutive
    /// periods is complete.
    ///
    /// Fails with [`DataError::PeriodTie`] when two resolved periods end on the
    /// same date, and with [`DataError::InsufficientHistory`] when fewer than
    /// two periods resolve to a complete statement.
    pub async fn resolve(&self, ticker: &str, options: &FetchOptions) -> Result<Resolution> {
        let ticker = ticker.trim();
        if ticker.is_empty() {
            return Err(DataError::InvalidTicker(ticker.to_string()));
        }

        // Walk back until `target` consecutive periods resolve.
        let target = options.target();
        let mut periods = Vec::new();
        let mut run = 0;
        for period in options.candidate_periods() {
            let resolved = self.resolve_period(ticker, &period, options).await;
            run = if resolved.is_usable() { run + 1 } else { 0 };
            periods.push(resolved);
            if run == target {
                break;
            }
        }

        let mut statements: Vec<FinancialStatement> =
            periods.iter().filter_map(|p| p.statement.clone()).collect();
        statements.sort_by(|a, b| b.period_end_date.cmp(&a.period_end_date));

        if let Some(pair) = statements
            .windows(2)
            .find(|w| w[0].period_end_date == w[1].period_end_date)
        {
            return Err(DataError::PeriodTie {
                ticker: ticker.to_string(),
                first: pair[0].period_id.to_string(),
                second: pair[1].period_id.to_string(),
                date: pair[0].period_end_date,
            });
        }

        if statements.len() < 2 {
            let attempts = periods.iter().flat_map(|p| p.attempts.iter().cloned()).collect();
            warn!(ticker, usable = statements.len(), "Insufficient history");
            return Err(DataError::InsufficientHistory {
                ticker: ticker.to_string(),
                usable: statements.len(),
                attempts,
            });
        }

        Ok(Resolution {
            ticker: ticker.to_string(),
            statements,
            periods,
        })
    }

    /// Resolve one period across the sources.
    pub async fn resolve_period(
        &self,
        ticker: &str,
        period: &PeriodId,
        options: &FetchOptions,
    ) -> ResolvedPeriod {
        let mut attempts = Vec::new();
        let mut warnings = Vec::new();
        let mut merged: Option<FinancialStatement> = None;

        for adapter in &self.sources {
            let source = adapter.kind();
            let (statement, outcome) = match self.cached(ticker, period, source, options) {
                Some(statement) => (statement, AttemptOutcome::CacheHit),
                None => match self.fetch_live(adapter.as_ref(), ticker, period, options).await {
                    Ok(statement) => (statement, AttemptOutcome::Fetched),
                    Err(failure) => {
                        if let AdapterFailure::Normalization(e) = &failure {
                            warnings.push(normalization_warning(source, e));
                        }
                        attempts.push(SourceAttempt {
                            source,
                            period: period.clone(),
                            outcome: AttemptOutcome::Failed { failure },
                        });
                        continue;
                    }
                },
            };
            attempts.push(SourceAttempt {
                source,
                period: period.clone(),
                outcome,
            });

            merged = Some(match merged {
                Some(current) if !current.is_empty() => match current.merge_with(&statement) {
                    Ok(combined) => combined,
                    Err(e) => {
                        warn!(ticker, %period, %source, error = %e, "Skipping incompatible statement");
                        warnings.push(e.to_string());
                        current
                    }
                },
                _ => statement,
            });

            if merged.as_ref().is_some_and(FinancialStatement::is_complete) {
                break;
            }
        }

        let missing_fields = merged
            .as_ref()
            .map_or_else(|| CanonicalField::ALL.to_vec(), FinancialStatement::missing_fields);
        let statement = merged.filter(FinancialStatement::is_complete).map(|mut s| {
            s.warnings.extend(warnings.iter().cloned());
            s
        });
        match &statement {
            Some(s) => info!(ticker, %period, source = %s.source, confidence = %s.confidence, "Resolved period"),
            None => info!(ticker, %period, missing = missing_fields.len(), "Insufficient data for period"),
        }

        ResolvedPeriod {
            period: period.clone(),
            statement,
            missing_fields,
            attempts,
            warnings,
        }
    }

    fn cached(
        &self,
        ticker: &str,
        period: &PeriodId,
        source: DataSource,
        options: &FetchOptions,
    ) -> Option<FinancialStatement> {
        if options.force_refresh {
            return None;
        }
        let statement = self.cache.as_ref()?.get(ticker, period, source)?;
        debug!(ticker, %period, %source, "Cache hit");
        Some(statement)
    }

    /// Call one adapter under its time budget and cache everything it returns.
    async fn fetch_live(
        &self,
        adapter: &dyn StatementSource,
        ticker: &str,
        period: &PeriodId,
        options: &FetchOptions,
    ) -> std::result::Result<FinancialStatement, AdapterFailure> {
        let source = adapter.kind();
        debug!(ticker, %period, %source, "Calling adapter");

        let result = tokio::time::timeout(
            self.config.timeout_for(source),
            adapter.fetch(ticker, period, options),
        )
        .await
        .unwrap_or_else(|_| {
            Err(AdapterFailure::Timeout {
                timeout_secs: self.config.timeout_secs(source),
            })
        });

        let statements = match result {
            Ok(statements) => statements,
            Err(failure) => {
                warn!(ticker, %period, %source, %failure, "Adapter failed");
                return Err(failure);
            }
        };

        if let Some(cache) = &self.cache {
            for statement in statements.iter().filter(|s| s.ticker == ticker) {
                cache.put(statement);
            }
        }

        statements
            .into_iter()
            .find(|s| &s.period_id == period)
            .ok_or_else(|| AdapterFailure::PeriodNotReported(period.clone()))
    }
}

fn normalization_warning(source: DataSource, failure: &NormalizationFailure) -> String {
    warn!(%source, ticker = %failure.ticker, period = %failure.period_id, "Field mapping produced no canonical fields");
    format!("{}: {}", source, failure)
}
