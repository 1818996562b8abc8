//! Per-ticker resolve-then-score.

use crate::error::Result;
use fscore_data::{FetchOptions, FinancialStatement, SourcePipeline};
use fscore_factors::{FScoreCalculator, FScoreReport};
use tracing::{info, warn};

/// Resolves a ticker's statements and scores them.
#[derive(Debug, Clone)]
pub struct Engine {
    pipeline: SourcePipeline,
    calculator: FScoreCalculator,
}

impl Engine {
    /// Engine with the default calculator.
    pub fn new(pipeline: SourcePipeline) -> Self {
        Self::with_calculator(pipeline, FScoreCalculator::default())
    }

    /// Engine with a configured calculator.
    pub const fn with_calculator(pipeline: SourcePipeline, calculator: FScoreCalculator) -> Self {
        Self { pipeline, calculator }
    }

    /// The resolution pipeline.
    pub const fn pipeline(&self) -> &SourcePipeline {
        &self.pipeline
    }

    /// The calculator.
    pub const fn calculator(&self) -> &FScoreCalculator {
        &self.calculator
    }

    /// Score the most recent consecutive pair of resolved periods.
    pub async fn score(&self, ticker: &str, options: &FetchOptions) -> Result<FScoreReport> {
        let resolution = self.pipeline.resolve(ticker, options).await?;
        log_warnings(&resolution.statements);
        let report = self.calculator.score_latest(&resolution.statements)?;
        info!(
            ticker = %report.ticker,
            score = report.score,
            current = %report.statement_pair.current().period_id,
            prior = %report.statement_pair.prior().period_id,
            "Scored"
        );
        Ok(report)
    }

    /// Score every consecutive pair of resolved periods, newest pair first.
    ///
    /// Periods that did not resolve are left out, so the trend may hold fewer
    /// points than requested.
    pub async fn score_trend(&self, ticker: &str, options: &FetchOptions) -> Result<Vec<FScoreReport>> {
        let resolution = self.pipeline.resolve(ticker, options).await?;
        log_warnings(&resolution.statements);
        let reports = self.calculator.score_trend(&resolution.statements)?;
        info!(
            ticker = %resolution.ticker,
            points = reports.len(),
            requested = options.target().saturating_sub(1),
            "Scored trend"
        );
        Ok(reports)
    }
}

fn log_warnings(statements: &[FinancialStatement]) {
    for statement in statements {
        for warning in &statement.warnings {
            warn!(ticker = %statement.ticker, period = %statement.period_id, %warning, "Statement warning");
        }
    }
}
