//! Batch scoring against an in-memory source.

use async_trait::async_trait;
use chrono::NaiveDate;
use fscore::data::normalize::NormalizationFailure;
use fscore::data::{
    AdapterFailure, CanonicalField, DataError, DataSource, FetchOptions, FinancialStatement,
    PeriodId, SourcePipeline, StatementSource,
};
use fscore::factors::ScoreError;
use fscore::{BatchOptions, Engine, EngineError};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
struct FixedSource {
    statements: HashMap<String, Vec<FinancialStatement>>,
}

impl FixedSource {
    fn with(mut self, ticker: &str, scales: &[(i32, f64)]) -> Self {
        let statements = scales
            .iter()
            .map(|(year, scale)| {
                let mut stmt = FinancialStatement::new(
                    ticker,
                    PeriodId::FiscalYear(*year),
                    NaiveDate::from_ymd_opt(*year, 12, 31).unwrap(),
                    DataSource::WebScrape,
                );
                for (i, field) in CanonicalField::ALL.iter().enumerate() {
                    stmt.set(*field, Some(scale * (i as f64 + 1.0)));
                }
                stmt
            })
            .collect();
        self.statements.insert(ticker.to_string(), statements);
        self
    }
}

#[async_trait]
impl StatementSource for FixedSource {
    fn kind(&self) -> DataSource {
        DataSource::WebScrape
    }

    async fn fetch(
        &self,
        ticker: &str,
        period: &PeriodId,
        _options: &FetchOptions,
    ) -> Result<Vec<FinancialStatement>, AdapterFailure> {
        let found: Vec<_> = self
            .statements
            .get(ticker)
            .into_iter()
            .flatten()
            .filter(|s| &s.period_id == period)
            .cloned()
            .collect();
        if found.is_empty() {
            Err(AdapterFailure::PeriodNotReported(period.clone()))
        } else {
            Ok(found)
        }
    }
}

/// Annual report reader whose tables never map to canonical fields.
#[derive(Debug)]
struct UnmappedPdf;

#[async_trait]
impl StatementSource for UnmappedPdf {
    fn kind(&self) -> DataSource {
        DataSource::AiPdf
    }

    async fn fetch(
        &self,
        ticker: &str,
        period: &PeriodId,
        _options: &FetchOptions,
    ) -> Result<Vec<FinancialStatement>, AdapterFailure> {
        Err(AdapterFailure::Normalization(NormalizationFailure {
            ticker: ticker.to_string(),
            period_id: period.clone(),
            unrecognized: vec!["Rörelseresultat".to_string()],
        }))
    }
}

fn source() -> FixedSource {
    FixedSource::default()
        .with("GOOD.ST", &[(2024, 10.0), (2023, 9.0), (2022, 9.0)])
        .with("THIN.ST", &[(2024, 10.0)])
        .with("GAP.ST", &[(2024, 10.0), (2022, 9.0), (2021, 9.0)])
        .with("SPARSE.ST", &[(2024, 10.0), (2022, 9.0)])
}

fn engine() -> Engine {
    let pipeline = SourcePipeline::builder()
        .web_scrape(Arc::new(source()))
        .build()
        .unwrap();
    Engine::new(pipeline)
}

fn options(history: usize) -> FetchOptions {
    FetchOptions {
        as_of: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        history,
        ..FetchOptions::default()
    }
}

fn tickers(list: &[&str]) -> Vec<String> {
    list.iter().map(|t| t.to_string()).collect()
}

#[tokio::test]
async fn test_scores_latest_pair() {
    let report = engine().score("GOOD.ST", &options(2)).await.unwrap();
    assert_eq!(report.statement_pair.current().period_id, PeriodId::FiscalYear(2024));
    assert_eq!(report.statement_pair.prior().period_id, PeriodId::FiscalYear(2023));
    // ratios are flat, shares grow: only tests 1, 2 and 4 pass
    assert_eq!(report.passed_tests(), vec![1, 2, 4]);
}

#[tokio::test]
async fn test_insufficient_history_carries_attempts() {
    let err = engine().score("THIN.ST", &options(2)).await.unwrap_err();
    assert!(matches!(
        err,
        EngineError::Data(DataError::InsufficientHistory { usable: 1, .. })
    ));
    // FY2024 through the two lookback years FY2022 and FY2021
    assert_eq!(err.attempts().len(), 4);
}

#[tokio::test]
async fn test_batch_keeps_input_order_and_records_skips() {
    let mut done = Vec::new();
    let outcome = engine()
        .score_batch(
            &tickers(&["THIN.ST", "GOOD.ST", "NONE.ST", "GOOD.ST"]),
            &options(2),
            &BatchOptions { concurrency: 3, trend: false },
            |ticker, scored| done.push((ticker.to_string(), scored)),
        )
        .await;

    assert_eq!(done.len(), 4);
    assert_eq!(done.iter().filter(|(_, scored)| *scored).count(), 2);

    let scored: Vec<_> = outcome.scored.iter().map(|s| s.ticker.as_str()).collect();
    assert_eq!(scored, vec!["GOOD.ST", "GOOD.ST"]);
    let skipped: Vec<_> = outcome.skipped.iter().map(|s| s.ticker.as_str()).collect();
    assert_eq!(skipped, vec!["THIN.ST", "NONE.ST"]);

    let none = &outcome.skipped[1];
    assert!(none.reason.contains("NONE.ST"));
    assert!(none.attempts.iter().all(|a| !a.succeeded()));
}

#[tokio::test]
async fn test_trend_scores_each_adjacent_pair() {
    let outcome = engine()
        .score_batch(
            &tickers(&["GOOD.ST"]),
            &options(3),
            &BatchOptions { concurrency: 1, trend: true },
            |_, _| {},
        )
        .await;

    let reports = &outcome.scored[0].reports;
    assert_eq!(reports.len(), 2);
    assert_eq!(reports[1].statement_pair.prior().period_id, PeriodId::FiscalYear(2022));
    // equal share counts in 2023 and 2022 pass test 7
    assert_eq!(reports[1].passed_tests(), vec![1, 2, 4, 7]);
}

#[tokio::test]
async fn test_trend_reports_fewer_points_when_periods_are_missing() {
    let reports = engine().score_trend("GOOD.ST", &options(5)).await.unwrap();
    assert_eq!(reports.len(), 2);
}

#[tokio::test]
async fn test_outcome_serializes() {
    let outcome = engine()
        .score_batch(&tickers(&["GOOD.ST", "THIN.ST"]), &options(2), &BatchOptions::default(), |_, _| {})
        .await;
    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["scored"][0]["reports"][0]["score"], 3);
    assert_eq!(json["skipped"][0]["ticker"], "THIN.ST");
    assert_eq!(json["skipped"][0]["attempts"][1]["outcome"]["status"], "failed");
}

#[tokio::test]
async fn test_missing_middle_year_is_not_scored_across() {
    let report = engine().score("GAP.ST", &options(2)).await.unwrap();
    assert_eq!(report.statement_pair.current().period_id, PeriodId::FiscalYear(2022));
    assert_eq!(report.statement_pair.prior().period_id, PeriodId::FiscalYear(2021));

    let reports = engine().score_trend("GAP.ST", &options(3)).await.unwrap();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].statement_pair.current().period_id, PeriodId::FiscalYear(2022));
}

#[tokio::test]
async fn test_no_consecutive_periods_is_skipped() {
    let outcome = engine()
        .score_batch(&tickers(&["SPARSE.ST"]), &options(2), &BatchOptions::default(), |_, _| {})
        .await;
    assert!(outcome.scored.is_empty());
    assert_eq!(outcome.skipped.len(), 1);

    let err = engine().score("SPARSE.ST", &options(2)).await.unwrap_err();
    assert!(matches!(err, EngineError::Score(ScoreError::NoComparablePair(ref t)) if t == "SPARSE.ST"));
}

#[tokio::test]
async fn test_unmapped_report_warning_reaches_output() {
    let pipeline = SourcePipeline::builder()
        .ai_pdf(Arc::new(UnmappedPdf))
        .web_scrape(Arc::new(source()))
        .build()
        .unwrap();
    let outcome = Engine::new(pipeline)
        .score_batch(&tickers(&["GOOD.ST"]), &options(2), &BatchOptions::default(), |_, _| {})
        .await;

    let report = &outcome.scored[0].reports[0];
    let warnings = &report.statement_pair.current().warnings;
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("ai_pdf: "));

    let json = serde_json::to_value(&outcome).unwrap();
    let warning = &json["scored"][0]["reports"][0]["statement_pair"]["current"]["warnings"][0];
    assert!(warning.as_str().unwrap().contains("Rörelseresultat"));
}
