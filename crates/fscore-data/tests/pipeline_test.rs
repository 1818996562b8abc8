//! Resolution pipeline behavior against fake adapters.

use async_trait::async_trait;
use chrono::{Duration, NaiveDate, Utc};
use fscore_data::cache::{CacheEntry, CacheKey, CacheStore, MemoryStore};
use fscore_data::normalize::NormalizationFailure;
use fscore_data::{
    AdapterFailure, AttemptOutcome, CanonicalField, DataError, DataSource, FetchOptions,
    FinancialStatement, PeriodId, PipelineConfig, SourcePipeline, StatementCache, StatementSource,
};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

const TICKER: &str = "EVO.ST";

#[derive(Debug)]
enum Behavior {
    Return(Vec<FinancialStatement>),
    Fail(AdapterFailure),
    Hang,
}

#[derive(Debug)]
struct FakeSource {
    kind: DataSource,
    behavior: Behavior,
    calls: AtomicUsize,
}

impl FakeSource {
    fn new(kind: DataSource, behavior: Behavior) -> Arc<Self> {
        Arc::new(Self {
            kind,
            behavior,
            calls: AtomicUsize::new(0),
        })
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl StatementSource for FakeSource {
    fn kind(&self) -> DataSource {
        self.kind
    }

    async fn fetch(
        &self,
        _ticker: &str,
        period: &PeriodId,
        _options: &FetchOptions,
    ) -> Result<Vec<FinancialStatement>, AdapterFailure> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            Behavior::Return(statements) => {
                if statements.iter().any(|s| &s.period_id == period) {
                    Ok(statements.clone())
                } else {
                    Err(AdapterFailure::PeriodNotReported(period.clone()))
                }
            }
            Behavior::Fail(failure) => Err(failure.clone()),
            Behavior::Hang => {
                tokio::time::sleep(std::time::Duration::from_secs(3600)).await;
                Err(AdapterFailure::Transport("unreachable".to_string()))
            }
        }
    }
}

fn year_end(year: i32) -> NaiveDate {
    NaiveDate::from_ymd_opt(year, 12, 31).unwrap()
}

fn statement(year: i32, source: DataSource, fields: &[(CanonicalField, f64)]) -> FinancialStatement {
    let mut stmt = FinancialStatement::new(TICKER, PeriodId::FiscalYear(year), year_end(year), source);
    for (field, value) in fields {
        stmt.set(*field, Some(*value));
    }
    stmt
}

fn full(year: i32, source: DataSource, scale: f64) -> FinancialStatement {
    let fields: Vec<_> = CanonicalField::ALL
        .iter()
        .enumerate()
        .map(|(i, f)| (*f, scale * (i as f64 + 1.0)))
        .collect();
    statement(year, source, &fields)
}

fn options() -> FetchOptions {
    FetchOptions {
        as_of: NaiveDate::from_ymd_opt(2025, 4, 1).unwrap(),
        ..FetchOptions::default()
    }
}

fn not_registered() -> Behavior {
    Behavior::Fail(AdapterFailure::NotRegistered {
        ticker: TICKER.to_string(),
        period: PeriodId::FiscalYear(2024),
    })
}

#[tokio::test]
async fn test_fallback_uses_web_scrape_when_ai_fails() {
    let web_statements = vec![full(2024, DataSource::WebScrape, 10.0), full(2023, DataSource::WebScrape, 9.0)];
    let ai = FakeSource::new(DataSource::AiPdf, not_registered());
    let web = FakeSource::new(DataSource::WebScrape, Behavior::Return(web_statements.clone()));
    let market = FakeSource::new(DataSource::MarketData, Behavior::Return(vec![]));

    let pipeline = SourcePipeline::builder()
        .ai_pdf(ai.clone())
        .web_scrape(web.clone())
        .market_data(market.clone())
        .build()
        .unwrap();

    let resolution = pipeline.resolve(TICKER, &options()).await.unwrap();
    assert_eq!(resolution.statements.len(), 2);
    assert_eq!(resolution.statements[0], web_statements[0]);
    assert_eq!(resolution.statements[0].source, DataSource::WebScrape);
    assert_eq!(resolution.statements[1], web_statements[1]);
    assert_eq!(market.calls(), 0);
    assert_eq!(ai.calls(), 2);

    let first = &resolution.periods[0].attempts;
    assert!(matches!(first[0].outcome, AttemptOutcome::Failed { .. }));
    assert_eq!(first[1].outcome, AttemptOutcome::Fetched);
}

#[tokio::test]
async fn test_partial_statements_merge_field_by_field() {
    let ai = FakeSource::new(
        DataSource::AiPdf,
        Behavior::Return(vec![
            statement(2024, DataSource::AiPdf, &[(CanonicalField::NetIncome, 1067.0), (CanonicalField::TotalAssets, 2330.0)]),
            statement(2023, DataSource::AiPdf, &[(CanonicalField::NetIncome, -177.08), (CanonicalField::TotalAssets, 1112.0)]),
        ]),
    );
    let market = FakeSource::new(
        DataSource::MarketData,
        Behavior::Return(vec![full(2024, DataSource::MarketData, 1.0), full(2023, DataSource::MarketData, 1.0)]),
    );

    let pipeline = SourcePipeline::builder()
        .ai_pdf(ai)
        .market_data(market)
        .build()
        .unwrap();

    let resolution = pipeline.resolve(TICKER, &options()).await.unwrap();
    let current = &resolution.statements[0];
    let market_only = full(2024, DataSource::MarketData, 1.0);

    assert_eq!(current.net_income, Some(1067.0));
    assert_eq!(current.total_assets, Some(2330.0));
    for field in CanonicalField::ALL {
        if !matches!(field, CanonicalField::NetIncome | CanonicalField::TotalAssets) {
            assert_eq!(current.get(field), market_only.get(field), "{field}");
            assert_eq!(current.field_sources[&field], DataSource::MarketData);
        }
    }
    assert_eq!(current.field_sources[&CanonicalField::NetIncome], DataSource::AiPdf);
    assert_eq!(current.source, DataSource::AiPdf);
    assert_eq!(current.confidence, fscore_data::Confidence::Low);
}

#[tokio::test]
async fn test_second_resolution_is_served_from_cache() {
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![full(2024, DataSource::WebScrape, 2.0), full(2023, DataSource::WebScrape, 1.0)]),
    );
    let cache = StatementCache::in_memory();
    let pipeline = SourcePipeline::builder()
        .web_scrape(web.clone())
        .cache(cache)
        .build()
        .unwrap();

    let first = pipeline.resolve(TICKER, &options()).await.unwrap();
    // FY2023 arrived as a by-product of the FY2024 call.
    assert_eq!(web.calls(), 1);
    assert_eq!(first.periods[1].attempts[0].outcome, AttemptOutcome::CacheHit);

    let second = pipeline.resolve(TICKER, &options()).await.unwrap();
    assert_eq!(web.calls(), 1);
    assert_eq!(
        serde_json::to_string(&first.statements).unwrap(),
        serde_json::to_string(&second.statements).unwrap()
    );
    assert!(second.attempts().iter().all(|a| a.outcome == AttemptOutcome::CacheHit));
}

#[tokio::test]
async fn test_force_refresh_skips_reads_but_writes() {
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![full(2024, DataSource::WebScrape, 2.0), full(2023, DataSource::WebScrape, 1.0)]),
    );
    let store = Arc::new(MemoryStore::new());
    let pipeline = SourcePipeline::builder()
        .web_scrape(web.clone())
        .cache(StatementCache::new(store.clone()))
        .build()
        .unwrap();

    pipeline.resolve(TICKER, &options()).await.unwrap();
    assert_eq!(web.calls(), 1);

    let refresh = FetchOptions { force_refresh: true, ..options() };
    pipeline.resolve(TICKER, &refresh).await.unwrap();
    assert_eq!(web.calls(), 3);

    let key = CacheKey::new(TICKER, PeriodId::FiscalYear(2023), DataSource::WebScrape);
    assert!(store.get(&key).unwrap().is_some());

    pipeline.resolve(TICKER, &options()).await.unwrap();
    assert_eq!(web.calls(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_ai_timeout_falls_through() {
    let ai = FakeSource::new(DataSource::AiPdf, Behavior::Hang);
    let market = FakeSource::new(
        DataSource::MarketData,
        Behavior::Return(vec![full(2024, DataSource::MarketData, 1.0), full(2023, DataSource::MarketData, 1.0)]),
    );
    let pipeline = SourcePipeline::builder()
        .ai_pdf(ai)
        .market_data(market)
        .config(PipelineConfig::default())
        .build()
        .unwrap();

    let resolution = pipeline.resolve(TICKER, &options()).await.unwrap();
    assert_eq!(resolution.statements[0].source, DataSource::MarketData);
    assert_eq!(
        resolution.periods[0].attempts[0].outcome,
        AttemptOutcome::Failed { failure: AdapterFailure::Timeout { timeout_secs: 180 } }
    );
}

#[tokio::test]
async fn test_single_usable_period_is_insufficient_history() {
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![
            full(2024, DataSource::WebScrape, 1.0),
            statement(2023, DataSource::WebScrape, &[(CanonicalField::Revenue, 5.0)]),
        ]),
    );
    let market = FakeSource::new(
        DataSource::MarketData,
        Behavior::Fail(AdapterFailure::Transport("503".to_string())),
    );
    let pipeline = SourcePipeline::builder()
        .web_scrape(web)
        .market_data(market)
        .build()
        .unwrap();

    match pipeline.resolve(TICKER, &options()).await {
        Err(DataError::InsufficientHistory { ticker, usable, attempts }) => {
            assert_eq!(ticker, TICKER);
            assert_eq!(usable, 1);
            assert!(attempts.iter().any(|a| a.source == DataSource::MarketData && !a.succeeded()));
        }
        other => panic!("expected insufficient history, got {other:?}"),
    }
}

#[tokio::test]
async fn test_unpublished_year_falls_back_to_older_periods() {
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![
            full(2023, DataSource::WebScrape, 3.0),
            full(2022, DataSource::WebScrape, 2.0),
            full(2021, DataSource::WebScrape, 1.0),
        ]),
    );
    let pipeline = SourcePipeline::builder().web_scrape(web.clone()).build().unwrap();

    let february = FetchOptions {
        as_of: NaiveDate::from_ymd_opt(2025, 2, 15).unwrap(),
        ..FetchOptions::default()
    };
    let resolution = pipeline.resolve(TICKER, &february).await.unwrap();

    let periods: Vec<_> = resolution.statements.iter().map(|s| s.period_id.clone()).collect();
    assert_eq!(periods, vec![PeriodId::FiscalYear(2023), PeriodId::FiscalYear(2022)]);
    assert_eq!(resolution.periods[0].period, PeriodId::FiscalYear(2024));
    assert!(!resolution.periods[0].is_usable());
    // Stops once two consecutive periods resolve.
    assert_eq!(resolution.periods.len(), 3);
    assert_eq!(web.calls(), 3);
}

#[tokio::test]
async fn test_lookback_is_bounded() {
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![full(2019, DataSource::WebScrape, 1.0), full(2018, DataSource::WebScrape, 1.0)]),
    );
    let pipeline = SourcePipeline::builder().web_scrape(web.clone()).build().unwrap();

    match pipeline.resolve(TICKER, &options()).await {
        Err(DataError::InsufficientHistory { usable, attempts, .. }) => {
            assert_eq!(usable, 0);
            assert_eq!(attempts.len(), 4);
            assert_eq!(attempts[3].period, PeriodId::FiscalYear(2021));
        }
        other => panic!("expected insufficient history, got {other:?}"),
    }
    assert_eq!(web.calls(), 4);
}

#[tokio::test]
async fn test_unmapped_labels_surface_as_statement_warning() {
    let ai = FakeSource::new(
        DataSource::AiPdf,
        Behavior::Fail(AdapterFailure::Normalization(NormalizationFailure {
            ticker: TICKER.to_string(),
            period_id: PeriodId::FiscalYear(2024),
            unrecognized: vec!["Omsättning".to_string(), "Årets resultat".to_string()],
        })),
    );
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![full(2024, DataSource::WebScrape, 2.0), full(2023, DataSource::WebScrape, 1.0)]),
    );
    let pipeline = SourcePipeline::builder()
        .ai_pdf(ai)
        .web_scrape(web)
        .cache(StatementCache::in_memory())
        .build()
        .unwrap();

    let resolution = pipeline.resolve(TICKER, &options()).await.unwrap();
    let current = &resolution.statements[0];
    assert_eq!(current.source, DataSource::WebScrape);
    assert_eq!(current.warnings.len(), 1);
    assert!(current.warnings[0].starts_with("ai_pdf: "));
    assert!(current.warnings[0].contains("Omsättning"));

    let json = serde_json::to_value(current).unwrap();
    assert_eq!(json["warnings"][0], current.warnings[0].as_str());

    // Cached payloads stay free of per-resolution warnings.
    let cached = pipeline
        .cache()
        .unwrap()
        .get(TICKER, &PeriodId::FiscalYear(2024), DataSource::WebScrape)
        .unwrap();
    assert!(cached.warnings.is_empty());
}

#[tokio::test]
async fn test_periods_ending_on_same_date_are_rejected() {
    let mut ttm = full(2024, DataSource::WebScrape, 1.0);
    ttm.period_id = PeriodId::Ttm;
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![ttm, full(2024, DataSource::WebScrape, 1.0)]),
    );
    let pipeline = SourcePipeline::builder().web_scrape(web).build().unwrap();

    let request = FetchOptions {
        periods: Some(vec![PeriodId::Ttm, PeriodId::FiscalYear(2024)]),
        ..options()
    };
    let err = pipeline.resolve(TICKER, &request).await.unwrap_err();
    assert!(matches!(err, DataError::PeriodTie { .. }));
}

#[tokio::test]
async fn test_corrupt_cache_entry_degrades_to_live_fetch() {
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![full(2024, DataSource::WebScrape, 1.0), full(2023, DataSource::WebScrape, 1.0)]),
    );
    let store = Arc::new(MemoryStore::new());
    store
        .put(&CacheEntry {
            key: CacheKey::new(TICKER, PeriodId::FiscalYear(2024), DataSource::WebScrape),
            payload: "garbage".to_string(),
            fetched_at: Utc::now(),
            ttl_days: 7,
        })
        .unwrap();

    let pipeline = SourcePipeline::builder()
        .web_scrape(web.clone())
        .cache(StatementCache::new(store))
        .build()
        .unwrap();

    let resolution = pipeline.resolve(TICKER, &options()).await.unwrap();
    assert_eq!(web.calls(), 1);
    assert_eq!(resolution.statements.len(), 2);
}

#[tokio::test]
async fn test_expired_entry_is_refetched() {
    let web = FakeSource::new(
        DataSource::WebScrape,
        Behavior::Return(vec![full(2024, DataSource::WebScrape, 1.0), full(2023, DataSource::WebScrape, 1.0)]),
    );
    let cache = StatementCache::in_memory();
    let stale = Utc::now() - Duration::days(8);
    cache.put_at(&full(2024, DataSource::WebScrape, 7.0), stale);
    cache.put_at(&full(2023, DataSource::WebScrape, 7.0), stale);

    let pipeline = SourcePipeline::builder()
        .web_scrape(web.clone())
        .cache(cache)
        .build()
        .unwrap();

    let resolution = pipeline.resolve(TICKER, &options()).await.unwrap();
    assert_eq!(web.calls(), 1);
    assert_eq!(resolution.statements[0].net_income, Some(1.0));
}

#[tokio::test]
async fn test_empty_ticker_is_rejected() {
    let web = FakeSource::new(DataSource::WebScrape, Behavior::Return(vec![]));
    let pipeline = SourcePipeline::builder().web_scrape(web.clone()).build().unwrap();
    assert!(matches!(
        pipeline.resolve("  ", &options()).await,
        Err(DataError::InvalidTicker(_))
    ));
    assert_eq!(web.calls(), 0);
}

#[test]
fn test_adapter_in_wrong_slot_is_rejected() {
    let web = FakeSource::new(DataSource::WebScrape, Behavior::Return(vec![]));
    assert!(matches!(
        SourcePipeline::builder().ai_pdf(web).build(),
        Err(DataError::Config(_))
    ));
}
