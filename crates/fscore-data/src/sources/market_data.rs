//! Market-data provider adapter.
//!
//! The universal fallback: broad ticker coverage, standard line items, lowest
//! confidence. A provider returns every period it has in one response.

use super::{AdapterFailure, FetchOptions, StatementSource};
use crate::error::Result;
use crate::normalize::{self, RawStatement};
use crate::statement::{DataSource, FinancialStatement, PeriodId, PeriodKind, Scale};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Yahoo Finance fundamentals endpoint.
pub const YAHOO_TIMESERIES_URL: &str =
    "https://query2.finance.yahoo.com/ws/fundamentals-timeseries/v1/finance/timeseries";

/// Line items requested from the provider.
const LINE_ITEMS: &[&str] = &[
    "NetIncome",
    "OperatingCashFlow",
    "TotalAssets",
    "TotalDebt",
    "LongTermDebt",
    "CurrentAssets",
    "CurrentLiabilities",
    "OrdinarySharesNumber",
    "ShareIssued",
    "TotalRevenue",
    "GrossProfit",
    "CostOfRevenue",
];

/// Line items for one reporting period.
#[derive(Debug, Clone, PartialEq)]
pub struct ProviderPeriod {
    /// Last day of the period
    pub period_end: NaiveDate,
    /// ISO currency code
    pub currency: Option<String>,
    /// Provider line item name to value, in plain units
    pub items: BTreeMap<String, f64>,
}

/// Source of standard statement line items.
#[async_trait]
pub trait MarketDataProvider: Send + Sync + std::fmt::Debug {
    /// All available periods of `kind` for a ticker.
    async fn statements(
        &self,
        ticker: &str,
        kind: PeriodKind,
    ) -> std::result::Result<Vec<ProviderPeriod>, AdapterFailure>;
}

/// Provider backed by Yahoo Finance's fundamentals timeseries.
#[derive(Debug, Clone)]
pub struct YahooTimeseriesProvider {
    client: Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TimeseriesResponse {
    timeseries: TimeseriesBody,
}

#[derive(Debug, Deserialize)]
struct TimeseriesBody {
    #[serde(default)]
    result: Vec<Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TimeseriesPoint {
    as_of_date: NaiveDate,
    currency_code: Option<String>,
    reported_value: Option<ReportedValue>,
}

#[derive(Debug, Deserialize)]
struct ReportedValue {
    raw: f64,
}

impl YahooTimeseriesProvider {
    /// Create a provider against the public endpoint.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64)")
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            client,
            base_url: YAHOO_TIMESERIES_URL.to_string(),
        })
    }

    /// Use a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

const fn prefix(kind: PeriodKind) -> &'static str {
    match kind {
        PeriodKind::Annual => "annual",
        PeriodKind::Quarterly => "quarterly",
    }
}

/// Group a timeseries response by period end date, newest first.
fn parse_timeseries(body: &str, kind: PeriodKind) -> std::result::Result<Vec<ProviderPeriod>, AdapterFailure> {
    let response: TimeseriesResponse = serde_json::from_str(body)
        .map_err(|e| AdapterFailure::Unparseable(format!("timeseries response: {}", e)))?;
    let prefix = prefix(kind);

    let mut periods: BTreeMap<NaiveDate, ProviderPeriod> = BTreeMap::new();
    for series in &response.timeseries.result {
        let Some(series_type) = series
            .pointer("/meta/type/0")
            .and_then(Value::as_str)
        else {
            continue;
        };
        let Some(item) = series_type.strip_prefix(prefix) else { continue };
        let Some(points) = series.get(series_type).and_then(Value::as_array) else { continue };

        for point in points {
            // Provider sends null for periods without a value.
            let Ok(point) = serde_json::from_value::<TimeseriesPoint>(point.clone()) else {
                continue;
            };
            let Some(value) = point.reported_value else { continue };
            let entry = periods.entry(point.as_of_date).or_insert_with(|| ProviderPeriod {
                period_end: point.as_of_date,
                currency: None,
                items: BTreeMap::new(),
            });
            if entry.currency.is_none() {
                entry.currency = point.currency_code;
            }
            entry.items.insert(item.to_string(), value.raw);
        }
    }
    Ok(periods.into_values().rev().collect())
}

#[async_trait]
impl MarketDataProvider for YahooTimeseriesProvider {
    async fn statements(
        &self,
        ticker: &str,
        kind: PeriodKind,
    ) -> std::result::Result<Vec<ProviderPeriod>, AdapterFailure> {
        let prefix = prefix(kind);
        let types = LINE_ITEMS
            .iter()
            .map(|item| format!("{}{}", prefix, item))
            .collect::<Vec<_>>()
            .join(",");
        let period2 = Utc::now().timestamp();
        let period1 = period2 - 10 * 365 * 24 * 3600;
        let url = format!("{}/{}", self.base_url, ticker);
        debug!(ticker, url = %url, "Querying market data provider");

        let body = self
            .client
            .get(&url)
            .query(&[
                ("type", types),
                ("period1", period1.to_string()),
                ("period2", period2.to_string()),
            ])
            .send()
            .await?
            .error_for_status()?
            .text()
            .await?;
        parse_timeseries(&body, kind)
    }
}

/// Adapter over a [`MarketDataProvider`].
#[derive(Debug, Clone)]
pub struct MarketDataAdapter {
    provider: Arc<dyn MarketDataProvider>,
}

impl MarketDataAdapter {
    /// Create an adapter.
    pub fn new(provider: Arc<dyn MarketDataProvider>) -> Self {
        Self { provider }
    }
}

#[async_trait]
impl StatementSource for MarketDataAdapter {
    fn kind(&self) -> DataSource {
        DataSource::MarketData
    }

    async fn fetch(
        &self,
        ticker: &str,
        period: &PeriodId,
        _options: &FetchOptions,
    ) -> std::result::Result<Vec<FinancialStatement>, AdapterFailure> {
        if *period == PeriodId::Ttm {
            return Err(AdapterFailure::PeriodNotReported(PeriodId::Ttm));
        }
        let kind = period.kind();
        let periods = self.provider.statements(ticker, kind).await?;

        let mut statements: Vec<FinancialStatement> = Vec::new();
        for provided in periods {
            let period_id = PeriodId::from_end_date(provided.period_end, kind);
            // Newest first, so a later duplicate is an older fiscal-year change.
            if statements.iter().any(|s| s.period_id == period_id) {
                continue;
            }
            let mut raw = RawStatement::new(ticker, period_id.clone(), provided.period_end);
            raw.scale = Scale::Units;
            raw.currency = provided.currency;
            for (item, value) in provided.items {
                raw.push(item, value);
            }
            match normalize::normalize(&raw, DataSource::MarketData) {
                Ok(statement) => statements.push(statement),
                Err(e) if &period_id == period => return Err(e.into()),
                Err(e) => debug!(ticker, period = %period_id, error = %e, "Skipping period"),
            }
        }

        if !statements.iter().any(|s| &s.period_id == period) {
            return Err(AdapterFailure::PeriodNotReported(period.clone()));
        }
        Ok(statements)
    }
}
