//! Web-scraped statement adapter.
//!
//! Fetches the income statement, balance sheet and cash flow pages of a
//! financial-data site and reads their tables. The header row names the period
//! of each column; an optional "Period Ending" row gives the exact end dates.
//! One set of pages covers several periods, and all of them are returned.

use super::{AdapterFailure, FetchOptions, StatementSource};
use crate::error::Result;
use crate::normalize::{self, RawStatement};
use crate::statement::{DataSource, FinancialStatement, PeriodId, PeriodKind, Scale};
use async_trait::async_trait;
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use scraper::{ElementRef, Html, Selector};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Default site.
pub const STOCKANALYSIS_BASE_URL: &str = "https://stockanalysis.com";

/// Row labels that never hold statement figures.
const SKIP_ROWS: &[&str] = &["period ending", "growth", "margin", "fiscal quarter", "fiscal year"];

/// Fetches a page and returns its HTML.
#[async_trait]
pub trait PageFetcher: Send + Sync + std::fmt::Debug {
    /// GET `url`.
    async fn fetch_page(&self, url: &str) -> std::result::Result<String, AdapterFailure>;
}

/// Plain HTTP page fetcher.
#[derive(Debug, Clone)]
pub struct HttpPageFetcher {
    client: Client,
}

impl HttpPageFetcher {
    /// Create a fetcher with a browser-like user agent.
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .user_agent("Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko)")
            .timeout(Duration::from_secs(60))
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl PageFetcher for HttpPageFetcher {
    async fn fetch_page(&self, url: &str) -> std::result::Result<String, AdapterFailure> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        Ok(response.text().await?)
    }
}

/// Adapter for statements scraped from financial-data pages.
#[derive(Debug, Clone)]
pub struct WebScrapeAdapter {
    fetcher: Arc<dyn PageFetcher>,
    base_url: String,
}

impl WebScrapeAdapter {
    /// Create an adapter against the default site.
    pub fn new(fetcher: Arc<dyn PageFetcher>) -> Self {
        Self {
            fetcher,
            base_url: STOCKANALYSIS_BASE_URL.to_string(),
        }
    }

    /// Use a different site root.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Statement page URLs for a ticker.
    ///
    /// `SAAB-B.ST` maps to `/quote/sto/SAAB.B/financials/`; unsuffixed tickers
    /// are treated as US listings under `/stocks/{ticker}/financials/`.
    pub fn page_urls(&self, ticker: &str, kind: PeriodKind) -> Vec<String> {
        let ticker = ticker.trim();
        let root = match ticker.rsplit_once('.').and_then(|(symbol, suffix)| {
            exchange_code(suffix).map(|exchange| (symbol, exchange))
        }) {
            Some((symbol, exchange)) => format!(
                "{}/quote/{}/{}/financials",
                self.base_url,
                exchange,
                symbol.replace('-', ".")
            ),
            None => format!("{}/stocks/{}/financials", self.base_url, ticker.to_lowercase()),
        };
        let query = match kind {
            PeriodKind::Annual => "",
            PeriodKind::Quarterly => "?p=quarterly",
        };
        ["", "balance-sheet/", "cash-flow-statement/"]
            .iter()
            .map(|page| format!("{}/{}{}", root, page, query))
            .collect()
    }
}

/// Site exchange code for a ticker suffix.
fn exchange_code(suffix: &str) -> Option<&'static str> {
    match suffix.to_ascii_uppercase().as_str() {
        "ST" => Some("sto"),
        "OL" => Some("osl"),
        "CO" => Some("cph"),
        "HE" => Some("hel"),
        "L" => Some("lon"),
        "DE" => Some("etr"),
        "PA" => Some("epa"),
        "AS" => Some("ams"),
        "TO" => Some("tsx"),
        _ => None,
    }
}

/// One period column read from the pages.
#[derive(Debug, Clone, PartialEq)]
struct Column {
    period: PeriodId,
    end: Option<NaiveDate>,
    fields: Vec<(String, String)>,
}

/// Scale and currency stated on the page, e.g. "Financials in millions SEK".
fn detect_units(text: &str) -> (Scale, Option<String>) {
    let lower = text.to_ascii_lowercase();
    for (marker, scale) in [
        ("in thousands", Scale::Thousands),
        ("in millions", Scale::Millions),
        ("in billions", Scale::Billions),
    ] {
        if let Some(pos) = lower.find(marker) {
            let currency = text[pos + marker.len()..]
                .split_whitespace()
                .next()
                .map(|w| w.trim_matches(|c: char| !c.is_ascii_alphabetic()))
                .filter(|w| w.len() == 3 && w.chars().all(|c| c.is_ascii_uppercase()))
                .map(str::to_string);
            return (scale, currency);
        }
    }
    (Scale::Units, None)
}

/// First four-digit year (19xx or 20xx) in a header.
fn find_year(text: &str) -> Option<i32> {
    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i].is_ascii_digit() {
            let start = i;
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let run = &text[start..i];
            if run.len() == 4 && (run.starts_with("19") || run.starts_with("20")) {
                return run.parse().ok();
            }
        } else {
            i += 1;
        }
    }
    None
}

/// Period named by a column header, if the column belongs to `kind`.
fn header_period(header: &str, kind: PeriodKind) -> Option<PeriodId> {
    let lower = header.to_ascii_lowercase();
    if lower.contains("ttm") || lower.contains("trailing") {
        return (kind == PeriodKind::Annual).then_some(PeriodId::Ttm);
    }
    let year = find_year(header)?;
    let quarter = ["q1", "q2", "q3", "q4"]
        .iter()
        .position(|q| lower.contains(q))
        .map(|q| q as u8 + 1);
    match (kind, quarter) {
        (PeriodKind::Annual, None) => Some(PeriodId::FiscalYear(year)),
        (PeriodKind::Quarterly, Some(quarter)) => Some(PeriodId::Quarter { quarter, year }),
        _ => None,
    }
}

/// End date from a "Period Ending" cell: `2024-12-31`, `Dec 31, 2024` or `Dec '24`.
fn parse_period_end(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    for format in ["%Y-%m-%d", "%b %d, %Y", "%B %d, %Y", "%d %b %Y"] {
        if let Ok(date) = NaiveDate::parse_from_str(text, format) {
            return Some(date);
        }
    }
    let (month, year) = text.split_once(" '")?;
    let first = NaiveDate::parse_from_str(&format!("01 {} 20{}", month.trim(), year.trim()), "%d %b %Y").ok()?;
    let next = first.checked_add_months(chrono::Months::new(1))?;
    next.pred_opt().filter(|d| d.month() == first.month())
}

fn cell_text(cell: ElementRef<'_>) -> String {
    cell.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Read every statement table on a page into period columns.
fn parse_tables(html: &str, kind: PeriodKind) -> Vec<Column> {
    let document = Html::parse_document(html);
    let (Ok(table_sel), Ok(row_sel), Ok(cell_sel)) = (
        Selector::parse("table"),
        Selector::parse("tr"),
        Selector::parse("th, td"),
    ) else {
        return Vec::new();
    };

    let mut columns: Vec<Column> = Vec::new();
    for table in document.select(&table_sel) {
        let rows: Vec<Vec<String>> = table
            .select(&row_sel)
            .map(|row| row.select(&cell_sel).map(cell_text).collect())
            .collect();
        let Some(header) = rows.first() else { continue };

        let periods: Vec<(usize, PeriodId)> = header
            .iter()
            .enumerate()
            .skip(1)
            .filter_map(|(i, h)| header_period(h, kind).map(|p| (i, p)))
            .collect();
        if periods.is_empty() {
            continue;
        }

        let ends: BTreeMap<usize, NaiveDate> = rows
            .iter()
            .skip(1)
            .find(|row| row.first().is_some_and(|l| l.to_ascii_lowercase().starts_with("period ending")))
            .map(|row| {
                periods
                    .iter()
                    .filter_map(|(i, _)| row.get(*i).and_then(|c| parse_period_end(c)).map(|d| (*i, d)))
                    .collect()
            })
            .unwrap_or_default();

        for (index, period) in &periods {
            let position = match columns.iter().position(|c| &c.period == period) {
                Some(position) => position,
                None => {
                    columns.push(Column { period: period.clone(), end: None, fields: Vec::new() });
                    columns.len() - 1
                }
            };
            let column = &mut columns[position];
            if column.end.is_none() {
                column.end = ends.get(index).copied();
            }
            for row in rows.iter().skip(1) {
                let Some(label) = row.first() else { continue };
                let lower = label.to_ascii_lowercase();
                if label.is_empty() || SKIP_ROWS.iter().any(|s| lower.contains(s)) {
                    continue;
                }
                if let Some(value) = row.get(*index) {
                    column.fields.push((label.clone(), value.clone()));
                }
            }
        }
    }
    columns
}

/// Reject figures that are inconsistent with each other.
fn plausibility(statement: &FinancialStatement) -> std::result::Result<(), AdapterFailure> {
    if let (Some(revenue), Some(assets)) = (statement.revenue, statement.total_assets)
        && revenue > 0.0
        && assets > 0.0
        && assets < revenue * 0.1
    {
        return Err(AdapterFailure::Implausible(format!(
            "total assets {} below 10% of revenue {}",
            assets, revenue
        )));
    }
    if let (Some(revenue), Some(cfo)) = (statement.revenue, statement.operating_cash_flow)
        && revenue > 1000.0
        && cfo == 0.0
    {
        return Err(AdapterFailure::Implausible(format!(
            "zero operating cash flow with revenue {}",
            revenue
        )));
    }
    Ok(())
}

#[async_trait]
impl StatementSource for WebScrapeAdapter {
    fn kind(&self) -> DataSource {
        DataSource::WebScrape
    }

    async fn fetch(
        &self,
        ticker: &str,
        period: &PeriodId,
        _options: &FetchOptions,
    ) -> std::result::Result<Vec<FinancialStatement>, AdapterFailure> {
        let kind = period.kind();
        let mut pages = Vec::new();
        let mut first_error = None;
        for url in self.page_urls(ticker, kind) {
            debug!(ticker, url = %url, "Fetching statement page");
            match self.fetcher.fetch_page(&url).await {
                Ok(html) => pages.push(html),
                Err(e) => {
                    warn!(ticker, url = %url, error = %e, "Statement page unavailable");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }
        if pages.is_empty() {
            return Err(first_error
                .unwrap_or_else(|| AdapterFailure::Transport("no statement pages".to_string())));
        }

        let mut columns: Vec<Column> = Vec::new();
        let mut scale = Scale::Units;
        let mut currency = None;
        for html in &pages {
            let text: String = Html::parse_document(html).root_element().text().collect();
            let (page_scale, page_currency) = detect_units(&text);
            if page_scale != Scale::Units {
                scale = page_scale;
            }
            currency = currency.or(page_currency);
            for column in parse_tables(html, kind) {
                match columns.iter_mut().find(|c| c.period == column.period) {
                    Some(existing) => {
                        existing.end = existing.end.or(column.end);
                        existing.fields.extend(column.fields);
                    }
                    None => columns.push(column),
                }
            }
        }
        if columns.is_empty() {
            return Err(AdapterFailure::Unparseable(format!("no financial tables for {}", ticker)));
        }

        let mut statements = Vec::new();
        for column in columns {
            let Some(end) = column.end.or_else(|| column.period.nominal_end()) else {
                continue;
            };
            let mut raw = RawStatement::new(ticker, column.period.clone(), end);
            raw.scale = scale;
            raw.currency.clone_from(&currency);
            for (label, value) in column.fields {
                raw.push(label, value.as_str());
            }

            let requested = &column.period == period;
            let statement = match normalize::normalize(&raw, DataSource::WebScrape) {
                Ok(statement) => statement,
                Err(e) if requested => return Err(e.into()),
                Err(_) => continue,
            };
            match plausibility(&statement) {
                Ok(()) => statements.push(statement),
                Err(e) if requested => return Err(e),
                Err(e) => debug!(ticker, period = %column.period, error = %e, "Dropping implausible column"),
            }
        }

        if !statements.iter().any(|s| &s.period_id == period) {
            return Err(AdapterFailure::PeriodNotReported(period.clone()));
        }
        Ok(statements)
    }
}
