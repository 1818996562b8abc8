//! AI-parsed report adapter.
//!
//! Reports are located through a static [`ReportRegistry`], sent to an
//! extraction model by a [`ReportExtractor`], and the model's JSON reply is
//! normalized like any other raw payload. One annual report holds the current
//! and the previous fiscal year, so every successful call yields two periods.

use super::{AdapterFailure, FetchOptions, StatementSource};
use crate::error::Result;
use crate::normalize::{self, RawStatement, RawValue};
use crate::statement::{Confidence, DataSource, FinancialStatement, PeriodId, Scale};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use chrono::{Datelike, NaiveDate};
use reqwest::Client;
use reqwest::header::CONTENT_TYPE;
use scraper::{Html, Selector};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Default OpenAI API base URL.
pub const OPENAI_BASE_URL: &str = "https://api.openai.com";

/// Default extraction model.
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// One published report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReportEntry {
    /// Period the report's current column covers
    pub period: PeriodId,
    /// Where the report (or a page linking to it) lives
    pub url: String,
    /// Last day of the current column's period, when it differs from the calendar year end
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub period_end: Option<NaiveDate>,
}

/// Static ticker to report mapping.
///
/// Serialized as a JSON object of ticker to a list of entries:
///
/// ```json
/// { "VOLV-B.ST": [{ "period": "FY2024", "url": "https://.../annual-report-2024.pdf" }] }
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportRegistry {
    reports: HashMap<String, Vec<ReportEntry>>,
}

/// Which column of a report holds a period.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Current,
    Previous,
}

impl ReportRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a registry file. A missing file is an empty registry.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            info!(path = %path.display(), "Report registry not found, AI extraction has no reports");
            return Ok(Self::new());
        }
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a registry from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        let parsed: HashMap<String, Vec<ReportEntry>> = serde_json::from_str(json)?;
        let mut registry = Self::new();
        for (ticker, entries) in parsed {
            for entry in entries {
                registry.insert(&ticker, entry);
            }
        }
        Ok(registry)
    }

    /// Register a report.
    pub fn insert(&mut self, ticker: &str, entry: ReportEntry) {
        self.reports
            .entry(ticker.trim().to_ascii_uppercase())
            .or_default()
            .push(entry);
    }

    /// Number of tickers with at least one report.
    pub fn len(&self) -> usize {
        self.reports.len()
    }

    /// Whether no reports are registered.
    pub fn is_empty(&self) -> bool {
        self.reports.is_empty()
    }

    /// Report covering `period`, preferring one whose current column is that period.
    fn lookup(&self, ticker: &str, period: &PeriodId) -> Option<(&ReportEntry, Column)> {
        let entries = self.reports.get(&ticker.trim().to_ascii_uppercase())?;
        entries
            .iter()
            .find(|e| &e.period == period)
            .map(|e| (e, Column::Current))
            .or_else(|| {
                entries
                    .iter()
                    .find(|e| e.period.previous_comparable().as_ref() == Some(period))
                    .map(|e| (e, Column::Previous))
            })
    }
}

/// Sends a report to an extraction model and returns the model's reply text.
#[async_trait]
pub trait ReportExtractor: Send + Sync + std::fmt::Debug {
    /// Extract statement figures from the report at `url`.
    async fn extract(&self, ticker: &str, url: &str) -> std::result::Result<String, AdapterFailure>;
}

/// Prompt sent with every report.
pub fn extraction_prompt(ticker: &str) -> String {
    format!(
        r#"You are a financial analyst extracting data from the annual or interim report of {ticker}.

Extract the following figures for the TWO MOST RECENT comparable periods in the consolidated
financial statements (current and previous):

- revenue (net sales, turnover)
- net_income (profit for the period attributable to the group)
- cogs (cost of goods sold, cost of sales)
- gross_profit
- total_assets
- total_debt (interest-bearing liabilities; use long-term debt if no total is reported)
- current_assets
- current_liabilities
- cfo (cash flow from operating activities, from the consolidated cash flow statement)
- shares (shares outstanding)

Rules:
1. Use the audited consolidated statements, not summaries or segment notes.
2. Report every figure in the same unit and state that unit.
3. Use null for any figure you cannot find. Never use 0 for a missing figure.
4. Return ONLY a JSON object with this structure:

{{
  "revenue_cur": <number|null>, "revenue_prev": <number|null>,
  "net_income_cur": <number|null>, "net_income_prev": <number|null>,
  "cogs_cur": <number|null>, "cogs_prev": <number|null>,
  "gross_profit_cur": <number|null>, "gross_profit_prev": <number|null>,
  "total_assets_cur": <number|null>, "total_assets_prev": <number|null>,
  "total_debt_cur": <number|null>, "total_debt_prev": <number|null>,
  "current_assets_cur": <number|null>, "current_assets_prev": <number|null>,
  "current_liabilities_cur": <number|null>, "current_liabilities_prev": <number|null>,
  "cfo_cur": <number|null>, "cfo_prev": <number|null>,
  "shares_cur": <number|null>, "shares_prev": <number|null>,
  "units": "<actual|thousands|millions|billions>",
  "currency": "<ISO code>",
  "fiscal_years": {{ "current": "<year>", "previous": "<year>" }},
  "period_end": "<YYYY-MM-DD of the current period>",
  "confidence": "<high|medium|low>"
}}"#
    )
}

/// Extractor backed by an OpenAI-compatible chat completions endpoint.
#[derive(Debug, Clone)]
pub struct OpenAiExtractor {
    client: Client,
    api_key: String,
    model: String,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

impl OpenAiExtractor {
    /// Create an extractor for the default endpoint and model.
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("fscore/", env!("CARGO_PKG_VERSION")))
            .timeout(Duration::from_secs(300))
            .build()?;
        Ok(Self {
            client,
            api_key: api_key.into(),
            model: DEFAULT_MODEL.to_string(),
            base_url: OPENAI_BASE_URL.to_string(),
        })
    }

    /// Use a different model.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    /// Use a different OpenAI-compatible endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Download the PDF at `url`, following one link when `url` is an HTML page.
    async fn download_pdf(&self, url: &str) -> std::result::Result<Vec<u8>, AdapterFailure> {
        let response = self.client.get(url).send().await?.error_for_status()?;
        let final_url = response.url().clone();
        let is_html = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .is_some_and(|v| v.contains("html"));
        let bytes = response.bytes().await?;

        if bytes.starts_with(b"%PDF") {
            return Ok(bytes.to_vec());
        }
        if !is_html {
            return Err(AdapterFailure::Unparseable(format!("{} is not a PDF", url)));
        }

        let html = String::from_utf8_lossy(&bytes);
        let link = find_pdf_link(&html)
            .ok_or_else(|| AdapterFailure::Unparseable(format!("no PDF link on {}", url)))?;
        let pdf_url = final_url
            .join(&link)
            .map_err(|e| AdapterFailure::Unparseable(format!("bad PDF link {}: {}", link, e)))?;
        debug!(page = url, pdf = %pdf_url, "Following report link");

        let bytes = self
            .client
            .get(pdf_url.clone())
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        if !bytes.starts_with(b"%PDF") {
            return Err(AdapterFailure::Unparseable(format!("{} is not a PDF", pdf_url)));
        }
        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl ReportExtractor for OpenAiExtractor {
    async fn extract(&self, ticker: &str, url: &str) -> std::result::Result<String, AdapterFailure> {
        let pdf = self.download_pdf(url).await?;
        info!(ticker, url, bytes = pdf.len(), model = %self.model, "Sending report for extraction");

        let filename = url.rsplit('/').next().unwrap_or("report.pdf");
        let body = json!({
            "model": self.model,
            "temperature": 0,
            "messages": [{
                "role": "user",
                "content": [
                    { "type": "text", "text": extraction_prompt(ticker) },
                    {
                        "type": "file",
                        "file": {
                            "filename": filename,
                            "file_data": format!("data:application/pdf;base64,{}", STANDARD.encode(&pdf)),
                        }
                    }
                ]
            }]
        });

        let response = self
            .client
            .post(format!("{}/v1/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(AdapterFailure::Transport(format!("API error {}: {}", status, text)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| AdapterFailure::Unparseable(format!("chat response: {}", e)))?;
        chat.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| AdapterFailure::Unparseable("empty reply".to_string()))
    }
}

/// First link on a page that points at a PDF.
fn find_pdf_link(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("a[href]").ok()?;
    document
        .select(&selector)
        .filter_map(|a| a.value().attr("href"))
        .find(|href| {
            let path = href.split(['?', '#']).next().unwrap_or(href);
            path.to_ascii_lowercase().ends_with(".pdf")
        })
        .map(str::to_string)
}

/// JSON object in a model reply: a fenced ```json block, else the outermost braces.
fn json_object(reply: &str) -> Option<&str> {
    if let Some(start) = reply.find("```json") {
        let body = &reply[start + "```json".len()..];
        if let Some(end) = body.find("```") {
            return Some(body[..end].trim());
        }
    }
    let start = reply.find('{')?;
    let end = reply.rfind('}')?;
    (end > start).then(|| &reply[start..=end])
}

/// Adapter for AI-extracted report figures.
#[derive(Debug, Clone)]
pub struct AiPdfAdapter {
    registry: Arc<ReportRegistry>,
    extractor: Arc<dyn ReportExtractor>,
    min_confidence: Confidence,
}

impl AiPdfAdapter {
    /// Create an adapter accepting extractions of medium confidence or better.
    pub fn new(registry: ReportRegistry, extractor: Arc<dyn ReportExtractor>) -> Self {
        Self {
            registry: Arc::new(registry),
            extractor,
            min_confidence: Confidence::Medium,
        }
    }

    /// Set the lowest self-declared confidence that is accepted.
    pub const fn with_min_confidence(mut self, min_confidence: Confidence) -> Self {
        self.min_confidence = min_confidence;
        self
    }

    /// Turn a model reply for the report `entry` into statements.
    fn parse_reply(
        &self,
        ticker: &str,
        entry: &ReportEntry,
        reply: &str,
    ) -> std::result::Result<Vec<FinancialStatement>, AdapterFailure> {
        let object = json_object(reply)
            .ok_or_else(|| AdapterFailure::Unparseable("no JSON object in reply".to_string()))?;
        let data: Map<String, Value> = serde_json::from_str(object)
            .map_err(|e| AdapterFailure::Unparseable(format!("invalid JSON: {}", e)))?;

        let declared = match data.get("confidence").and_then(Value::as_str) {
            Some(text) => text.parse().unwrap_or_else(|_| {
                warn!(ticker, confidence = text, "Unrecognized extraction confidence, assuming medium");
                Confidence::Medium
            }),
            None => Confidence::Medium,
        };
        if declared < self.min_confidence {
            return Err(AdapterFailure::LowConfidence {
                declared,
                minimum: self.min_confidence,
            });
        }

        let scale = data
            .get("units")
            .and_then(Value::as_str)
            .and_then(Scale::from_label)
            .unwrap_or_default();
        let currency = data.get("currency").and_then(Value::as_str).map(str::to_string);

        let current_period = entry.period.clone();
        let current_end = data
            .get("period_end")
            .and_then(Value::as_str)
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok())
            .or(entry.period_end)
            .or_else(|| current_period.nominal_end())
            .ok_or_else(|| {
                AdapterFailure::Unparseable(format!("no period end for {}", current_period))
            })?;

        if let (PeriodId::FiscalYear(year), Some(reported)) = (&current_period, reported_year(&data))
            && reported != *year
        {
            warn!(ticker, registered = year, reported, "Report fiscal year differs from registry");
        }

        let mut current = RawStatement::new(ticker, current_period.clone(), current_end);
        current.scale = scale;
        current.currency.clone_from(&currency);

        let previous_period = current_period.previous_comparable();
        let mut previous = previous_period.as_ref().and_then(|period| {
            let end = current_end
                .with_year(current_end.year() - 1)
                .or_else(|| period.nominal_end())?;
            let mut raw = RawStatement::new(ticker, period.clone(), end);
            raw.scale = scale;
            raw.currency.clone_from(&currency);
            Some(raw)
        });

        for (key, value) in &data {
            let value = match value {
                Value::Number(n) => n.as_f64().map(RawValue::Number),
                Value::String(s) => Some(RawValue::Text(s.clone())),
                _ => None,
            };
            let Some(value) = value else { continue };
            if let Some(label) = key.strip_suffix("_cur") {
                current.push(label, value);
            } else if let Some(label) = key.strip_suffix("_prev")
                && let Some(previous) = previous.as_mut()
            {
                previous.push(label, value);
            }
        }

        let mut statements = vec![normalize::normalize(&current, DataSource::AiPdf)?];
        if let Some(previous) = previous {
            match normalize::normalize(&previous, DataSource::AiPdf) {
                Ok(statement) if !statement.is_empty() => statements.push(statement),
                Ok(_) => {}
                Err(e) => warn!(ticker, error = %e, "Previous-year column not usable"),
            }
        }
        Ok(statements)
    }
}

fn reported_year(data: &Map<String, Value>) -> Option<i32> {
    let current = data.get("fiscal_years")?.get("current")?;
    match current {
        Value::String(s) => s.trim().get(..4)?.parse().ok(),
        Value::Number(n) => n.as_i64().and_then(|y| i32::try_from(y).ok()),
        _ => None,
    }
}

#[async_trait]
impl StatementSource for AiPdfAdapter {
    fn kind(&self) -> DataSource {
        DataSource::AiPdf
    }

    async fn fetch(
        &self,
        ticker: &str,
        period: &PeriodId,
        _options: &FetchOptions,
    ) -> std::result::Result<Vec<FinancialStatement>, AdapterFailure> {
        let (entry, column) = self.registry.lookup(ticker, period).ok_or_else(|| {
            AdapterFailure::NotRegistered {
                ticker: ticker.to_string(),
                period: period.clone(),
            }
        })?;
        debug!(ticker, %period, url = %entry.url, ?column, "Extracting report");

        let reply = self.extractor.extract(ticker, &entry.url).await?;
        let statements = self.parse_reply(ticker, entry, &reply)?;
        if !statements.iter().any(|s| &s.period_id == period) {
            return Err(AdapterFailure::PeriodNotReported(period.clone()));
        }
        Ok(statements)
    }
}
