//! Normalization of raw source payloads into canonical statements.
//!
//! Every adapter emits a [`RawStatement`]: the labels and values exactly as the
//! source reported them. [`normalize`] maps those labels onto the canonical
//! fields through the alias table and converts text values to numbers.

pub mod aliases;
pub mod numeric;

use crate::statement::{CanonicalField, DataSource, FinancialStatement, PeriodId, Scale};
use aliases::AliasTarget;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// A value as it appeared in the source payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    /// Already numeric
    Number(f64),
    /// Text that still needs parsing
    Text(String),
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        Self::Number(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

/// Source-specific field map for one ticker and period.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RawStatement {
    /// Ticker symbol
    pub ticker: String,
    /// Fiscal period
    pub period_id: PeriodId,
    /// Last day of the period
    pub period_end_date: NaiveDate,
    /// ISO currency code, when the source states one
    pub currency: Option<String>,
    /// Scale of every figure unless a value carries its own suffix
    pub scale: Scale,
    /// Labels and values in source order
    pub fields: Vec<(String, RawValue)>,
}

impl RawStatement {
    /// Create an empty raw statement.
    pub fn new(ticker: impl Into<String>, period_id: PeriodId, period_end_date: NaiveDate) -> Self {
        Self {
            ticker: ticker.into(),
            period_id,
            period_end_date,
            currency: None,
            scale: Scale::Units,
            fields: Vec::new(),
        }
    }

    /// Append a labelled value.
    pub fn push(&mut self, label: impl Into<String>, value: impl Into<RawValue>) {
        self.fields.push((label.into(), value.into()));
    }
}

/// A payload none of whose labels matched a canonical field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizationFailure {
    /// Ticker symbol
    pub ticker: String,
    /// Fiscal period
    pub period_id: PeriodId,
    /// Labels that were present but not recognized
    pub unrecognized: Vec<String>,
}

impl fmt::Display for NormalizationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "no recognizable fields for {} {} (labels: {})",
            self.ticker,
            self.period_id,
            self.unrecognized.join(", ")
        )
    }
}

impl std::error::Error for NormalizationFailure {}

/// Map a raw payload onto a canonical statement.
///
/// An empty payload yields an empty statement. A non-empty payload with no
/// recognizable label is a [`NormalizationFailure`]. Values that do not parse
/// as numbers leave their field absent. When gross profit is not reported but
/// revenue and cost of revenue are, gross profit is derived from them.
pub fn normalize(
    raw: &RawStatement,
    source: DataSource,
) -> Result<FinancialStatement, NormalizationFailure> {
    let mut statement =
        FinancialStatement::new(&raw.ticker, raw.period_id.clone(), raw.period_end_date, source);
    statement.currency = raw.currency.as_ref().map(|c| c.to_ascii_uppercase());
    statement.scale = raw.scale;

    if raw.fields.is_empty() {
        return Ok(statement);
    }

    let mut best: HashMap<AliasTarget, (usize, Option<f64>)> = HashMap::new();
    let mut unrecognized = Vec::new();
    let mut recognized = false;

    for (label, value) in &raw.fields {
        let Some((target, rank)) = aliases::lookup(label) else {
            unrecognized.push(label.clone());
            continue;
        };
        recognized = true;
        let value = to_number(value, raw.scale);
        // An unparseable better alias never shadows a parsed worse one.
        match best.get(&target) {
            Some((best_rank, Some(_))) if value.is_none() || *best_rank <= rank => {}
            _ => {
                best.insert(target, (rank, value));
            }
        }
    }

    if !recognized {
        return Err(NormalizationFailure {
            ticker: raw.ticker.clone(),
            period_id: raw.period_id.clone(),
            unrecognized,
        });
    }

    let mut cost_of_revenue = None;
    for (target, (_, value)) in best {
        match target {
            AliasTarget::Field(field) => statement.set(field, value),
            AliasTarget::CostOfRevenue => cost_of_revenue = value,
        }
    }

    if statement.gross_profit.is_none()
        && let (Some(revenue), Some(cost)) = (statement.revenue, cost_of_revenue)
    {
        statement.set(CanonicalField::GrossProfit, Some(revenue - cost.abs()));
    }

    if !unrecognized.is_empty() {
        debug!(
            ticker = %raw.ticker,
            period = %raw.period_id,
            source = %source,
            ignored = unrecognized.len(),
            "Ignored unrecognized labels"
        );
    }

    Ok(statement)
}

fn to_number(value: &RawValue, scale: Scale) -> Option<f64> {
    match value {
        RawValue::Number(n) if n.is_finite() => Some(*n),
        RawValue::Number(_) => None,
        RawValue::Text(text) => {
            let (value, suffix_scale) = numeric::parse_amount(text)?;
            Some(suffix_scale.map_or(value, |from| scale.convert(value, from)))
        }
    }
}
