//! Canonical financial statement model.

use crate::error::{DataError, Result};
use chrono::{Datelike, NaiveDate};
use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Origin of a financial statement.
///
/// The declaration order is the resolution priority: AI-parsed reports first,
/// market data last.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    /// Figures extracted from a published report by an AI text-extraction call
    #[display("ai_pdf")]
    AiPdf,
    /// Figures scraped from a rendered financial-data page
    #[display("web_scrape")]
    WebScrape,
    /// Standard line items from a generic market-data provider
    #[display("market_data")]
    MarketData,
}

impl DataSource {
    /// All sources in resolution priority order.
    pub const PRIORITY: [Self; 3] = [Self::AiPdf, Self::WebScrape, Self::MarketData];

    /// Confidence tier implied by this source.
    pub const fn confidence(self) -> Confidence {
        match self {
            Self::AiPdf => Confidence::High,
            Self::WebScrape => Confidence::Medium,
            Self::MarketData => Confidence::Low,
        }
    }

    /// Convert to database string representation.
    pub const fn to_db_str(self) -> &'static str {
        match self {
            Self::AiPdf => "ai_pdf",
            Self::WebScrape => "web_scrape",
            Self::MarketData => "market_data",
        }
    }

    /// Parse from database string representation.
    pub fn from_db_str(s: &str) -> Result<Self> {
        match s {
            "ai_pdf" => Ok(Self::AiPdf),
            "web_scrape" => Ok(Self::WebScrape),
            "market_data" => Ok(Self::MarketData),
            _ => Err(DataError::Parse(format!("Invalid data source: {}", s))),
        }
    }
}

/// Reliability tier of a statement. Ordered `Low < Medium < High`.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    /// Broad coverage, least trustworthy
    #[display("low")]
    Low,
    /// Scraped figures
    #[display("medium")]
    Medium,
    /// Figures read from the published report
    #[display("high")]
    High,
}

impl FromStr for Confidence {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            other => Err(DataError::Parse(format!("Invalid confidence: {}", other))),
        }
    }
}

/// Unit multiplier shared by every figure in a statement.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Scale {
    /// Figures are stated as-is
    #[default]
    Units,
    /// Figures are in thousands
    Thousands,
    /// Figures are in millions
    Millions,
    /// Figures are in billions
    Billions,
}

impl Scale {
    /// Multiplier that converts a figure in this scale to plain units.
    pub const fn multiplier(self) -> f64 {
        match self {
            Self::Units => 1.0,
            Self::Thousands => 1e3,
            Self::Millions => 1e6,
            Self::Billions => 1e9,
        }
    }

    /// Convert `value` expressed in `from` into this scale.
    pub fn convert(self, value: f64, from: Self) -> f64 {
        if self == from {
            value
        } else {
            value * from.multiplier() / self.multiplier()
        }
    }

    /// Parse a unit label such as `"millions"`, `"MSEK"`, `"tkr"` or `"bn"`.
    ///
    /// Returns `None` for labels that carry no scale information.
    pub fn from_label(label: &str) -> Option<Self> {
        let label = label.trim().to_lowercase();
        match label.as_str() {
            "units" | "unit" | "actual" | "ones" => Some(Self::Units),
            "thousands" | "thousand" | "k" | "t" | "tkr" | "tsek" | "ksek" | "tusd" | "teur"
            | "tnok" | "tdkk" => Some(Self::Thousands),
            "millions" | "million" | "m" | "mn" | "mln" | "mm" | "mkr" | "msek" | "musd"
            | "meur" | "mnok" | "mdkk" => Some(Self::Millions),
            "billions" | "billion" | "b" | "bn" | "mdkr" | "mdr" | "bsek" | "busd" | "beur" => {
                Some(Self::Billions)
            }
            _ => None,
        }
    }
}

/// Whether periods are compared year over year on annual or quarterly figures.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodKind {
    /// Fiscal years
    #[default]
    Annual,
    /// Fiscal quarters, each compared with the same quarter a year earlier
    Quarterly,
}

impl PeriodKind {
    /// The `count` most recent comparable periods as of `as_of`, newest first.
    ///
    /// Annual windows start at the last completed fiscal year
    /// (`as_of.year() - 1`). Quarterly windows start at the last completed
    /// calendar quarter and step back one year at a time.
    pub fn default_window(self, as_of: NaiveDate, count: usize) -> Vec<PeriodId> {
        let mut periods = Vec::with_capacity(count);
        let mut next = match self {
            Self::Annual => PeriodId::FiscalYear(as_of.year() - 1),
            Self::Quarterly => {
                let current = (as_of.month0() / 3) as u8 + 1;
                if current == 1 {
                    PeriodId::Quarter { quarter: 4, year: as_of.year() - 1 }
                } else {
                    PeriodId::Quarter { quarter: current - 1, year: as_of.year() }
                }
            }
        };
        for _ in 0..count {
            periods.push(next.clone());
            match next.previous_comparable() {
                Some(prev) => next = prev,
                None => break,
            }
        }
        periods
    }
}

/// Identifier of a fiscal period: `TTM`, `FY2024` or `Q2-2025`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum PeriodId {
    /// Trailing twelve months
    Ttm,
    /// A full fiscal year, labelled by the calendar year it ends in
    FiscalYear(i32),
    /// A fiscal quarter
    Quarter {
        /// Quarter number, 1-4
        quarter: u8,
        /// Year the quarter ends in
        year: i32,
    },
}

impl PeriodId {
    /// Annual or quarterly.
    pub const fn kind(&self) -> PeriodKind {
        match self {
            Self::Quarter { .. } => PeriodKind::Quarterly,
            Self::Ttm | Self::FiscalYear(_) => PeriodKind::Annual,
        }
    }

    /// The same period one year earlier. TTM has no fixed predecessor.
    pub const fn previous_comparable(&self) -> Option<Self> {
        match self {
            Self::Ttm => None,
            Self::FiscalYear(year) => Some(Self::FiscalYear(*year - 1)),
            Self::Quarter { quarter, year } => Some(Self::Quarter {
                quarter: *quarter,
                year: *year - 1,
            }),
        }
    }

    /// Calendar end date assumed when a source does not report one.
    pub fn nominal_end(&self) -> Option<NaiveDate> {
        match self {
            Self::Ttm => None,
            Self::FiscalYear(year) => NaiveDate::from_ymd_opt(*year, 12, 31),
            Self::Quarter { quarter, year } => {
                let (month, day) = match quarter {
                    1 => (3, 31),
                    2 => (6, 30),
                    3 => (9, 30),
                    _ => (12, 31),
                };
                NaiveDate::from_ymd_opt(*year, month, day)
            }
        }
    }

    /// Period that a statement ending on `date` covers.
    pub fn from_end_date(date: NaiveDate, kind: PeriodKind) -> Self {
        match kind {
            PeriodKind::Annual => Self::FiscalYear(date.year()),
            PeriodKind::Quarterly => Self::Quarter {
                quarter: (date.month0() / 3) as u8 + 1,
                year: date.year(),
            },
        }
    }
}

impl fmt::Display for PeriodId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ttm => write!(f, "TTM"),
            Self::FiscalYear(year) => write!(f, "FY{}", year),
            Self::Quarter { quarter, year } => write!(f, "Q{}-{}", quarter, year),
        }
    }
}

impl FromStr for PeriodId {
    type Err = DataError;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_ascii_uppercase();
        let invalid = || DataError::Parse(format!("Invalid period id: {}", s));

        if s == "TTM" {
            return Ok(Self::Ttm);
        }
        if let Some(year) = s.strip_prefix("FY") {
            return year.parse().map(Self::FiscalYear).map_err(|_| invalid());
        }
        if let Some(rest) = s.strip_prefix('Q')
            && let Some((quarter, year)) = rest.split_once('-')
        {
            let quarter: u8 = quarter.parse().map_err(|_| invalid())?;
            let year: i32 = year.parse().map_err(|_| invalid())?;
            if (1..=4).contains(&quarter) {
                return Ok(Self::Quarter { quarter, year });
            }
        }
        Err(invalid())
    }
}

impl TryFrom<String> for PeriodId {
    type Error = DataError;

    fn try_from(value: String) -> Result<Self> {
        value.parse()
    }
}

impl From<PeriodId> for String {
    fn from(value: PeriodId) -> Self {
        value.to_string()
    }
}

/// Canonical statement fields required by the nine F-Score tests.
#[derive(
    Debug, Display, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum CanonicalField {
    /// Net income for the period
    #[display("net_income")]
    NetIncome,
    /// Cash flow from operating activities
    #[display("operating_cash_flow")]
    OperatingCashFlow,
    /// Total assets at period end
    #[display("total_assets")]
    TotalAssets,
    /// Total debt, or long-term debt as a leverage proxy
    #[display("total_debt")]
    TotalDebt,
    /// Current assets at period end
    #[display("current_assets")]
    CurrentAssets,
    /// Current liabilities at period end
    #[display("current_liabilities")]
    CurrentLiabilities,
    /// Shares outstanding
    #[display("shares_outstanding")]
    SharesOutstanding,
    /// Revenue for the period
    #[display("revenue")]
    Revenue,
    /// Gross profit for the period
    #[display("gross_profit")]
    GrossProfit,
}

impl CanonicalField {
    /// Every canonical field, which is also the minimum set the nine tests need.
    pub const ALL: [Self; 9] = [
        Self::NetIncome,
        Self::OperatingCashFlow,
        Self::TotalAssets,
        Self::TotalDebt,
        Self::CurrentAssets,
        Self::CurrentLiabilities,
        Self::SharesOutstanding,
        Self::Revenue,
        Self::GrossProfit,
    ];
}

/// One fiscal period's normalized figures for one ticker.
///
/// Absent figures are `None`; a reported zero is `Some(0.0)`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialStatement {
    /// Ticker symbol
    pub ticker: String,
    /// Fiscal period
    pub period_id: PeriodId,
    /// Last day of the period
    pub period_end_date: NaiveDate,
    /// Source that supplied the statement (highest-priority contributor when merged)
    pub source: DataSource,
    /// Reliability tier
    pub confidence: Confidence,
    /// ISO currency code of the monetary figures, when known
    pub currency: Option<String>,
    /// Unit multiplier of every figure
    pub scale: Scale,

    // Income Statement
    /// Net income
    pub net_income: Option<f64>,
    /// Revenue
    pub revenue: Option<f64>,
    /// Gross profit
    pub gross_profit: Option<f64>,

    // Cash Flow
    /// Operating cash flow
    pub operating_cash_flow: Option<f64>,

    // Balance Sheet
    /// Total assets
    pub total_assets: Option<f64>,
    /// Total debt (or long-term debt proxy)
    pub total_debt: Option<f64>,
    /// Current assets
    pub current_assets: Option<f64>,
    /// Current liabilities
    pub current_liabilities: Option<f64>,

    // Shares
    /// Shares outstanding
    pub shares_outstanding: Option<f64>,

    /// Source of each present field
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub field_sources: BTreeMap<CanonicalField, DataSource>,

    /// Problems met while resolving this statement, such as a source whose
    /// labels could not be mapped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

impl FinancialStatement {
    /// Create a statement with no figures.
    pub fn new(
        ticker: impl Into<String>,
        period_id: PeriodId,
        period_end_date: NaiveDate,
        source: DataSource,
    ) -> Self {
        Self {
            ticker: ticker.into(),
            period_id,
            period_end_date,
            source,
            confidence: source.confidence(),
            currency: None,
            scale: Scale::Units,
            net_income: None,
            revenue: None,
            gross_profit: None,
            operating_cash_flow: None,
            total_assets: None,
            total_debt: None,
            current_assets: None,
            current_liabilities: None,
            shares_outstanding: None,
            field_sources: BTreeMap::new(),
            warnings: Vec::new(),
        }
    }

    /// Value of a canonical field.
    pub const fn get(&self, field: CanonicalField) -> Option<f64> {
        match field {
            CanonicalField::NetIncome => self.net_income,
            CanonicalField::OperatingCashFlow => self.operating_cash_flow,
            CanonicalField::TotalAssets => self.total_assets,
            CanonicalField::TotalDebt => self.total_debt,
            CanonicalField::CurrentAssets => self.current_assets,
            CanonicalField::CurrentLiabilities => self.current_liabilities,
            CanonicalField::SharesOutstanding => self.shares_outstanding,
            CanonicalField::Revenue => self.revenue,
            CanonicalField::GrossProfit => self.gross_profit,
        }
    }

    /// Set a canonical field and record this statement's source as its origin.
    pub fn set(&mut self, field: CanonicalField, value: Option<f64>) {
        let slot = match field {
            CanonicalField::NetIncome => &mut self.net_income,
            CanonicalField::OperatingCashFlow => &mut self.operating_cash_flow,
            CanonicalField::TotalAssets => &mut self.total_assets,
            CanonicalField::TotalDebt => &mut self.total_debt,
            CanonicalField::CurrentAssets => &mut self.current_assets,
            CanonicalField::CurrentLiabilities => &mut self.current_liabilities,
            CanonicalField::SharesOutstanding => &mut self.shares_outstanding,
            CanonicalField::Revenue => &mut self.revenue,
            CanonicalField::GrossProfit => &mut self.gross_profit,
        };
        *slot = value;
        if value.is_some() {
            self.field_sources.insert(field, self.source);
        } else {
            self.field_sources.remove(&field);
        }
    }

    /// Canonical fields with a value.
    pub fn present_fields(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_some())
            .collect()
    }

    /// Canonical fields without a value.
    pub fn missing_fields(&self) -> Vec<CanonicalField> {
        CanonicalField::ALL
            .into_iter()
            .filter(|f| self.get(*f).is_none())
            .collect()
    }

    /// Whether every field the nine tests need is present.
    pub fn is_complete(&self) -> bool {
        CanonicalField::ALL.iter().all(|f| self.get(*f).is_some())
    }

    /// Whether no field is present.
    pub fn is_empty(&self) -> bool {
        CanonicalField::ALL.iter().all(|f| self.get(*f).is_none())
    }

    /// The same statement with every figure expressed in `scale`.
    pub fn rescaled(mut self, scale: Scale) -> Self {
        if self.scale != scale {
            let from = self.scale;
            for value in [
                &mut self.net_income,
                &mut self.revenue,
                &mut self.gross_profit,
                &mut self.operating_cash_flow,
                &mut self.total_assets,
                &mut self.total_debt,
                &mut self.current_assets,
                &mut self.current_liabilities,
                &mut self.shares_outstanding,
            ]
            .into_iter()
            .flatten()
            {
                *value = scale.convert(*value, from);
            }
            self.scale = scale;
        }
        self
    }

    /// Fill the gaps in this statement from a lower-priority statement for the same period.
    ///
    /// Fields present here are kept; missing ones are taken from `lower`,
    /// converted into this statement's scale. The result keeps this statement's
    /// source and period end, and takes the lower of the two confidence tiers
    /// when `lower` contributed anything.
    pub fn merge_with(&self, lower: &Self) -> Result<Self> {
        if self.ticker != lower.ticker || self.period_id != lower.period_id {
            return Err(DataError::IncompatibleStatements(format!(
                "{} {} cannot be merged with {} {}",
                self.ticker, self.period_id, lower.ticker, lower.period_id
            )));
        }
        if let (Some(a), Some(b)) = (&self.currency, &lower.currency)
            && !a.eq_ignore_ascii_case(b)
        {
            return Err(DataError::IncompatibleStatements(format!(
                "{} {} is reported in {} by {} and {} by {}",
                self.ticker, self.period_id, a, self.source, b, lower.source
            )));
        }

        let mut merged = self.clone();
        let mut contributed = false;
        for field in CanonicalField::ALL {
            if merged.get(field).is_some() {
                continue;
            }
            if let Some(value) = lower.get(field) {
                let origin = lower.field_sources.get(&field).copied().unwrap_or(lower.source);
                merged.set(field, Some(self.scale.convert(value, lower.scale)));
                merged.field_sources.insert(field, origin);
                contributed = true;
            }
        }
        if contributed {
            merged.confidence = merged.confidence.min(lower.confidence);
            if merged.currency.is_none() {
                merged.currency.clone_from(&lower.currency);
            }
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[rstest]
    #[case("TTM", PeriodId::Ttm)]
    #[case("FY2024", PeriodId::FiscalYear(2024))]
    #[case("fy2019", PeriodId::FiscalYear(2019))]
    #[case("Q2-2025", PeriodId::Quarter { quarter: 2, year: 2025 })]
    fn test_period_id_parse(#[case] text: &str, #[case] expected: PeriodId) {
        let parsed: PeriodId = text.parse().unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(parsed.to_string().parse::<PeriodId>().unwrap(), expected);
    }

    #[rstest]
    #[case("Q5-2024")]
    #[case("FY")]
    #[case("2024")]
    #[case("Q2/2024")]
    fn test_period_id_rejects_garbage(#[case] text: &str) {
        assert!(text.parse::<PeriodId>().is_err());
    }

    #[test]
    fn test_period_id_serde_as_string() {
        let json = serde_json::to_string(&PeriodId::Quarter { quarter: 3, year: 2024 }).unwrap();
        assert_eq!(json, "\"Q3-2024\"");
        let back: PeriodId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, PeriodId::Quarter { quarter: 3, year: 2024 });
    }

    #[test]
    fn test_default_windows() {
        let as_of = date(2025, 5, 10);
        assert_eq!(
            PeriodKind::Annual.default_window(as_of, 3),
            vec![
                PeriodId::FiscalYear(2024),
                PeriodId::FiscalYear(2023),
                PeriodId::FiscalYear(2022)
            ]
        );
        assert_eq!(
            PeriodKind::Quarterly.default_window(as_of, 2),
            vec![
                PeriodId::Quarter { quarter: 1, year: 2025 },
                PeriodId::Quarter { quarter: 1, year: 2024 },
            ]
        );
        assert_eq!(
            PeriodKind::Quarterly.default_window(date(2025, 2, 1), 1),
            vec![PeriodId::Quarter { quarter: 4, year: 2024 }]
        );
    }

    #[test]
    fn test_from_end_date() {
        assert_eq!(
            PeriodId::from_end_date(date(2024, 9, 28), PeriodKind::Annual),
            PeriodId::FiscalYear(2024)
        );
        assert_eq!(
            PeriodId::from_end_date(date(2024, 9, 28), PeriodKind::Quarterly),
            PeriodId::Quarter { quarter: 3, year: 2024 }
        );
    }

    #[test]
    fn test_confidence_ordering_follows_priority() {
        assert!(Confidence::Low < Confidence::Medium);
        assert!(Confidence::Medium < Confidence::High);
        let tiers: Vec<_> = DataSource::PRIORITY.iter().map(|s| s.confidence()).collect();
        assert_eq!(tiers, vec![Confidence::High, Confidence::Medium, Confidence::Low]);
    }

    #[test]
    fn test_zero_is_not_absent() {
        let mut stmt =
            FinancialStatement::new("X", PeriodId::FiscalYear(2024), date(2024, 12, 31), DataSource::WebScrape);
        stmt.set(CanonicalField::TotalDebt, Some(0.0));
        assert_eq!(stmt.present_fields(), vec![CanonicalField::TotalDebt]);
        assert!(!stmt.is_empty());
    }

    #[test]
    fn test_merge_prefers_higher_priority_fields() {
        let period = PeriodId::FiscalYear(2024);
        let mut ai = FinancialStatement::new("SAAB-B.ST", period.clone(), date(2024, 12, 31), DataSource::AiPdf);
        ai.scale = Scale::Millions;
        ai.set(CanonicalField::NetIncome, Some(4_000.0));
        ai.set(CanonicalField::TotalAssets, Some(100_000.0));

        let mut market = FinancialStatement::new("SAAB-B.ST", period, date(2024, 12, 31), DataSource::MarketData);
        market.set(CanonicalField::NetIncome, Some(1.0));
        market.set(CanonicalField::Revenue, Some(63_751_000_000.0));

        let merged = ai.merge_with(&market).unwrap();
        assert_eq!(merged.net_income, Some(4_000.0));
        assert_eq!(merged.revenue, Some(63_751.0));
        assert_eq!(merged.source, DataSource::AiPdf);
        assert_eq!(merged.confidence, Confidence::Low);
        assert_eq!(merged.field_sources[&CanonicalField::NetIncome], DataSource::AiPdf);
        assert_eq!(merged.field_sources[&CanonicalField::Revenue], DataSource::MarketData);
    }

    #[test]
    fn test_merge_rejects_other_period() {
        let a = FinancialStatement::new("X", PeriodId::FiscalYear(2024), date(2024, 12, 31), DataSource::AiPdf);
        let b = FinancialStatement::new("X", PeriodId::FiscalYear(2023), date(2023, 12, 31), DataSource::MarketData);
        assert!(a.merge_with(&b).is_err());
    }

    #[test]
    fn test_merge_rejects_currency_mismatch() {
        let period = PeriodId::FiscalYear(2024);
        let mut a = FinancialStatement::new("X", period.clone(), date(2024, 12, 31), DataSource::AiPdf);
        a.currency = Some("SEK".to_string());
        let mut b = FinancialStatement::new("X", period, date(2024, 12, 31), DataSource::MarketData);
        b.currency = Some("USD".to_string());
        b.set(CanonicalField::Revenue, Some(1.0));
        assert!(a.merge_with(&b).is_err());
    }

    #[test]
    fn test_rescaled_converts_present_figures() {
        let mut stmt = FinancialStatement::new("X", PeriodId::FiscalYear(2024), date(2024, 12, 31), DataSource::AiPdf);
        stmt.scale = Scale::Thousands;
        stmt.set(CanonicalField::Revenue, Some(2_500.0));
        let stmt = stmt.rescaled(Scale::Millions);
        assert_eq!(stmt.scale, Scale::Millions);
        assert_eq!(stmt.revenue, Some(2.5));
        assert_eq!(stmt.net_income, None);
        assert_eq!(stmt.field_sources[&CanonicalField::Revenue], DataSource::AiPdf);
    }

    #[test]
    fn test_db_str_round_trip() {
        for source in DataSource::PRIORITY {
            assert_eq!(DataSource::from_db_str(source.to_db_str()).unwrap(), source);
            assert_eq!(source.to_string(), source.to_db_str());
        }
        assert!(DataSource::from_db_str("yahoo").is_err());
    }
}
