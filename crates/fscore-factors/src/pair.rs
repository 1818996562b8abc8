//! Comparable statement pairs.

use crate::error::{Result, ScoreError};
use fscore_data::{FinancialStatement, PeriodId};
use serde::Serialize;

/// Two statements of one company, `current` ending strictly after `prior`.
///
/// Both statements are held in the current statement's scale so that
/// cross-period comparisons of absolute figures (share counts) are sound.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredStatementPair {
    current: FinancialStatement,
    prior: FinancialStatement,
}

impl ScoredStatementPair {
    /// Pair two statements.
    ///
    /// # Arguments
    /// * `current` - The later period
    /// * `prior` - The comparable earlier period
    ///
    /// # Errors
    /// [`ScoreError::TickerMismatch`] if the tickers differ and
    /// [`ScoreError::NonIncreasingPeriods`] unless `current` ends after `prior`.
    pub fn new(current: FinancialStatement, prior: FinancialStatement) -> Result<Self> {
        if current.ticker != prior.ticker {
            return Err(ScoreError::TickerMismatch {
                current: current.ticker,
                prior: prior.ticker,
            });
        }
        if current.period_end_date <= prior.period_end_date {
            return Err(ScoreError::NonIncreasingPeriods {
                current: current.period_end_date,
                prior: prior.period_end_date,
            });
        }
        let prior = prior.rescaled(current.scale);
        Ok(Self { current, prior })
    }

    /// The later statement.
    pub const fn current(&self) -> &FinancialStatement {
        &self.current
    }

    /// The earlier statement.
    pub const fn prior(&self) -> &FinancialStatement {
        &self.prior
    }

    /// Whether `prior` is the period directly comparable to `current`: the
    /// same period one year earlier, or for TTM the fiscal year ending within
    /// the preceding year.
    pub fn is_consecutive(&self) -> bool {
        match self.current.period_id.previous_comparable() {
            Some(expected) => expected == self.prior.period_id,
            None => {
                matches!(self.prior.period_id, PeriodId::FiscalYear(_))
                    && (self.current.period_end_date - self.prior.period_end_date).num_days() <= 366
            }
        }
    }

    /// Ticker shared by both statements.
    pub fn ticker(&self) -> &str {
        &self.current.ticker
    }

    /// Split into `(current, prior)`.
    pub fn into_parts(self) -> (FinancialStatement, FinancialStatement) {
        (self.current, self.prior)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::NaiveDate;
    use fscore_data::{CanonicalField, DataSource, Scale};
    use rstest::rstest;

    fn statement(ticker: &str, year: i32) -> FinancialStatement {
        FinancialStatement::new(
            ticker,
            PeriodId::FiscalYear(year),
            NaiveDate::from_ymd_opt(year, 12, 31).unwrap(),
            DataSource::WebScrape,
        )
    }

    #[test]
    fn test_valid_pair() {
        let pair = ScoredStatementPair::new(statement("ERIC-B.ST", 2024), statement("ERIC-B.ST", 2023))
            .unwrap();
        assert_eq!(pair.ticker(), "ERIC-B.ST");
        assert_eq!(pair.current().period_id, PeriodId::FiscalYear(2024));
        assert_eq!(pair.prior().period_id, PeriodId::FiscalYear(2023));
    }

    #[test]
    fn test_ticker_mismatch() {
        let err = ScoredStatementPair::new(statement("ERIC-B.ST", 2024), statement("VOLV-B.ST", 2023))
            .unwrap_err();
        assert!(matches!(err, ScoreError::TickerMismatch { .. }));
    }

    #[test]
    fn test_periods_must_increase() {
        let err = ScoredStatementPair::new(statement("ERIC-B.ST", 2023), statement("ERIC-B.ST", 2024))
            .unwrap_err();
        assert!(matches!(err, ScoreError::NonIncreasingPeriods { .. }));

        let err = ScoredStatementPair::new(statement("ERIC-B.ST", 2024), statement("ERIC-B.ST", 2024))
            .unwrap_err();
        assert!(matches!(err, ScoreError::NonIncreasingPeriods { .. }));
    }

    #[test]
    fn test_prior_is_rescaled() {
        let mut current = statement("ERIC-B.ST", 2024);
        current.scale = Scale::Millions;
        current.shares_outstanding = Some(3_334.0);
        let mut prior = statement("ERIC-B.ST", 2023);
        prior.scale = Scale::Thousands;
        prior.set(CanonicalField::SharesOutstanding, Some(3_330_000.0));
        prior.field_sources.insert(CanonicalField::SharesOutstanding, DataSource::MarketData);

        let pair = ScoredStatementPair::new(current, prior).unwrap();
        assert_eq!(pair.prior().scale, Scale::Millions);
        assert_relative_eq!(pair.prior().shares_outstanding.unwrap(), 3_330.0);
        assert_eq!(
            pair.prior().field_sources.get(&CanonicalField::SharesOutstanding),
            Some(&DataSource::MarketData)
        );
    }

    fn ttm(ticker: &str, end: NaiveDate) -> FinancialStatement {
        FinancialStatement::new(ticker, PeriodId::Ttm, end, DataSource::MarketData)
    }

    #[rstest]
    #[case(2024, 2023, true)]
    #[case(2024, 2022, false)]
    #[case(2021, 2018, false)]
    fn test_fiscal_years_are_consecutive(#[case] current: i32, #[case] prior: i32, #[case] expected: bool) {
        let pair = ScoredStatementPair::new(statement("ERIC-B.ST", current), statement("ERIC-B.ST", prior))
            .unwrap();
        assert_eq!(pair.is_consecutive(), expected);
    }

    #[test]
    fn test_ttm_follows_latest_fiscal_year() {
        let end = NaiveDate::from_ymd_opt(2025, 6, 30).unwrap();
        let pair = ScoredStatementPair::new(ttm("ERIC-B.ST", end), statement("ERIC-B.ST", 2024)).unwrap();
        assert!(pair.is_consecutive());

        let pair = ScoredStatementPair::new(ttm("ERIC-B.ST", end), statement("ERIC-B.ST", 2023)).unwrap();
        assert!(!pair.is_consecutive());
    }

    #[test]
    fn test_quarters_compare_year_over_year() {
        let quarter = |quarter, year, month| {
            FinancialStatement::new(
                "ERIC-B.ST",
                PeriodId::Quarter { quarter, year },
                NaiveDate::from_ymd_opt(year, month, 30).unwrap(),
                DataSource::WebScrape,
            )
        };
        let pair = ScoredStatementPair::new(quarter(2, 2025, 6), quarter(2, 2024, 6)).unwrap();
        assert!(pair.is_consecutive());
        let pair = ScoredStatementPair::new(quarter(2, 2025, 6), quarter(1, 2025, 4)).unwrap();
        assert!(!pair.is_consecutive());
    }
}
