//! Piotroski F-Score
//!
//! Nine pass/fail tests over a [`ScoredStatementPair`]. A test whose inputs
//! are absent, or whose ratio has a zero denominator, fails. The score is the
//! number of passing tests.

use crate::error::{Result, ScoreError};
use crate::pair::ScoredStatementPair;
use crate::registry::SUB_TESTS;
use fscore_data::{DataSource, FinancialStatement};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// How test 5 measures leverage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LeverageMode {
    /// Compare `total_debt / total_assets`
    #[default]
    DebtToAssets,
    /// Compare `total_debt` directly
    AbsoluteDebt,
}

/// Configuration for the F-Score calculator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreOptions {
    /// Leverage measure for test 5 (default: debt to assets)
    pub leverage: LeverageMode,
    /// Relative share-count increase still treated as no dilution in test 7 (default: 0.0)
    pub share_change_threshold: f64,
}

impl Default for ScoreOptions {
    fn default() -> Self {
        Self {
            leverage: LeverageMode::DebtToAssets,
            share_change_threshold: 0.0,
        }
    }
}

/// Outcome of one of the nine tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubTestResult {
    /// Test number, 1 through 9
    pub test_id: u8,
    /// Short identifier
    pub name: &'static str,
    /// Whether the test passed
    pub passed: bool,
    /// Quantities the decision was based on; `None` when absent or undefined
    pub inputs_used: BTreeMap<String, Option<f64>>,
    /// Pass condition as evaluated
    pub formula_description: String,
}

/// Source of each statement in a scored pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SourcesUsed {
    /// Source of the current statement
    pub current: DataSource,
    /// Source of the prior statement
    pub prior: DataSource,
}

/// F-Score of one statement pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FScoreReport {
    /// Ticker symbol
    pub ticker: String,
    /// Statements the score was computed from
    pub statement_pair: ScoredStatementPair,
    /// The nine test outcomes in order
    pub sub_tests: Vec<SubTestResult>,
    /// Number of passing tests, 0 through 9
    pub score: u8,
    /// Source of each statement
    pub data_sources_used: SourcesUsed,
}

impl FScoreReport {
    /// Ids of the passing tests.
    pub fn passed_tests(&self) -> Vec<u8> {
        self.sub_tests.iter().filter(|t| t.passed).map(|t| t.test_id).collect()
    }

    /// Ids of the failing tests.
    pub fn failed_tests(&self) -> Vec<u8> {
        self.sub_tests.iter().filter(|t| !t.passed).map(|t| t.test_id).collect()
    }
}

/// Piotroski F-Score calculator
#[derive(Debug, Clone, Default)]
pub struct FScoreCalculator {
    options: ScoreOptions,
}

impl FScoreCalculator {
    /// Create a calculator with custom options.
    pub const fn with_options(options: ScoreOptions) -> Self {
        Self { options }
    }

    /// Options in effect.
    pub const fn options(&self) -> &ScoreOptions {
        &self.options
    }

    /// Score a statement pair.
    pub fn score(&self, pair: &ScoredStatementPair) -> FScoreReport {
        let cur = pair.current();
        let prev = pair.prior();

        let sub_tests = vec![
            roa_positive(cur),
            cfo_positive(cur),
            roa_improving(cur, prev),
            accruals(cur),
            leverage_declining(cur, prev, self.options.leverage),
            current_ratio_improving(cur, prev),
            no_dilution(cur, prev, self.options.share_change_threshold),
            gross_margin_improving(cur, prev),
            asset_turnover_improving(cur, prev),
        ];
        let score = sub_tests.iter().filter(|t| t.passed).count() as u8;

        FScoreReport {
            ticker: pair.ticker().to_string(),
            statement_pair: pair.clone(),
            sub_tests,
            score,
            data_sources_used: SourcesUsed {
                current: cur.source,
                prior: prev.source,
            },
        }
    }

    /// Score the most recent consecutive pair of `statements`.
    ///
    /// # Errors
    /// As for [`Self::score_trend`].
    pub fn score_latest(&self, statements: &[FinancialStatement]) -> Result<FScoreReport> {
        let pairs = consecutive_pairs(statements)?;
        let pair = pairs.first().ok_or_else(|| no_comparable_pair(statements))?;
        Ok(self.score(pair))
    }

    /// Score every adjacent pair of `statements`, newest pair first.
    ///
    /// Statements may be given in any order; they are sorted by period end.
    /// Neighbours that are not consecutive comparable periods (one year
    /// apart, or TTM and the latest fiscal year) are skipped, so a gap in the
    /// history yields fewer points.
    ///
    /// # Errors
    /// [`ScoreError::TooFewStatements`] for fewer than two statements,
    /// [`ScoreError::NoComparablePair`] when no neighbours are consecutive,
    /// and any error from pairing adjacent statements.
    pub fn score_trend(&self, statements: &[FinancialStatement]) -> Result<Vec<FScoreReport>> {
        let pairs = consecutive_pairs(statements)?;
        if pairs.is_empty() {
            return Err(no_comparable_pair(statements));
        }
        Ok(pairs.iter().map(|pair| self.score(pair)).collect())
    }
}

/// Consecutive neighbours of `statements` ordered by period end, newest first.
fn consecutive_pairs(statements: &[FinancialStatement]) -> Result<Vec<ScoredStatementPair>> {
    if statements.len() < 2 {
        return Err(ScoreError::TooFewStatements(statements.len()));
    }
    let mut ordered: Vec<&FinancialStatement> = statements.iter().collect();
    ordered.sort_by(|a, b| b.period_end_date.cmp(&a.period_end_date));

    let mut pairs = Vec::with_capacity(ordered.len() - 1);
    for w in ordered.windows(2) {
        let pair = ScoredStatementPair::new(w[0].clone(), w[1].clone())?;
        if pair.is_consecutive() {
            pairs.push(pair);
        }
    }
    Ok(pairs)
}

fn no_comparable_pair(statements: &[FinancialStatement]) -> ScoreError {
    ScoreError::NoComparablePair(statements.first().map(|s| s.ticker.clone()).unwrap_or_default())
}

/// `numerator / denominator`, undefined for an absent or zero denominator.
fn ratio(numerator: Option<f64>, denominator: Option<f64>) -> Option<f64> {
    match (numerator, denominator) {
        (Some(n), Some(d)) if d != 0.0 => Some(n / d),
        _ => None,
    }
}

fn delta(current: Option<f64>, prior: Option<f64>) -> Option<f64> {
    Some(current? - prior?)
}

fn result(test_id: u8, passed: bool, inputs: &[(&str, Option<f64>)], formula: String) -> SubTestResult {
    let name = SUB_TESTS[usize::from(test_id) - 1].name;
    SubTestResult {
        test_id,
        name,
        passed,
        inputs_used: inputs.iter().map(|(k, v)| ((*k).to_string(), *v)).collect(),
        formula_description: formula,
    }
}

fn formula(test_id: u8) -> String {
    SUB_TESTS[usize::from(test_id) - 1].formula.to_string()
}

fn roa_positive(cur: &FinancialStatement) -> SubTestResult {
    let roa = ratio(cur.net_income, cur.total_assets);
    result(
        1,
        roa.is_some_and(|r| r > 0.0),
        &[
            ("net_income", cur.net_income),
            ("total_assets", cur.total_assets),
            ("roa", roa),
        ],
        formula(1),
    )
}

fn cfo_positive(cur: &FinancialStatement) -> SubTestResult {
    result(
        2,
        cur.operating_cash_flow.is_some_and(|cfo| cfo > 0.0),
        &[("operating_cash_flow", cur.operating_cash_flow)],
        formula(2),
    )
}

fn roa_improving(cur: &FinancialStatement, prev: &FinancialStatement) -> SubTestResult {
    let roa_cur = ratio(cur.net_income, cur.total_assets);
    let roa_prev = ratio(prev.net_income, prev.total_assets);
    let change = delta(roa_cur, roa_prev);
    result(
        3,
        change.is_some_and(|d| d > 0.0),
        &[("roa_current", roa_cur), ("roa_prior", roa_prev), ("delta", change)],
        formula(3),
    )
}

fn accruals(cur: &FinancialStatement) -> SubTestResult {
    let passed = match (cur.operating_cash_flow, cur.net_income) {
        (Some(cfo), Some(ni)) => cfo > ni,
        _ => false,
    };
    result(
        4,
        passed,
        &[
            ("operating_cash_flow", cur.operating_cash_flow),
            ("net_income", cur.net_income),
        ],
        formula(4),
    )
}

fn leverage_declining(
    cur: &FinancialStatement,
    prev: &FinancialStatement,
    mode: LeverageMode,
) -> SubTestResult {
    match mode {
        LeverageMode::DebtToAssets => {
            let lev_cur = ratio(cur.total_debt, cur.total_assets);
            let lev_prev = ratio(prev.total_debt, prev.total_assets);
            let change = delta(lev_cur, lev_prev);
            result(
                5,
                change.is_some_and(|d| d < 0.0),
                &[
                    ("leverage_current", lev_cur),
                    ("leverage_prior", lev_prev),
                    ("delta", change),
                ],
                formula(5),
            )
        }
        LeverageMode::AbsoluteDebt => {
            let change = delta(cur.total_debt, prev.total_debt);
            result(
                5,
                change.is_some_and(|d| d < 0.0),
                &[
                    ("total_debt_current", cur.total_debt),
                    ("total_debt_prior", prev.total_debt),
                    ("delta", change),
                ],
                "total_debt(current) - total_debt(prior) < 0".to_string(),
            )
        }
    }
}

fn current_ratio_improving(cur: &FinancialStatement, prev: &FinancialStatement) -> SubTestResult {
    let cr_cur = ratio(cur.current_assets, cur.current_liabilities);
    let cr_prev = ratio(prev.current_assets, prev.current_liabilities);
    let change = delta(cr_cur, cr_prev);
    result(
        6,
        change.is_some_and(|d| d > 0.0),
        &[
            ("current_ratio_current", cr_cur),
            ("current_ratio_prior", cr_prev),
            ("delta", change),
        ],
        formula(6),
    )
}

fn no_dilution(cur: &FinancialStatement, prev: &FinancialStatement, threshold: f64) -> SubTestResult {
    let passed = match (cur.shares_outstanding, prev.shares_outstanding) {
        (Some(c), Some(p)) if threshold > 0.0 => c <= p * (1.0 + threshold),
        (Some(c), Some(p)) => c <= p,
        _ => false,
    };
    let description = if threshold > 0.0 {
        format!("shares_outstanding(current) <= shares_outstanding(prior) * {}", 1.0 + threshold)
    } else {
        formula(7)
    };
    result(
        7,
        passed,
        &[
            ("shares_current", cur.shares_outstanding),
            ("shares_prior", prev.shares_outstanding),
        ],
        description,
    )
}

fn gross_margin_improving(cur: &FinancialStatement, prev: &FinancialStatement) -> SubTestResult {
    let gm_cur = ratio(cur.gross_profit, cur.revenue);
    let gm_prev = ratio(prev.gross_profit, prev.revenue);
    let change = delta(gm_cur, gm_prev);
    result(
        8,
        change.is_some_and(|d| d > 0.0),
        &[
            ("gross_margin_current", gm_cur),
            ("gross_margin_prior", gm_prev),
            ("delta", change),
        ],
        formula(8),
    )
}

fn asset_turnover_improving(cur: &FinancialStatement, prev: &FinancialStatement) -> SubTestResult {
    let at_cur = ratio(cur.revenue, cur.total_assets);
    let at_prev = ratio(prev.revenue, prev.total_assets);
    let change = delta(at_cur, at_prev);
    result(
        9,
        change.is_some_and(|d| d > 0.0),
        &[
            ("asset_turnover_current", at_cur),
            ("asset_turnover_prior", at_prev),
            ("delta", change),
        ],
        formula(9),
    )
}
