//! Error types for scoring.

use chrono::NaiveDate;
use thiserror::Error;

/// Result type for scoring operations.
pub type Result<T> = std::result::Result<T, ScoreError>;

/// Errors that can occur while pairing statements for scoring.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScoreError {
    /// The two statements belong to different tickers
    #[error("Cannot compare {current} with {prior}")]
    TickerMismatch {
        /// Ticker of the current statement
        current: String,
        /// Ticker of the prior statement
        prior: String,
    },

    /// The current statement does not end after the prior one
    #[error("Current period ending {current} does not follow prior period ending {prior}")]
    NonIncreasingPeriods {
        /// End of the current period
        current: NaiveDate,
        /// End of the prior period
        prior: NaiveDate,
    },

    /// Trend scoring needs at least two statements
    #[error("At least 2 statements required, got {0}")]
    TooFewStatements(usize),

    /// No two resolved statements are consecutive comparable periods
    #[error("No consecutive comparable periods for {0}")]
    NoComparablePair(String),
}
