//! Error types for data operations.

use crate::sources::SourceAttempt;
use chrono::NaiveDate;
use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid ticker
    #[error("Invalid ticker: {0:?}")]
    InvalidTicker(String),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Two statements cannot be combined
    #[error("Incompatible statements: {0}")]
    IncompatibleStatements(String),

    /// Two resolved periods end on the same date, so neither can be called current
    #[error("Periods {first} and {second} for {ticker} both end on {date}")]
    PeriodTie {
        /// Ticker being resolved
        ticker: String,
        /// First period id
        first: String,
        /// Second period id
        second: String,
        /// Shared period end date
        date: NaiveDate,
    },

    /// Fewer than two usable periods after full fallback and merge
    #[error("Insufficient history for {ticker}: {usable} usable period(s), at least 2 required")]
    InsufficientHistory {
        /// Ticker being resolved
        ticker: String,
        /// Number of periods that resolved to a complete statement
        usable: usize,
        /// Every source attempt made while resolving
        attempts: Vec<SourceAttempt>,
    },
}
