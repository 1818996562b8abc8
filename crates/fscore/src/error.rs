//! Error types for the engine.

use fscore_data::{DataError, SourceAttempt};
use fscore_factors::ScoreError;
use thiserror::Error;

/// Result type for engine operations.
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors that can occur while scoring a ticker.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Statement resolution failed
    #[error(transparent)]
    Data(#[from] DataError),

    /// Resolved statements could not be scored
    #[error(transparent)]
    Score(#[from] ScoreError),
}

impl EngineError {
    /// Source attempts recorded by the failed resolution, if any.
    pub fn attempts(&self) -> &[SourceAttempt] {
        match self {
            Self::Data(DataError::InsufficientHistory { attempts, .. }) => attempts,
            _ => &[],
        }
    }
}
