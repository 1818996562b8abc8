#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fscore/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod cache;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod sources;
pub mod statement;

pub use cache::{CacheStats, CacheStore, MemoryStore, SqliteStore, StatementCache};
pub use error::{DataError, Result};
pub use pipeline::{PipelineConfig, Resolution, ResolvedPeriod, SourcePipeline, SourcePipelineBuilder};
pub use sources::{
    AdapterFailure, AttemptOutcome, DEFAULT_LOOKBACK, FetchOptions, SourceAttempt, StatementSource,
};
pub use statement::{
    CanonicalField, Confidence, DataSource, FinancialStatement, PeriodId, PeriodKind, Scale,
};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
