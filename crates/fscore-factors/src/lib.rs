#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fscore/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod pair;
pub mod piotroski;
pub mod registry;

pub use error::{Result, ScoreError};
pub use pair::ScoredStatementPair;
pub use piotroski::{FScoreCalculator, FScoreReport, LeverageMode, ScoreOptions, SourcesUsed, SubTestResult};
pub use registry::{SUB_TESTS, SubTestCategory, SubTestInfo, sub_test_info};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
