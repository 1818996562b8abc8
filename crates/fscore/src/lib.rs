#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/fscore/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod batch;
pub mod engine;
pub mod error;

// Re-export main types from sub-crates
pub use fscore_data as data;
pub use fscore_factors as factors;

pub use batch::{BatchOptions, BatchOutcome, SkippedTicker, TickerScores};
pub use engine::Engine;
pub use error::{EngineError, Result};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
