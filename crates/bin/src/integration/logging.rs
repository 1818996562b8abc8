//! Logging setup.
//!
//! Logs go to stderr so that report JSON on stdout stays machine-readable.

use tracing_subscriber::EnvFilter;
use tracing_subscriber::prelude::*;

/// Filter used when `RUST_LOG` is unset.
const DEFAULT_FILTER: &str = "fscore=info,fscore_data=info";

/// Noisy transport crates kept at `warn`.
const NOISY_MODULES: &[&str] = &["hyper", "hyper_util", "reqwest", "h2", "rustls", "html5ever", "selectors"];

fn build_filter() -> EnvFilter {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return filter;
    }
    let mut directives = String::from(DEFAULT_FILTER);
    for module in NOISY_MODULES {
        directives.push_str(&format!(",{module}=warn"));
    }
    EnvFilter::new(directives)
}

/// Install the global subscriber.
///
/// # Arguments
/// * `json` - Emit one JSON object per event instead of human-readable lines
pub(crate) fn init(json: bool) {
    let subscriber = tracing_subscriber::registry().with(build_filter());
    if json {
        let layer = tracing_subscriber::fmt::layer()
            .json()
            .with_target(true)
            .with_writer(std::io::stderr);
        let _ = subscriber.with(layer).try_init();
    } else {
        let layer = tracing_subscriber::fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr);
        let _ = subscriber.with(layer).try_init();
    }
}
