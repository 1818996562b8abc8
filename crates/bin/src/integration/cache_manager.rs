//! Cache location for the CLI.
//!
//! The statement cache lives in a platform-specific cache directory unless
//! `FSCORE_CACHE_DIR` points elsewhere.

use fscore_data::StatementCache;
use fscore_data::error::DataError;
use std::path::PathBuf;

/// Environment variable overriding the cache directory.
pub(crate) const CACHE_DIR_ENV: &str = "FSCORE_CACHE_DIR";

/// Get the default cache directory path.
///
/// Uses platform-specific cache directories:
/// - Linux: `~/.cache/fscore/`
/// - macOS: `~/Library/Caches/fscore/`
/// - Windows: `%LOCALAPPDATA%\fscore\`
pub(crate) fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("fscore")
}

/// Get the configured cache database path.
pub(crate) fn cache_path() -> PathBuf {
    std::env::var_os(CACHE_DIR_ENV)
        .filter(|dir| !dir.is_empty())
        .map_or_else(default_cache_dir, PathBuf::from)
        .join("fscore.db")
}

/// Open the cache, creating the directory if needed.
pub(crate) fn open_cache() -> Result<StatementCache, DataError> {
    let path = cache_path();

    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    StatementCache::sqlite(&path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_cache_dir_is_namespaced() {
        assert!(default_cache_dir().ends_with("fscore"));
    }

    #[test]
    fn test_cache_file_name() {
        assert_eq!(
            cache_path().file_name().and_then(|n| n.to_str()),
            Some("fscore.db")
        );
    }
}
