//! Caching layer for fetched statements.
//!
//! Entries are keyed by `(ticker, period, source, schema version)` and live for
//! seven days. The storage backend is a [`CacheStore`]; [`StatementCache`] adds
//! the TTL, serialization and corruption handling on top of it.

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

use crate::error::Result;
use crate::statement::{DataSource, FinancialStatement, PeriodId};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, warn};

/// Version of the cached payload format. Bump on any change to [`FinancialStatement`].
pub const SCHEMA_VERSION: u32 = 1;

/// Default entry lifetime.
pub const DEFAULT_TTL_DAYS: i64 = 7;

/// Cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CacheKey {
    /// Ticker symbol
    pub ticker: String,
    /// Fiscal period
    pub period_id: PeriodId,
    /// Source that produced the payload
    pub source: DataSource,
    /// Payload format version
    pub schema_version: u32,
}

impl CacheKey {
    /// Key under the current schema version.
    pub fn new(ticker: impl Into<String>, period_id: PeriodId, source: DataSource) -> Self {
        Self {
            ticker: ticker.into(),
            period_id,
            source,
            schema_version: SCHEMA_VERSION,
        }
    }
}

/// Stored payload with its age.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Key
    pub key: CacheKey,
    /// Serialized statement
    pub payload: String,
    /// When the payload was fetched
    pub fetched_at: DateTime<Utc>,
    /// Lifetime in days
    pub ttl_days: i64,
}

impl CacheEntry {
    /// Whether the entry is still within its lifetime at `now`.
    pub fn is_fresh(&self, now: DateTime<Utc>) -> bool {
        now - self.fetched_at <= Duration::days(self.ttl_days)
    }
}

/// Storage capability behind the cache.
///
/// Implementations must publish each `put` atomically: a concurrent `get`
/// sees either the old entry or the new one.
pub trait CacheStore: Send + Sync + std::fmt::Debug {
    /// Entry for a key, fresh or not.
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>>;

    /// Insert or replace an entry.
    fn put(&self, entry: &CacheEntry) -> Result<()>;

    /// Remove one entry.
    fn invalidate(&self, key: &CacheKey) -> Result<()>;

    /// Remove every entry for a ticker. Returns the number removed.
    fn clear_ticker(&self, ticker: &str) -> Result<usize>;

    /// Remove every entry. Returns the number removed.
    fn clear_all(&self) -> Result<usize>;

    /// Entry counts as of `now`.
    fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats>;
}

/// Cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStats {
    /// Number of entries
    pub entries: usize,
    /// Number of entries past their lifetime
    pub expired: usize,
    /// Entries per source
    pub by_source: BTreeMap<DataSource, usize>,
}

impl CacheStats {
    /// Count one entry.
    pub fn record(&mut self, source: DataSource, expired: bool) {
        self.entries += 1;
        if expired {
            self.expired += 1;
        }
        *self.by_source.entry(source).or_default() += 1;
    }
}

/// Statement cache with TTL and corruption handling.
///
/// Read failures of any kind are misses; write failures are logged and
/// otherwise ignored, so the cache can never fail a resolution.
#[derive(Debug, Clone)]
pub struct StatementCache {
    store: Arc<dyn CacheStore>,
    ttl_days: i64,
}

impl StatementCache {
    /// Wrap a store.
    pub fn new(store: Arc<dyn CacheStore>) -> Self {
        Self {
            store,
            ttl_days: DEFAULT_TTL_DAYS,
        }
    }

    /// In-memory cache.
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    /// SQLite cache at `path`.
    pub fn sqlite<P: AsRef<Path>>(path: P) -> Result<Self> {
        Ok(Self::new(Arc::new(SqliteStore::new(path)?)))
    }

    /// Use a different lifetime for new entries.
    pub const fn with_ttl_days(mut self, ttl_days: i64) -> Self {
        self.ttl_days = ttl_days;
        self
    }

    /// Fresh cached statement, if any.
    pub fn get(&self, ticker: &str, period: &PeriodId, source: DataSource) -> Option<FinancialStatement> {
        self.get_at(ticker, period, source, Utc::now())
    }

    /// Fresh cached statement as of `now`.
    pub fn get_at(
        &self,
        ticker: &str,
        period: &PeriodId,
        source: DataSource,
        now: DateTime<Utc>,
    ) -> Option<FinancialStatement> {
        let key = CacheKey::new(ticker, period.clone(), source);
        let entry = match self.store.get(&key) {
            Ok(Some(entry)) => entry,
            Ok(None) => return None,
            Err(e) => {
                warn!(ticker, %period, %source, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };
        if !entry.is_fresh(now) {
            debug!(ticker, %period, %source, fetched_at = %entry.fetched_at, "Cache entry expired");
            return None;
        }
        match serde_json::from_str::<FinancialStatement>(&entry.payload) {
            Ok(statement) if statement.ticker == ticker && &statement.period_id == period => {
                Some(statement)
            }
            Ok(_) | Err(_) => {
                warn!(ticker, %period, %source, "Corrupt cache entry, refetching");
                if let Err(e) = self.store.invalidate(&key) {
                    warn!(error = %e, "Failed to drop corrupt cache entry");
                }
                None
            }
        }
    }

    /// Store a statement under its own ticker, period and source.
    pub fn put(&self, statement: &FinancialStatement) {
        self.put_at(statement, Utc::now());
    }

    /// Store a statement as fetched at `fetched_at`.
    pub fn put_at(&self, statement: &FinancialStatement, fetched_at: DateTime<Utc>) {
        let key = CacheKey::new(&statement.ticker, statement.period_id.clone(), statement.source);
        let payload = match serde_json::to_string(statement) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(error = %e, "Failed to serialize statement for cache");
                return;
            }
        };
        let entry = CacheEntry {
            key,
            payload,
            fetched_at,
            ttl_days: self.ttl_days,
        };
        if let Err(e) = self.store.put(&entry) {
            warn!(
                ticker = %statement.ticker,
                period = %statement.period_id,
                error = %e,
                "Cache write failed"
            );
        }
    }

    /// Remove entries for one ticker, or all entries.
    pub fn clear(&self, ticker: Option<&str>) -> Result<usize> {
        match ticker {
            Some(ticker) => self.store.clear_ticker(ticker),
            None => self.store.clear_all(),
        }
    }

    /// Entry counts.
    pub fn stats(&self) -> Result<CacheStats> {
        self.store.stats(Utc::now())
    }
}
