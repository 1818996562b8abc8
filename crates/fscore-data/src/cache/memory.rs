//! In-memory cache store.

use super::{CacheEntry, CacheKey, CacheStats, CacheStore};
use crate::error::{DataError, Result};
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Cache store held in process memory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, HashMap<CacheKey, CacheEntry>>> {
        self.entries
            .read()
            .map_err(|_| DataError::Cache("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, HashMap<CacheKey, CacheEntry>>> {
        self.entries
            .write()
            .map_err(|_| DataError::Cache("memory store lock poisoned".to_string()))
    }
}

impl CacheStore for MemoryStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        Ok(self.read()?.get(key).cloned())
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        self.write()?.insert(entry.key.clone(), entry.clone());
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> Result<()> {
        self.write()?.remove(key);
        Ok(())
    }

    fn clear_ticker(&self, ticker: &str) -> Result<usize> {
        let mut entries = self.write()?;
        let before = entries.len();
        entries.retain(|key, _| key.ticker != ticker);
        Ok(before - entries.len())
    }

    fn clear_all(&self) -> Result<usize> {
        let mut entries = self.write()?;
        let removed = entries.len();
        entries.clear();
        Ok(removed)
    }

    fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let mut stats = CacheStats::default();
        for entry in self.read()?.values() {
            stats.record(entry.key.source, !entry.is_fresh(now));
        }
        Ok(stats)
    }
}
