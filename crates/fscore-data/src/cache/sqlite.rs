//! SQLite cache store.

use super::{CacheEntry, CacheKey, CacheStats, CacheStore, SCHEMA_VERSION};
use crate::error::{DataError, Result};
use crate::statement::DataSource;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::info;

/// SQLite-backed cache store.
#[derive(Debug)]
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a cache database.
    ///
    /// # Arguments
    /// * `path` - Path to the SQLite database file
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        // WAL lets readers proceed while a writer commits.
        let _mode: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self { conn: Mutex::new(conn) };
        store.initialize_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| DataError::Cache("sqlite connection lock poisoned".to_string()))
    }

    /// Initialize the database schema and drop entries of older payload versions.
    fn initialize_schema(&self) -> Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS statement_cache (
                ticker TEXT NOT NULL,
                period_id TEXT NOT NULL,
                source TEXT NOT NULL,
                schema_version INTEGER NOT NULL,
                payload TEXT NOT NULL,
                fetched_at TEXT NOT NULL,
                ttl_days INTEGER NOT NULL,
                PRIMARY KEY (ticker, period_id, source, schema_version)
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_statement_cache_ticker ON statement_cache(ticker)",
            [],
        )?;

        let purged = conn.execute(
            "DELETE FROM statement_cache WHERE schema_version != ?1",
            params![SCHEMA_VERSION],
        )?;
        if purged > 0 {
            info!(purged, schema_version = SCHEMA_VERSION, "Dropped cache entries from an older schema");
        }
        Ok(())
    }
}

fn parse_timestamp(s: &str) -> Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| DataError::Parse(format!("Invalid timestamp {}: {}", s, e)))
}

impl CacheStore for SqliteStore {
    fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        let conn = self.conn()?;
        let row: Option<(String, String, i64)> = conn
            .query_row(
                "SELECT payload, fetched_at, ttl_days FROM statement_cache
                 WHERE ticker = ?1 AND period_id = ?2 AND source = ?3 AND schema_version = ?4",
                params![
                    key.ticker,
                    key.period_id.to_string(),
                    key.source.to_db_str(),
                    key.schema_version
                ],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        row.map(|(payload, fetched_at, ttl_days)| {
            Ok(CacheEntry {
                key: key.clone(),
                payload,
                fetched_at: parse_timestamp(&fetched_at)?,
                ttl_days,
            })
        })
        .transpose()
    }

    fn put(&self, entry: &CacheEntry) -> Result<()> {
        let conn = self.conn()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO statement_cache
             (ticker, period_id, source, schema_version, payload, fetched_at, ttl_days)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                entry.key.ticker,
                entry.key.period_id.to_string(),
                entry.key.source.to_db_str(),
                entry.key.schema_version,
                entry.payload,
                entry.fetched_at.to_rfc3339(),
                entry.ttl_days,
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn invalidate(&self, key: &CacheKey) -> Result<()> {
        self.conn()?.execute(
            "DELETE FROM statement_cache
             WHERE ticker = ?1 AND period_id = ?2 AND source = ?3 AND schema_version = ?4",
            params![
                key.ticker,
                key.period_id.to_string(),
                key.source.to_db_str(),
                key.schema_version
            ],
        )?;
        Ok(())
    }

    fn clear_ticker(&self, ticker: &str) -> Result<usize> {
        Ok(self
            .conn()?
            .execute("DELETE FROM statement_cache WHERE ticker = ?1", params![ticker])?)
    }

    fn clear_all(&self) -> Result<usize> {
        Ok(self.conn()?.execute("DELETE FROM statement_cache", [])?)
    }

    fn stats(&self, now: DateTime<Utc>) -> Result<CacheStats> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT source, fetched_at, ttl_days FROM statement_cache WHERE schema_version = ?1",
        )?;
        let rows = stmt.query_map(params![SCHEMA_VERSION], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;

        let mut stats = CacheStats::default();
        for row in rows {
            let (source, fetched_at, ttl_days) = row?;
            let expired = now - parse_timestamp(&fetched_at)? > Duration::days(ttl_days);
            stats.record(DataSource::from_db_str(&source)?, expired);
        }
        Ok(stats)
    }
}
