//! Durable mirror of rate-limit counters.
//!
//! The mirror is informational: admission decisions never read it.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};

use super::RateLimitError;
use crate::db::{self, decode_ts, encode_ts};

/// A mirrored counter row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RateLimitRecord {
    pub key: String,
    pub count: u64,
    pub window_started_at: DateTime<Utc>,
    pub last_attempt_at: DateTime<Utc>,
}

pub trait RateLimitLog: Send + Sync {
    /// Record an admitted attempt. `fresh_window` restarts the row's count.
    fn record(&self, key: &str, fresh_window: bool, now: DateTime<Utc>)
        -> Result<(), RateLimitError>;

    fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, RateLimitError>;

    fn forget(&self, key: &str) -> Result<(), RateLimitError>;
}

/// `rate_limits` table in SQLite.
pub struct SqliteRateLimitLog {
    conn: Mutex<Connection>,
}

impl SqliteRateLimitLog {
    pub fn new(path: &Path) -> Result<Self, RateLimitError> {
        Self::with_connection(db::open(path)?)
    }

    pub fn in_memory() -> Result<Self, RateLimitError> {
        Self::with_connection(db::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, RateLimitError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS rate_limits (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                key TEXT NOT NULL UNIQUE,
                count INTEGER NOT NULL DEFAULT 0,
                window_started_at TEXT NOT NULL,
                last_attempt_at TEXT NOT NULL
            );
            "#,
        )?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, RateLimitError> {
        self.conn
            .lock()
            .map_err(|_| RateLimitError::Database("rate limit log lock poisoned".to_string()))
    }
}

impl RateLimitLog for SqliteRateLimitLog {
    fn record(
        &self,
        key: &str,
        fresh_window: bool,
        now: DateTime<Utc>,
    ) -> Result<(), RateLimitError> {
        let conn = self.conn()?;
        conn.execute(
            r#"
            INSERT INTO rate_limits (key, count, window_started_at, last_attempt_at)
            VALUES (?1, 1, ?2, ?2)
            ON CONFLICT(key) DO UPDATE SET
                count = CASE WHEN ?3 THEN 1 ELSE count + 1 END,
                window_started_at = CASE WHEN ?3 THEN excluded.window_started_at
                                         ELSE window_started_at END,
                last_attempt_at = excluded.last_attempt_at
            "#,
            params![key, encode_ts(&now), fresh_window],
        )?;
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<RateLimitRecord>, RateLimitError> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                "SELECT key, count, window_started_at, last_attempt_at FROM rate_limits WHERE key = ?",
                params![key],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((key, count, started, last)) = row else {
            return Ok(None);
        };
        let window_started_at = decode_ts(&started)
            .ok_or_else(|| RateLimitError::Database(format!("bad timestamp: {}", started)))?;
        let last_attempt_at = decode_ts(&last)
            .ok_or_else(|| RateLimitError::Database(format!("bad timestamp: {}", last)))?;

        Ok(Some(RateLimitRecord {
            key,
            count: count.max(0) as u64,
            window_started_at,
            last_attempt_at,
        }))
    }

    fn forget(&self, key: &str) -> Result<(), RateLimitError> {
        let conn = self.conn()?;
        conn.execute("DELETE FROM rate_limits WHERE key = ?", params![key])?;
        Ok(())
    }
}
