//! Shared SQLite connection setup and timestamp encoding.
//!
//! Every store opens its own connection to the same database file, so each
//! connection gets WAL mode and a busy timeout to tolerate concurrent writers.

use std::path::Path;
use std::time::Duration;

use chrono::{DateTime, Datelike, SecondsFormat, Utc};
use rusqlite::Connection;

const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) a database file configured for concurrent access.
pub fn open(path: &Path) -> rusqlite::Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    Ok(conn)
}

/// Open a private in-memory database (useful for testing).
pub fn open_in_memory() -> rusqlite::Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    Ok(conn)
}

fn configure(conn: &Connection) -> rusqlite::Result<()> {
    conn.busy_timeout(BUSY_TIMEOUT)?;
    conn.pragma_update_and_check(None, "journal_mode", "WAL", |_| Ok(()))?;
    Ok(())
}

/// Fixed-width UTC encoding so that text comparison in SQL matches time order.
pub fn encode_ts(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Whether `ts` survives [`encode_ts`] and [`decode_ts`]: four-digit years only.
pub fn is_storable(ts: &DateTime<Utc>) -> bool {
    (1..=9999).contains(&ts.year())
}

pub fn decode_ts(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .ok()
        .map(|dt| dt.with_timezone(&Utc))
}
