//! Attempt counters keyed by identity.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;

use super::RateLimitError;

/// `now + d`, saturating at the far future.
pub(crate) fn after(now: DateTime<Utc>, d: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(d)
        .ok()
        .and_then(|d| now.checked_add_signed(d))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

/// Storage for per-key attempt windows.
///
/// Every method must be atomic per key. Implementations are free to shard;
/// no operation needs a lock spanning more than one key.
#[async_trait]
pub trait CounterStore: Send + Sync {
    /// Count one attempt and return the count from before it.
    ///
    /// An expired cell is reset first. A fresh window expires at
    /// `now + decay`; later hits in the window leave the expiry alone.
    async fn hit(&self, key: &str, decay: Duration, now: DateTime<Utc>)
        -> Result<u64, RateLimitError>;

    /// Push the cell's expiry out to `until` if it is earlier.
    async fn extend(&self, key: &str, until: DateTime<Utc>) -> Result<(), RateLimitError>;

    /// Drop the cell entirely.
    async fn reset(&self, key: &str) -> Result<(), RateLimitError>;

    /// Remove expired cells. Returns how many were removed.
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, RateLimitError>;
}

#[derive(Debug, Clone, Copy)]
struct Cell {
    count: u64,
    expires_at: DateTime<Utc>,
    last_attempt_at: DateTime<Utc>,
}

impl Cell {
    fn fresh(now: DateTime<Utc>, decay: Duration) -> Self {
        Self {
            count: 0,
            expires_at: after(now, decay),
            last_attempt_at: now,
        }
    }

    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

/// Process-local counters on a sharded map.
#[derive(Debug, Default)]
pub struct InMemoryCounterStore {
    cells: DashMap<String, Cell>,
}

impl InMemoryCounterStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live cells, expired or not.
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Expiry of a cell, if present.
    pub fn expires_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.cells.get(key).map(|cell| cell.expires_at)
    }

    pub fn last_attempt_at(&self, key: &str) -> Option<DateTime<Utc>> {
        self.cells.get(key).map(|cell| cell.last_attempt_at)
    }
}

#[async_trait]
impl CounterStore for InMemoryCounterStore {
    async fn hit(
        &self,
        key: &str,
        decay: Duration,
        now: DateTime<Utc>,
    ) -> Result<u64, RateLimitError> {
        // The entry guard holds the shard lock for this key until dropped.
        let mut cell = self
            .cells
            .entry(key.to_string())
            .or_insert_with(|| Cell::fresh(now, decay));

        if cell.is_expired(now) {
            *cell = Cell::fresh(now, decay);
        }
        let previous = cell.count;
        cell.count = previous.saturating_add(1);
        cell.last_attempt_at = now;
        Ok(previous)
    }

    async fn extend(&self, key: &str, until: DateTime<Utc>) -> Result<(), RateLimitError> {
        if let Some(mut cell) = self.cells.get_mut(key) {
            if cell.expires_at < until {
                cell.expires_at = until;
            }
        }
        Ok(())
    }

    async fn reset(&self, key: &str) -> Result<(), RateLimitError> {
        self.cells.remove(key);
        Ok(())
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        let mut removed = 0;
        self.cells.retain(|_, cell| {
            let keep = !cell.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        Ok(removed)
    }
}
