//! Rate-limit backends that always fail.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::rate_limit::{CounterStore, RateLimitError, RateLimitLog, RateLimitRecord};

/// Counter store whose every call reports the backend as unavailable.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingCounterStore;

#[async_trait]
impl CounterStore for FailingCounterStore {
    async fn hit(
        &self,
        _key: &str,
        _decay: Duration,
        _now: DateTime<Utc>,
    ) -> Result<u64, RateLimitError> {
        Err(RateLimitError::Unavailable("counter store offline".to_string()))
    }

    async fn extend(&self, _key: &str, _until: DateTime<Utc>) -> Result<(), RateLimitError> {
        Err(RateLimitError::Unavailable("counter store offline".to_string()))
    }

    async fn reset(&self, _key: &str) -> Result<(), RateLimitError> {
        Err(RateLimitError::Unavailable("counter store offline".to_string()))
    }

    async fn purge_expired(&self, _now: DateTime<Utc>) -> Result<usize, RateLimitError> {
        Err(RateLimitError::Unavailable("counter store offline".to_string()))
    }
}

/// Durable mirror that rejects every write.
#[derive(Debug, Default, Clone, Copy)]
pub struct FailingRateLimitLog;

impl RateLimitLog for FailingRateLimitLog {
    fn record(
        &self,
        _key: &str,
        _fresh_window: bool,
        _now: DateTime<Utc>,
    ) -> Result<(), RateLimitError> {
        Err(RateLimitError::Database("disk I/O error".to_string()))
    }

    fn get(&self, _key: &str) -> Result<Option<RateLimitRecord>, RateLimitError> {
        Err(RateLimitError::Database("disk I/O error".to_string()))
    }

    fn forget(&self, _key: &str) -> Result<(), RateLimitError> {
        Err(RateLimitError::Database("disk I/O error".to_string()))
    }
}
