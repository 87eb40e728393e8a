use std::time::Duration;

use thiserror::Error;

use crate::config::{FailurePolicy, RateLimitConfig};

/// Outcome of an admission check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Allow {
        limit: u32,
        remaining: u32,
    },
    Deny {
        limit: u32,
        /// Attempts already counted in the current window.
        attempts: u64,
        retry_after: Duration,
    },
}

impl Admission {
    pub fn is_allowed(&self) -> bool {
        matches!(self, Admission::Allow { .. })
    }

    pub fn limit(&self) -> u32 {
        match self {
            Admission::Allow { limit, .. } | Admission::Deny { limit, .. } => *limit,
        }
    }

    /// Attempts left in the window; zero once denied.
    pub fn remaining(&self) -> u32 {
        match self {
            Admission::Allow { remaining, .. } => *remaining,
            Admission::Deny { .. } => 0,
        }
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Admission::Allow { .. } => None,
            Admission::Deny { retry_after, .. } => Some(*retry_after),
        }
    }
}

/// Limits applied to one class of requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitPolicy {
    pub max_attempts: u32,
    pub decay: Duration,
    /// Pre-attempt count above which the retry-after doubles per attempt.
    pub backoff_threshold: u32,
    /// Largest multiplier applied to `decay`.
    pub backoff_cap: u32,
    pub on_store_error: FailurePolicy,
}

impl Default for RateLimitPolicy {
    fn default() -> Self {
        Self::from(&RateLimitConfig::default())
    }
}

impl From<&RateLimitConfig> for RateLimitPolicy {
    fn from(config: &RateLimitConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            decay: Duration::from_secs(config.decay_secs),
            backoff_threshold: config.backoff_threshold,
            backoff_cap: config.backoff_cap,
            on_store_error: config.on_store_error,
        }
    }
}

#[derive(Debug, Error)]
pub enum RateLimitError {
    #[error("Counter store unavailable: {0}")]
    Unavailable(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<rusqlite::Error> for RateLimitError {
    fn from(e: rusqlite::Error) -> Self {
        RateLimitError::Database(e.to_string())
    }
}
