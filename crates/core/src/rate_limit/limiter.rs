use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, warn};

use super::counter::after;
use super::{counter_key, Admission, CounterStore, MirrorHandle, RateLimitError, RateLimitPolicy};
use crate::audit::{AuditEvent, AuditHandle};
use crate::config::FailurePolicy;
use crate::metrics::RATE_LIMIT_DECISIONS;

/// Retry-after for a denied attempt.
///
/// Up to `threshold` prior attempts the caller waits one `decay`. Beyond it
/// the wait doubles per attempt, with the multiplier capped at `cap`.
pub fn backoff(previous_attempts: u64, decay: Duration, threshold: u32, cap: u32) -> Duration {
    let threshold = u64::from(threshold);
    if previous_attempts <= threshold {
        return decay;
    }
    let cap = cap.max(1);
    let exponent = previous_attempts - threshold;
    let multiplier = if exponent >= 32 {
        cap
    } else {
        (1u64 << exponent).min(u64::from(cap)) as u32
    };
    decay.saturating_mul(multiplier)
}

/// Admission control for rate-limited operations.
#[derive(Clone)]
pub struct RateLimiter {
    counters: Arc<dyn CounterStore>,
    mirror: Option<MirrorHandle>,
    audit: Option<AuditHandle>,
    policy: RateLimitPolicy,
}

impl RateLimiter {
    pub fn new(counters: Arc<dyn CounterStore>, policy: RateLimitPolicy) -> Self {
        Self {
            counters,
            mirror: None,
            audit: None,
            policy,
        }
    }

    /// Queue admitted attempts for the durable log behind `mirror`.
    pub fn with_mirror(mut self, mirror: MirrorHandle) -> Self {
        self.mirror = Some(mirror);
        self
    }

    /// Emit an audit event on every denial.
    pub fn with_audit(mut self, audit: AuditHandle) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn policy(&self) -> &RateLimitPolicy {
        &self.policy
    }

    /// Check `identity` against the configured policy.
    pub async fn check_policy(&self, identity: &str, policy: &RateLimitPolicy) -> Admission {
        let key = counter_key(identity);
        let now = Utc::now();

        let previous = match self.counters.hit(&key, policy.decay, now).await {
            Ok(previous) => previous,
            Err(e) => return self.on_store_error(identity, policy, e),
        };

        if previous >= u64::from(policy.max_attempts) {
            let retry_after = backoff(
                previous,
                policy.decay,
                policy.backoff_threshold,
                policy.backoff_cap,
            );
            if let Err(e) = self.counters.extend(&key, after(now, retry_after)).await {
                error!(key = %identity, error = %e, "Failed to extend rate limit window");
            }

            warn!(
                key = %identity,
                attempts = previous,
                retry_after_secs = retry_after.as_secs(),
                "Rate limit exceeded"
            );
            RATE_LIMIT_DECISIONS.with_label_values(&["denied"]).inc();
            if let Some(ref audit) = self.audit {
                audit.try_emit(AuditEvent::RateLimitExceeded {
                    key: identity.to_string(),
                    attempts: previous,
                    retry_after_secs: retry_after.as_secs(),
                });
            }

            return Admission::Deny {
                limit: policy.max_attempts,
                attempts: previous,
                retry_after,
            };
        }

        if let Some(ref mirror) = self.mirror {
            mirror.record(&key, previous == 0, now);
        }

        let used = previous.saturating_add(1);
        let remaining = u64::from(policy.max_attempts).saturating_sub(used) as u32;
        debug!(key = %identity, remaining, "Rate limit check passed");
        RATE_LIMIT_DECISIONS.with_label_values(&["allowed"]).inc();

        Admission::Allow {
            limit: policy.max_attempts,
            remaining,
        }
    }

    /// Check `identity` with explicit limits and the configured backoff.
    pub async fn check(&self, identity: &str, max_attempts: u32, decay: Duration) -> Admission {
        let policy = RateLimitPolicy {
            max_attempts,
            decay,
            ..self.policy
        };
        self.check_policy(identity, &policy).await
    }

    /// Clear all recorded attempts for `identity`.
    pub async fn reset(&self, identity: &str) -> Result<(), RateLimitError> {
        let key = counter_key(identity);
        self.counters.reset(&key).await?;
        if let Some(ref mirror) = self.mirror {
            mirror.forget(&key).await;
        }
        debug!(key = %identity, "Rate limit reset");
        Ok(())
    }

    /// Drop counter cells whose window has passed.
    pub async fn purge_expired(&self) -> Result<usize, RateLimitError> {
        self.counters.purge_expired(Utc::now()).await
    }

    fn on_store_error(
        &self,
        identity: &str,
        policy: &RateLimitPolicy,
        e: RateLimitError,
    ) -> Admission {
        error!(
            key = %identity,
            error = %e,
            policy = ?policy.on_store_error,
            "Rate limit counter store failed"
        );
        RATE_LIMIT_DECISIONS.with_label_values(&["store_error"]).inc();

        match policy.on_store_error {
            FailurePolicy::FailClosed => Admission::Deny {
                limit: policy.max_attempts,
                attempts: 0,
                retry_after: policy.decay,
            },
            FailurePolicy::FailOpen => Admission::Allow {
                limit: policy.max_attempts,
                remaining: policy.max_attempts,
            },
        }
    }
}
