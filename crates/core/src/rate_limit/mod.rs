//! Per-identity attempt limiting with exponential backoff.
//!
//! A [`RateLimiter`] counts attempts per resolved identity key in a
//! [`CounterStore`] and denies once a window is exhausted. Repeated denials
//! grow the advertised retry-after exponentially up to a cap. Allowed attempts
//! are queued best-effort for a durable [`RateLimitLog`] through a
//! [`MirrorHandle`], so a slow log never delays a decision.

mod counter;
mod key;
mod limiter;
mod log;
mod mirror;
mod types;

pub use counter::{CounterStore, InMemoryCounterStore};
pub use key::{counter_key, resolve_key, KEY_PREFIX};
pub use limiter::{backoff, RateLimiter};
pub use log::{RateLimitLog, RateLimitRecord, SqliteRateLimitLog};
pub use mirror::{create_mirror, MirrorHandle, MirrorWriter, DEFAULT_MIRROR_BUFFER};
pub use types::{Admission, RateLimitError, RateLimitPolicy};
