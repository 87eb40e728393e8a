//! Identity keys for rate limiting.

use crate::auth::Identity;

/// Namespace for counter cells in a shared store.
pub const KEY_PREFIX: &str = "rate_limit:";

/// Derive the limiter key for a request.
///
/// Authenticated callers are keyed by user and origin. Everyone else is keyed
/// by origin plus a digest of the user agent, so that clients behind one NAT
/// with different agents do not share a window.
pub fn resolve_key(identity: Option<&Identity>, origin: &str, user_agent: Option<&str>) -> String {
    match identity {
        Some(identity) if !identity.is_anonymous() => {
            format!("user:{}:ip:{}", identity.user_id, origin)
        }
        _ => {
            let digest = md5::compute(user_agent.unwrap_or("").as_bytes());
            format!("ip:{}:ua:{:x}", origin, digest)
        }
    }
}

/// The storage key for an identity key.
pub fn counter_key(key: &str) -> String {
    format!("{}{}", KEY_PREFIX, key)
}
