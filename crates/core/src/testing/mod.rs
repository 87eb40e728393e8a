//! Test doubles for stores and rate-limit backends.
//!
//! These let unit and integration tests drive failure paths (lost races,
//! collisions, unavailable backends) without real infrastructure.
//!
//! # Example
//!
//! ```rust,ignore
//! use brt_core::testing::{FailingCounterStore, ScriptedTicketStore};
//!
//! let store = ScriptedTicketStore::in_memory();
//! store.simulate_competing_redeemer();
//!
//! let limiter = RateLimiter::new(Arc::new(FailingCounterStore), policy);
//! ```

mod failing_rate_limit;
mod scripted_ticket_store;

pub use failing_rate_limit::{FailingCounterStore, FailingRateLimitLog};
pub use scripted_ticket_store::ScriptedTicketStore;

/// Test fixtures and helper functions.
pub mod fixtures {
    use chrono::{DateTime, Utc};

    use crate::ticket::{Amount, NewTicket};

    /// A ticket insert with a fixed code and owner.
    pub fn new_ticket(code: &str, owner_id: &str) -> NewTicket {
        NewTicket {
            code: code.to_string(),
            owner_id: owner_id.to_string(),
            amount: Amount::from_minor(5000).expect("positive amount"),
            expires_at: None,
        }
    }

    /// Same as [`new_ticket`] but expiring at `expires_at`.
    pub fn expiring_ticket(code: &str, owner_id: &str, expires_at: DateTime<Utc>) -> NewTicket {
        NewTicket {
            expires_at: Some(expires_at),
            ..new_ticket(code, owner_id)
        }
    }
}
