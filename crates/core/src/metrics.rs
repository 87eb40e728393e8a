//! Prometheus metrics for core components.
//!
//! Covers ticket issuance and lifecycle, redemption outcomes, rate limiting
//! and the audit pipeline. The server registers these via [`all_metrics`].

use once_cell::sync::Lazy;
use prometheus::{IntCounter, IntCounterVec, Opts};

// =============================================================================
// Tickets
// =============================================================================

/// Tickets issued since startup.
pub static TICKETS_ISSUED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("brt_tickets_issued_total", "Total tickets issued").unwrap()
});

/// Candidate codes rejected because they were already taken.
pub static CODE_COLLISIONS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "brt_code_collisions_total",
        "Generated codes that collided with an existing ticket",
    )
    .unwrap()
});

/// Lifecycle transitions performed, by target status.
pub static TICKET_TRANSITIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("brt_ticket_transitions_total", "Ticket status transitions"),
        &["to_status"], // "expired", "redeemed"
    )
    .unwrap()
});

/// Redemption attempts by outcome.
pub static REDEMPTIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("brt_redemptions_total", "Redemption attempts by outcome"),
        &["outcome"], // "redeemed", "already_redeemed", "expired", "not_found", ...
    )
    .unwrap()
});

/// Redemptions that lost a race against a concurrent writer.
pub static REDEMPTION_RACES_LOST: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "brt_redemption_races_lost_total",
        "Redemptions whose conditional write matched no row",
    )
    .unwrap()
});

// =============================================================================
// Rate limiting
// =============================================================================

/// Admission decisions.
pub static RATE_LIMIT_DECISIONS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("brt_rate_limit_decisions_total", "Rate limiter decisions"),
        &["decision"], // "allowed", "denied", "store_error"
    )
    .unwrap()
});

/// Mirror writes that were dropped before reaching the durable log.
pub static RATE_LIMIT_MIRROR_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "brt_rate_limit_mirror_dropped_total",
            "Rate limit mirror writes lost",
        ),
        &["reason"], // "channel_full", "channel_closed", "store_error"
    )
    .unwrap()
});

// =============================================================================
// Audit
// =============================================================================

/// Audit events persisted by the writer.
pub static AUDIT_EVENTS_WRITTEN: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("brt_audit_events_written_total", "Audit events persisted").unwrap()
});

/// Audit events that could not be queued or stored.
pub static AUDIT_EVENTS_DROPPED: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("brt_audit_events_dropped_total", "Audit events lost"),
        &["reason"], // "channel_full", "channel_closed", "store_error"
    )
    .unwrap()
});

/// Get all core metrics for registration in a registry.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(TICKETS_ISSUED.clone()),
        Box::new(CODE_COLLISIONS.clone()),
        Box::new(TICKET_TRANSITIONS.clone()),
        Box::new(REDEMPTIONS.clone()),
        Box::new(REDEMPTION_RACES_LOST.clone()),
        Box::new(RATE_LIMIT_DECISIONS.clone()),
        Box::new(RATE_LIMIT_MIRROR_DROPPED.clone()),
        Box::new(AUDIT_EVENTS_WRITTEN.clone()),
        Box::new(AUDIT_EVENTS_DROPPED.clone()),
    ]
}
