use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::Ticket;

/// Audit event types
///
/// Ticket events carry the ticket snapshot as it was right after the change.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AuditEvent {
    // System events
    ServiceStarted {
        version: String,
        config_hash: String,
    },
    ServiceStopped {
        reason: String,
    },

    // Ticket lifecycle
    TicketCreated {
        ticket: Ticket,
    },
    TicketUpdated {
        ticket: Ticket,
        /// Snapshot before the update.
        previous: Ticket,
        updated_by: String,
    },
    TicketRedeemed {
        ticket: Ticket,
        redeemed_by: String,
    },
    /// Emitted by whichever reader or sweep performed the transition.
    TicketExpired {
        ticket: Ticket,
    },
    /// Soft delete. The code stays reserved.
    TicketDeleted {
        ticket_id: String,
        code: String,
        owner_id: String,
        deleted_by: String,
        snapshot: Ticket,
    },

    // Admission control
    RateLimitExceeded {
        /// Identity key the limit was applied to.
        key: String,
        /// Attempts counted in the window before this one.
        attempts: u64,
        retry_after_secs: u64,
    },
}

impl AuditEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            AuditEvent::ServiceStarted { .. } => "service_started",
            AuditEvent::ServiceStopped { .. } => "service_stopped",
            AuditEvent::TicketCreated { .. } => "ticket_created",
            AuditEvent::TicketUpdated { .. } => "ticket_updated",
            AuditEvent::TicketRedeemed { .. } => "ticket_redeemed",
            AuditEvent::TicketExpired { .. } => "ticket_expired",
            AuditEvent::TicketDeleted { .. } => "ticket_deleted",
            AuditEvent::RateLimitExceeded { .. } => "rate_limit_exceeded",
        }
    }

    pub fn ticket_id(&self) -> Option<&str> {
        match self {
            AuditEvent::TicketCreated { ticket }
            | AuditEvent::TicketUpdated { ticket, .. }
            | AuditEvent::TicketRedeemed { ticket, .. }
            | AuditEvent::TicketExpired { ticket } => Some(&ticket.id),
            AuditEvent::TicketDeleted { ticket_id, .. } => Some(ticket_id),
            AuditEvent::ServiceStarted { .. }
            | AuditEvent::ServiceStopped { .. }
            | AuditEvent::RateLimitExceeded { .. } => None,
        }
    }

    /// The principal that caused the event, when there is one.
    pub fn user_id(&self) -> Option<&str> {
        match self {
            AuditEvent::TicketCreated { ticket } => Some(&ticket.owner_id),
            AuditEvent::TicketUpdated { updated_by, .. } => Some(updated_by),
            AuditEvent::TicketRedeemed { redeemed_by, .. } => Some(redeemed_by),
            AuditEvent::TicketDeleted { deleted_by, .. } => Some(deleted_by),
            AuditEvent::TicketExpired { .. }
            | AuditEvent::ServiceStarted { .. }
            | AuditEvent::ServiceStopped { .. }
            | AuditEvent::RateLimitExceeded { .. } => None,
        }
    }
}

/// Stored audit record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: i64,
    pub timestamp: DateTime<Utc>,
    pub event_type: String,
    pub ticket_id: Option<String>,
    pub user_id: Option<String>,
    pub data: AuditEvent,
}
