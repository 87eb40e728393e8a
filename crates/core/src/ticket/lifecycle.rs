//! Ticket status rules and lazy expiry.
//!
//! ```text
//! Active --(expiry reached)--> Expired
//! Active --(redeem)----------> Redeemed
//! ```
//!
//! Both target states are terminal. Every transition is performed by a
//! conditional store write, so concurrent observers cannot double-apply one.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use super::{Ticket, TicketError, TicketStatus, TicketStore};
use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics::TICKET_TRANSITIONS;

impl TicketStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TicketStatus::Expired | TicketStatus::Redeemed)
    }

    pub fn can_transition_to(&self, next: TicketStatus) -> bool {
        matches!(
            (self, next),
            (TicketStatus::Active, TicketStatus::Expired)
                | (TicketStatus::Active, TicketStatus::Redeemed)
        )
    }
}

/// Active and past its expiry: the next observer must expire it.
pub fn is_due(ticket: &Ticket, now: DateTime<Utc>) -> bool {
    ticket.status == TicketStatus::Active && ticket.is_past_expiry(now)
}

/// Check that `ticket` may move to `to`, naming `operation` in the error.
pub fn ensure_transition(
    ticket: &Ticket,
    to: TicketStatus,
    operation: &str,
) -> Result<(), TicketError> {
    if ticket.status.can_transition_to(to) {
        Ok(())
    } else {
        Err(not_active_error(ticket, operation))
    }
}

/// The conflict a caller sees when an operation requires an active ticket.
pub fn not_active_error(ticket: &Ticket, operation: &str) -> TicketError {
    match ticket.status {
        TicketStatus::Redeemed if operation == "redeem" => TicketError::AlreadyRedeemed {
            code: ticket.code.clone(),
        },
        TicketStatus::Expired if operation == "redeem" => TicketError::Expired {
            code: ticket.code.clone(),
        },
        status => TicketError::InvalidState {
            ticket_id: ticket.id.clone(),
            current_state: status.to_string(),
            operation: operation.to_string(),
        },
    }
}

/// Applies lazy expiry on read paths and emits the resulting events.
#[derive(Clone)]
pub struct TicketLifecycle {
    store: Arc<dyn TicketStore>,
    audit: Option<AuditHandle>,
}

impl TicketLifecycle {
    pub fn new(store: Arc<dyn TicketStore>, audit: Option<AuditHandle>) -> Self {
        Self { store, audit }
    }

    /// Return the ticket as it should be seen at `now`.
    ///
    /// A due ticket is expired through a conditional write. If another
    /// observer won that write, the stored row is re-read instead, so the
    /// caller always sees the persisted status and the expiry event is
    /// emitted exactly once.
    pub fn observe(&self, ticket: Ticket, now: DateTime<Utc>) -> Result<Ticket, TicketError> {
        if !is_due(&ticket, now) {
            return Ok(ticket);
        }
        self.expire(&ticket.id, now)
    }

    /// Attempt Active -> Expired for a ticket id and return the current row.
    pub fn expire(&self, id: &str, now: DateTime<Utc>) -> Result<Ticket, TicketError> {
        match self.store.mark_expired(id, now)? {
            Some(expired) => {
                info!(ticket_id = %expired.id, code = %expired.code, "Ticket expired");
                TICKET_TRANSITIONS.with_label_values(&["expired"]).inc();
                if let Some(ref audit) = self.audit {
                    audit.try_emit(AuditEvent::TicketExpired {
                        ticket: expired.clone(),
                    });
                }
                Ok(expired)
            }
            None => {
                debug!(ticket_id = %id, "Expiry already applied or no longer due");
                self.store
                    .get(id)?
                    .ok_or_else(|| TicketError::NotFound(id.to_string()))
            }
        }
    }
}
