//! Single-use redemption of tickets by code.

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use super::lifecycle::{ensure_transition, not_active_error};
use super::{CodeGenerator, Ticket, TicketError, TicketLifecycle, TicketStatus, TicketStore};
use crate::audit::{AuditEvent, AuditHandle};
use crate::metrics::{REDEMPTIONS, REDEMPTION_RACES_LOST, TICKET_TRANSITIONS};

/// Serializes concurrent redemptions of the same code.
///
/// The transition is a single conditional write guarded by status and expiry;
/// among any number of concurrent attempts exactly one succeeds and the rest
/// are told precisely why they lost.
#[derive(Clone)]
pub struct RedemptionCoordinator {
    store: Arc<dyn TicketStore>,
    codes: CodeGenerator,
    lifecycle: TicketLifecycle,
    audit: Option<AuditHandle>,
}

impl RedemptionCoordinator {
    pub fn new(
        store: Arc<dyn TicketStore>,
        codes: CodeGenerator,
        audit: Option<AuditHandle>,
    ) -> Self {
        let lifecycle = TicketLifecycle::new(Arc::clone(&store), audit.clone());
        Self {
            store,
            codes,
            lifecycle,
            audit,
        }
    }

    /// Redeem the ticket identified by `code` on behalf of `caller`.
    ///
    /// Any authenticated principal may redeem; ownership is not checked.
    /// The code is matched case-insensitively after trimming.
    pub fn redeem(&self, code: &str, caller: &str) -> Result<Ticket, TicketError> {
        let result = self.try_redeem(code, caller);
        let outcome = match &result {
            Ok(_) => "redeemed",
            Err(e) => e.reason(),
        };
        REDEMPTIONS.with_label_values(&[outcome]).inc();
        result
    }

    fn try_redeem(&self, code: &str, caller: &str) -> Result<Ticket, TicketError> {
        let code = CodeGenerator::normalize(code);
        if code.is_empty() {
            return Err(TicketError::Validation(
                "reservation_code is required".to_string(),
            ));
        }
        if !self.codes.is_valid(&code) {
            return Err(TicketError::Validation(format!(
                "reservation_code must look like {}-XXXXXXXX",
                self.codes.prefix()
            )));
        }

        let now = Utc::now();
        let ticket = self
            .store
            .get_by_code(&code)?
            .ok_or_else(|| TicketError::NotFound(code.clone()))?;

        ensure_transition(&ticket, TicketStatus::Redeemed, "redeem")?;
        if ticket.is_past_expiry(now) {
            // Expiry wins over redemption once the instant has passed.
            let current = self.lifecycle.observe(ticket, now)?;
            return Err(not_active_error(&current, "redeem"));
        }

        match self.store.mark_redeemed(&code, now)? {
            Some(redeemed) => {
                info!(
                    ticket_id = %redeemed.id,
                    code = %redeemed.code,
                    redeemed_by = %caller,
                    "Ticket redeemed"
                );
                TICKET_TRANSITIONS.with_label_values(&["redeemed"]).inc();
                if let Some(ref audit) = self.audit {
                    audit.try_emit(AuditEvent::TicketRedeemed {
                        ticket: redeemed.clone(),
                        redeemed_by: caller.to_string(),
                    });
                }
                Ok(redeemed)
            }
            None => {
                REDEMPTION_RACES_LOST.inc();
                warn!(code = %code, caller = %caller, "Redemption lost to a concurrent writer");
                self.classify_lost_race(&code)
            }
        }
    }

    /// Re-read after a conditional write matched nothing and report why.
    fn classify_lost_race(&self, code: &str) -> Result<Ticket, TicketError> {
        let now = Utc::now();
        let current = self
            .store
            .get_by_code(code)?
            .ok_or_else(|| TicketError::NotFound(code.to_string()))?;

        let current = self.lifecycle.observe(current, now)?;
        Err(not_active_error(&current, "redeem"))
    }
}
