//! Holder-facing ticket operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use super::lifecycle::not_active_error;
use super::{
    CodeGenerator, CreateTicketRequest, NewTicket, RedemptionCoordinator, Ticket, TicketError,
    TicketFilter, TicketLifecycle, TicketPatch, TicketStatus, TicketStore,
};
use crate::audit::{AuditEvent, AuditHandle};
use crate::config::TicketConfig;
use crate::db;
use crate::metrics::TICKETS_ISSUED;

/// Maximum number of due tickets expired per sweep batch.
const SWEEP_BATCH: i64 = 500;

/// Reject expiries the store cannot read back.
fn check_expiry(expires_at: Option<&DateTime<Utc>>) -> Result<(), TicketError> {
    match expires_at {
        Some(ts) if !db::is_storable(ts) => Err(TicketError::Validation(
            "expires_at must fall between years 0001 and 9999".to_string(),
        )),
        _ => Ok(()),
    }
}

/// A page of tickets plus the total matching the filter.
#[derive(Debug, Clone)]
pub struct TicketPage {
    pub tickets: Vec<Ticket>,
    pub total: i64,
}

/// Issues, reads, edits and deletes tickets for their holders.
///
/// Reads apply lazy expiry, so a ticket past its expiry is never reported as
/// active. Mutations other than redemption require the caller to own the
/// ticket.
#[derive(Clone)]
pub struct TicketService {
    store: Arc<dyn TicketStore>,
    codes: CodeGenerator,
    lifecycle: TicketLifecycle,
    redemption: RedemptionCoordinator,
    audit: Option<AuditHandle>,
}

impl TicketService {
    pub fn new(store: Arc<dyn TicketStore>, config: &TicketConfig) -> Result<Self, TicketError> {
        let codes = CodeGenerator::new(&config.code_prefix, config.max_code_attempts)?;
        Ok(Self::build(store, codes, None))
    }

    /// Emit lifecycle events through `audit`.
    pub fn with_audit(self, audit: AuditHandle) -> Self {
        Self::build(self.store, self.codes, Some(audit))
    }

    fn build(
        store: Arc<dyn TicketStore>,
        codes: CodeGenerator,
        audit: Option<AuditHandle>,
    ) -> Self {
        Self {
            lifecycle: TicketLifecycle::new(Arc::clone(&store), audit.clone()),
            redemption: RedemptionCoordinator::new(
                Arc::clone(&store),
                codes.clone(),
                audit.clone(),
            ),
            store,
            codes,
            audit,
        }
    }

    pub fn store(&self) -> &Arc<dyn TicketStore> {
        &self.store
    }

    pub fn codes(&self) -> &CodeGenerator {
        &self.codes
    }

    fn emit(&self, event: AuditEvent) {
        if let Some(ref audit) = self.audit {
            audit.try_emit(event);
        }
    }

    /// Issue a new active ticket with a freshly generated unique code.
    ///
    /// An insert that loses a uniqueness race to a concurrent issuer is
    /// retried with a new code, up to the configured attempt budget.
    pub fn create(&self, request: CreateTicketRequest) -> Result<Ticket, TicketError> {
        if request.owner_id.trim().is_empty() {
            return Err(TicketError::Validation("owner is required".to_string()));
        }
        check_expiry(request.expires_at.as_ref())?;

        let attempts = self.codes.max_attempts();
        for attempt in 1..=attempts {
            let code = self.codes.generate(self.store.as_ref())?;
            let new_ticket = NewTicket {
                code,
                owner_id: request.owner_id.clone(),
                amount: request.amount,
                expires_at: request.expires_at,
            };

            match self.store.insert(new_ticket) {
                Ok(ticket) => {
                    info!(
                        ticket_id = %ticket.id,
                        code = %ticket.code,
                        owner_id = %ticket.owner_id,
                        amount = %ticket.amount,
                        "Ticket issued"
                    );
                    TICKETS_ISSUED.inc();
                    self.emit(AuditEvent::TicketCreated {
                        ticket: ticket.clone(),
                    });
                    return Ok(ticket);
                }
                Err(TicketError::DuplicateCode(code)) => {
                    warn!(attempt, code = %code, "Code taken between check and insert, retrying");
                }
                Err(e) => return Err(e),
            }
        }

        Err(TicketError::GenerationExhausted { attempts })
    }

    fn load_owned(&self, id: &str, caller: &str) -> Result<Ticket, TicketError> {
        let ticket = self
            .store
            .get(id)?
            .ok_or_else(|| TicketError::NotFound(id.to_string()))?;

        if !ticket.is_owned_by(caller) {
            return Err(TicketError::Forbidden {
                ticket_id: id.to_string(),
                caller: caller.to_string(),
            });
        }
        Ok(ticket)
    }

    /// Fetch one of the caller's tickets.
    pub fn get(&self, id: &str, caller: &str) -> Result<Ticket, TicketError> {
        let ticket = self.load_owned(id, caller)?;
        self.lifecycle.observe(ticket, Utc::now())
    }

    /// List tickets matching `filter`, newest first.
    pub fn list(&self, filter: &TicketFilter) -> Result<TicketPage, TicketError> {
        let now = Utc::now();
        let total = self.store.count(filter)?;
        let tickets = self
            .store
            .list(filter)?
            .into_iter()
            .map(|t| self.lifecycle.observe(t, now))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(TicketPage { tickets, total })
    }

    /// Change amount and/or expiry of one of the caller's active tickets.
    pub fn update(
        &self,
        id: &str,
        caller: &str,
        patch: TicketPatch,
    ) -> Result<Ticket, TicketError> {
        if patch.is_empty() {
            return Err(TicketError::Validation(
                "at least one of amount or expires_at is required".to_string(),
            ));
        }
        check_expiry(patch.expires_at.as_ref().and_then(Option::as_ref))?;

        let now = Utc::now();
        let previous = self.lifecycle.observe(self.load_owned(id, caller)?, now)?;
        if previous.status != TicketStatus::Active {
            return Err(not_active_error(&previous, "update"));
        }

        match self.store.update_fields(id, &patch, now)? {
            Some(ticket) => {
                info!(ticket_id = %ticket.id, updated_by = %caller, "Ticket updated");
                self.emit(AuditEvent::TicketUpdated {
                    ticket: ticket.clone(),
                    previous,
                    updated_by: caller.to_string(),
                });
                Ok(ticket)
            }
            None => {
                // Redeemed, expired or deleted between our read and write.
                let current = self
                    .store
                    .get(id)?
                    .ok_or_else(|| TicketError::NotFound(id.to_string()))?;
                Err(not_active_error(&current, "update"))
            }
        }
    }

    /// Soft-delete one of the caller's tickets. Its code is never reissued.
    pub fn delete(&self, id: &str, caller: &str) -> Result<Ticket, TicketError> {
        self.load_owned(id, caller)?;

        let snapshot = self
            .store
            .soft_delete(id, Utc::now())?
            .ok_or_else(|| TicketError::NotFound(id.to_string()))?;

        info!(
            ticket_id = %snapshot.id,
            code = %snapshot.code,
            deleted_by = %caller,
            "Ticket deleted"
        );
        self.emit(AuditEvent::TicketDeleted {
            ticket_id: snapshot.id.clone(),
            code: snapshot.code.clone(),
            owner_id: snapshot.owner_id.clone(),
            deleted_by: caller.to_string(),
            snapshot: snapshot.clone(),
        });
        Ok(snapshot)
    }

    /// Redeem by code. Any authenticated caller may redeem.
    pub fn redeem(&self, code: &str, caller: &str) -> Result<Ticket, TicketError> {
        self.redemption.redeem(code, caller)
    }

    /// Expire every active ticket whose expiry has been reached at `now`.
    /// Returns how many of the due tickets ended up expired.
    pub fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize, TicketError> {
        let mut expired = 0;
        loop {
            let due = self.store.due_for_expiry(now, SWEEP_BATCH)?;
            if due.is_empty() {
                break;
            }
            let batch_len = due.len();
            for id in due {
                let ticket = self.lifecycle.expire(&id, now)?;
                if ticket.status == TicketStatus::Expired {
                    expired += 1;
                }
            }
            if (batch_len as i64) < SWEEP_BATCH {
                break;
            }
        }

        if expired > 0 {
            info!(count = expired, "Expiry sweep completed");
        }
        Ok(expired)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedTicketStore;
    use chrono::Duration;
    use tokio::sync::mpsc;

    fn service_with(store: Arc<ScriptedTicketStore>) -> TicketService {
        TicketService::new(store, &TicketConfig::default()).unwrap()
    }

    fn service() -> (Arc<ScriptedTicketStore>, TicketService) {
        let store = Arc::new(ScriptedTicketStore::in_memory());
        (store.clone(), service_with(store))
    }

    fn request(owner: &str, amount: &str) -> CreateTicketRequest {
        CreateTicketRequest {
            owner_id: owner.to_string(),
            amount: amount.parse().unwrap(),
            expires_at: None,
        }
    }

    #[test]
    fn test_create_issues_active_ticket() {
        let (_, service) = service();
        let ticket = service.create(request("alice", "50.00")).unwrap();

        assert_eq!(ticket.status, TicketStatus::Active);
        assert_eq!(ticket.owner_id, "alice");
        assert_eq!(ticket.amount.to_string(), "50.00");
        assert!(service.codes().is_valid(&ticket.code));
    }

    #[test]
    fn test_create_requires_owner() {
        let (_, service) = service();
        assert!(matches!(
            service.create(request("  ", "1.00")),
            Err(TicketError::Validation(_))
        ));
    }

    #[test]
    fn test_create_retries_after_insert_conflict() {
        let (store, service) = service();
        store.fail_inserts_with_duplicate(2);

        let ticket = service.create(request("alice", "5.00")).unwrap();
        assert_eq!(store.insert_attempts(), 3);
        assert!(store.get(&ticket.id).unwrap().is_some());
    }

    #[test]
    fn test_create_gives_up_after_budget() {
        let store = Arc::new(ScriptedTicketStore::in_memory());
        let config = TicketConfig {
            max_code_attempts: 3,
            ..TicketConfig::default()
        };
        let service = TicketService::new(store.clone(), &config).unwrap();
        store.fail_inserts_with_duplicate(u32::MAX);

        assert_eq!(
            service.create(request("alice", "5.00")),
            Err(TicketError::GenerationExhausted { attempts: 3 })
        );
        assert_eq!(store.insert_attempts(), 3);
    }

    #[test]
    fn test_get_enforces_ownership() {
        let (_, service) = service();
        let ticket = service.create(request("alice", "50.00")).unwrap();

        assert!(service.get(&ticket.id, "alice").is_ok());
        assert!(matches!(
            service.get(&ticket.id, "bob"),
            Err(TicketError::Forbidden { .. })
        ));
        assert!(matches!(
            service.get("missing", "alice"),
            Err(TicketError::NotFound(_))
        ));
    }

    #[test]
    fn test_get_applies_lazy_expiry() {
        let (_, service) = service();
        let mut req = request("alice", "50.00");
        req.expires_at = Some(Utc::now() - Duration::seconds(1));
        let ticket = service.create(req).unwrap();

        let seen = service.get(&ticket.id, "alice").unwrap();
        assert_eq!(seen.status, TicketStatus::Expired);
    }

    #[test]
    fn test_list_with_total() {
        let (_, service) = service();
        for _ in 0..3 {
            service.create(request("alice", "1.00")).unwrap();
        }
        service.create(request("bob", "1.00")).unwrap();

        let page = service
            .list(&TicketFilter::new().with_owner("alice").with_limit(2))
            .unwrap();
        assert_eq!(page.tickets.len(), 2);
        assert_eq!(page.total, 3);
    }

    #[test]
    fn test_list_never_shows_past_expiry_as_active() {
        let (_, service) = service();
        let mut req = request("alice", "1.00");
        req.expires_at = Some(Utc::now() - Duration::seconds(1));
        service.create(req).unwrap();

        let page = service.list(&TicketFilter::new()).unwrap();
        assert_eq!(page.tickets[0].status, TicketStatus::Expired);
    }

    #[test]
    fn test_update_amount_and_expiry() {
        let (_, service) = service();
        let ticket = service.create(request("alice", "50.00")).unwrap();
        let expiry = Utc::now() + Duration::days(7);

        let updated = service
            .update(
                &ticket.id,
                "alice",
                TicketPatch {
                    amount: Some("75.50".parse().unwrap()),
                    expires_at: Some(Some(expiry)),
                },
            )
            .unwrap();

        assert_eq!(updated.amount.to_string(), "75.50");
        assert_eq!(updated.code, ticket.code);
        assert_eq!(updated.status, TicketStatus::Active);
    }

    #[test]
    fn test_unreadable_expiry_is_rejected() {
        let (store, service) = service();
        let far: DateTime<Utc> = serde_json::from_str("\"+10000-01-01T00:00:00Z\"").unwrap();

        let mut req = request("alice", "5.00");
        req.expires_at = Some(far);
        assert!(matches!(service.create(req), Err(TicketError::Validation(_))));
        assert_eq!(store.count(&TicketFilter::new()).unwrap(), 0);

        let ticket = service.create(request("alice", "5.00")).unwrap();
        let patch = TicketPatch {
            amount: None,
            expires_at: Some(Some(far)),
        };
        assert!(matches!(
            service.update(&ticket.id, "alice", patch),
            Err(TicketError::Validation(_))
        ));

        // Reads and the sweep keep working.
        assert!(service.get(&ticket.id, "alice").unwrap().expires_at.is_none());
        assert_eq!(service.list(&TicketFilter::new()).unwrap().total, 1);
        assert_eq!(service.sweep_expired(Utc::now()).unwrap(), 0);
    }

    #[test]
    fn test_update_rejects_empty_patch() {
        let (_, service) = service();
        let ticket = service.create(request("alice", "50.00")).unwrap();

        assert!(matches!(
            service.update(&ticket.id, "alice", TicketPatch::default()),
            Err(TicketError::Validation(_))
        ));
    }

    #[test]
    fn test_update_rejects_non_owner_and_terminal() {
        let (_, service) = service();
        let ticket = service.create(request("alice", "50.00")).unwrap();
        let patch = TicketPatch {
            amount: Some("1.00".parse().unwrap()),
            ..Default::default()
        };

        assert!(matches!(
            service.update(&ticket.id, "bob", patch.clone()),
            Err(TicketError::Forbidden { .. })
        ));

        service.redeem(&ticket.code, "bob").unwrap();
        assert!(matches!(
            service.update(&ticket.id, "alice", patch),
            Err(TicketError::InvalidState { .. })
        ));
    }

    #[test]
    fn test_delete_hides_ticket() {
        let (store, service) = service();
        let ticket = service.create(request("alice", "50.00")).unwrap();

        assert!(matches!(
            service.delete(&ticket.id, "bob"),
            Err(TicketError::Forbidden { .. })
        ));

        let snapshot = service.delete(&ticket.id, "alice").unwrap();
        assert_eq!(snapshot.id, ticket.id);

        assert!(matches!(
            service.get(&ticket.id, "alice"),
            Err(TicketError::NotFound(_))
        ));
        assert!(matches!(
            service.redeem(&ticket.code, "bob"),
            Err(TicketError::NotFound(_))
        ));
        assert!(store.code_exists(&ticket.code).unwrap());
    }

    #[test]
    fn test_sweep_expires_due_tickets() {
        let (_, service) = service();
        let now = Utc::now();

        let mut due = request("alice", "1.00");
        due.expires_at = Some(now - Duration::minutes(1));
        let due = service.create(due).unwrap();

        let mut later = request("alice", "1.00");
        later.expires_at = Some(now + Duration::hours(1));
        let later = service.create(later).unwrap();

        assert_eq!(service.sweep_expired(now).unwrap(), 1);
        assert_eq!(service.sweep_expired(now).unwrap(), 0);

        assert_eq!(
            service.get(&due.id, "alice").unwrap().status,
            TicketStatus::Expired
        );
        assert_eq!(
            service.get(&later.id, "alice").unwrap().status,
            TicketStatus::Active
        );
    }

    #[test]
    fn test_lifecycle_events_emitted() {
        let store = Arc::new(ScriptedTicketStore::in_memory());
        let (tx, mut rx) = mpsc::channel(16);
        let service = service_with(store).with_audit(AuditHandle::new(tx));

        let ticket = service.create(request("alice", "50.00")).unwrap();
        service
            .update(
                &ticket.id,
                "alice",
                TicketPatch {
                    amount: Some("60.00".parse().unwrap()),
                    ..Default::default()
                },
            )
            .unwrap();
        service.redeem(&ticket.code, "bob").unwrap();
        service.delete(&ticket.id, "alice").unwrap();

        let types: Vec<&str> = std::iter::from_fn(|| rx.try_recv().ok())
            .map(|e| e.event.event_type())
            .collect();
        assert_eq!(
            types,
            vec![
                "ticket_created",
                "ticket_updated",
                "ticket_redeemed",
                "ticket_deleted"
            ]
        );
    }

    #[test]
    fn test_update_event_carries_previous_snapshot() {
        let store = Arc::new(ScriptedTicketStore::in_memory());
        let (tx, mut rx) = mpsc::channel(16);
        let service = service_with(store).with_audit(AuditHandle::new(tx));

        let ticket = service.create(request("alice", "50.00")).unwrap();
        rx.try_recv().unwrap();

        service
            .update(
                &ticket.id,
                "alice",
                TicketPatch {
                    amount: Some("60.00".parse().unwrap()),
                    ..Default::default()
                },
            )
            .unwrap();

        match rx.try_recv().unwrap().event {
            AuditEvent::TicketUpdated {
                ticket, previous, ..
            } => {
                assert_eq!(previous.amount.to_string(), "50.00");
                assert_eq!(ticket.amount.to_string(), "60.00");
            }
            other => panic!("unexpected event {:?}", other),
        }
    }
}
