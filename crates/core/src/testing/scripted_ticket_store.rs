//! Ticket store double with scriptable failures.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::ticket::{
    NewTicket, SqliteTicketStore, Ticket, TicketError, TicketFilter, TicketPatch, TicketStore,
};

/// Wraps a real [`TicketStore`] and injects failures on demand.
///
/// ```rust,ignore
/// let store = ScriptedTicketStore::in_memory();
/// store.report_codes_taken(3);          // first three candidates collide
/// store.fail_inserts_with_duplicate(1); // first insert loses a race
/// store.simulate_competing_redeemer();  // next redeem loses to a rival
/// store.set_unavailable(true);          // every call fails
/// ```
pub struct ScriptedTicketStore {
    inner: Arc<dyn TicketStore>,
    codes_taken: AtomicU32,
    duplicate_inserts: AtomicU32,
    competing_redeemer: AtomicBool,
    unavailable: AtomicBool,
    code_checks: AtomicU32,
    insert_attempts: AtomicU32,
}

impl ScriptedTicketStore {
    pub fn new(inner: Arc<dyn TicketStore>) -> Self {
        Self {
            inner,
            codes_taken: AtomicU32::new(0),
            duplicate_inserts: AtomicU32::new(0),
            competing_redeemer: AtomicBool::new(false),
            unavailable: AtomicBool::new(false),
            code_checks: AtomicU32::new(0),
            insert_attempts: AtomicU32::new(0),
        }
    }

    /// Backed by a fresh in-memory SQLite store.
    pub fn in_memory() -> Self {
        let inner = SqliteTicketStore::in_memory().expect("in-memory ticket store");
        Self::new(Arc::new(inner))
    }

    /// The next `n` existence checks report the code as taken.
    pub fn report_codes_taken(&self, n: u32) {
        self.codes_taken.store(n, Ordering::SeqCst);
    }

    /// The next `n` inserts fail with `DuplicateCode` without touching storage.
    pub fn fail_inserts_with_duplicate(&self, n: u32) {
        self.duplicate_inserts.store(n, Ordering::SeqCst);
    }

    /// The next redeem write is preceded by an identical write from a rival.
    pub fn simulate_competing_redeemer(&self) {
        self.competing_redeemer.store(true, Ordering::SeqCst);
    }

    /// Make every operation fail with a database error.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    pub fn code_checks(&self) -> u32 {
        self.code_checks.load(Ordering::SeqCst)
    }

    pub fn insert_attempts(&self) -> u32 {
        self.insert_attempts.load(Ordering::SeqCst)
    }

    fn check_available(&self) -> Result<(), TicketError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(TicketError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    /// Decrement a counter if positive. Returns whether it was.
    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl TicketStore for ScriptedTicketStore {
    fn insert(&self, ticket: NewTicket) -> Result<Ticket, TicketError> {
        self.check_available()?;
        self.insert_attempts.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.duplicate_inserts) {
            return Err(TicketError::DuplicateCode(ticket.code));
        }
        self.inner.insert(ticket)
    }

    fn code_exists(&self, code: &str) -> Result<bool, TicketError> {
        self.check_available()?;
        self.code_checks.fetch_add(1, Ordering::SeqCst);
        if Self::take(&self.codes_taken) {
            return Ok(true);
        }
        self.inner.code_exists(code)
    }

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError> {
        self.check_available()?;
        self.inner.get(id)
    }

    fn get_by_code(&self, code: &str) -> Result<Option<Ticket>, TicketError> {
        self.check_available()?;
        self.inner.get_by_code(code)
    }

    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError> {
        self.check_available()?;
        self.inner.list(filter)
    }

    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError> {
        self.check_available()?;
        self.inner.count(filter)
    }

    fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Ticket>, TicketError> {
        self.check_available()?;
        self.inner.mark_expired(id, now)
    }

    fn mark_redeemed(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, TicketError> {
        self.check_available()?;
        if self.competing_redeemer.swap(false, Ordering::SeqCst) {
            self.inner.mark_redeemed(code, now)?;
        }
        self.inner.mark_redeemed(code, now)
    }

    fn update_fields(
        &self,
        id: &str,
        patch: &TicketPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, TicketError> {
        self.check_available()?;
        self.inner.update_fields(id, patch, now)
    }

    fn soft_delete(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Ticket>, TicketError> {
        self.check_available()?;
        self.inner.soft_delete(id, now)
    }

    fn due_for_expiry(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, TicketError> {
        self.check_available()?;
        self.inner.due_for_expiry(now, limit)
    }
}
