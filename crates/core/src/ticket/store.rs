//! Ticket storage trait, error taxonomy and request types.

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use super::{Amount, AmountError, Ticket, TicketStatus};

/// Error type for ticket operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TicketError {
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Ticket not found: {0}")]
    NotFound(String),

    #[error("Ticket {ticket_id} does not belong to {caller}")]
    Forbidden { ticket_id: String, caller: String },

    #[error("Ticket {code} has already been redeemed")]
    AlreadyRedeemed { code: String },

    #[error("Ticket {code} has expired")]
    Expired { code: String },

    #[error("Cannot {operation} ticket {ticket_id}: current state is {current_state}")]
    InvalidState {
        ticket_id: String,
        current_state: String,
        operation: String,
    },

    /// A uniqueness violation on the code column. Retried internally during
    /// issuance and never surfaced to callers as-is.
    #[error("Ticket code already in use: {0}")]
    DuplicateCode(String),

    #[error("Could not generate a unique ticket code after {attempts} attempts")]
    GenerationExhausted { attempts: u32 },

    #[error("Database error: {0}")]
    Database(String),
}

/// Coarse classification used by transport layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationFailed,
    NotFound,
    Forbidden,
    Conflict,
    Internal,
}

impl TicketError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            TicketError::Validation(_) => ErrorKind::ValidationFailed,
            TicketError::NotFound(_) => ErrorKind::NotFound,
            TicketError::Forbidden { .. } => ErrorKind::Forbidden,
            TicketError::AlreadyRedeemed { .. }
            | TicketError::Expired { .. }
            | TicketError::InvalidState { .. } => ErrorKind::Conflict,
            TicketError::DuplicateCode(_)
            | TicketError::GenerationExhausted { .. }
            | TicketError::Database(_) => ErrorKind::Internal,
        }
    }

    /// Stable machine-readable reason, finer grained than [`ErrorKind`].
    pub fn reason(&self) -> &'static str {
        match self {
            TicketError::Validation(_) => "validation_failed",
            TicketError::NotFound(_) => "not_found",
            TicketError::Forbidden { .. } => "forbidden",
            TicketError::AlreadyRedeemed { .. } => "already_redeemed",
            TicketError::Expired { .. } => "expired",
            TicketError::InvalidState { .. } => "invalid_state",
            TicketError::DuplicateCode(_)
            | TicketError::GenerationExhausted { .. }
            | TicketError::Database(_) => "internal",
        }
    }
}

impl From<AmountError> for TicketError {
    fn from(err: AmountError) -> Self {
        TicketError::Validation(err.to_string())
    }
}

/// Request to issue a new ticket. The code is chosen by the service.
#[derive(Debug, Clone)]
pub struct CreateTicketRequest {
    pub owner_id: String,
    pub amount: Amount,
    pub expires_at: Option<DateTime<Utc>>,
}

/// A fully specified ticket row, ready to be inserted.
#[derive(Debug, Clone)]
pub struct NewTicket {
    pub code: String,
    pub owner_id: String,
    pub amount: Amount,
    pub expires_at: Option<DateTime<Utc>>,
}

/// Non-status fields a holder may change while the ticket is active.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TicketPatch {
    pub amount: Option<Amount>,
    /// `Some(None)` clears the expiry.
    pub expires_at: Option<Option<DateTime<Utc>>>,
}

impl TicketPatch {
    pub fn is_empty(&self) -> bool {
        self.amount.is_none() && self.expires_at.is_none()
    }
}

/// Filter for querying tickets. Soft-deleted tickets are never returned.
#[derive(Debug, Clone)]
pub struct TicketFilter {
    pub status: Option<TicketStatus>,
    pub owner_id: Option<String>,
    /// Case-insensitive substring match on the code.
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for TicketFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl TicketFilter {
    pub const DEFAULT_LIMIT: i64 = 15;
    pub const MAX_LIMIT: i64 = 100;

    pub fn new() -> Self {
        Self {
            status: None,
            owner_id: None,
            search: None,
            limit: Self::DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: TicketStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_owner(mut self, owner_id: impl Into<String>) -> Self {
        self.owner_id = Some(owner_id.into());
        self
    }

    pub fn with_search(mut self, search: impl Into<String>) -> Self {
        self.search = Some(search.into());
        self
    }

    /// Set limit, clamped to `1..=MAX_LIMIT`.
    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = limit.clamp(1, Self::MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset.max(0);
        self
    }
}

/// Trait for ticket storage backends.
///
/// Every state-changing method is a single conditional write: it applies only
/// when the stored row still satisfies the precondition, and returns `None`
/// when it did not (another writer got there first, or the row is gone).
pub trait TicketStore: Send + Sync {
    /// Insert a new active ticket. Fails with `DuplicateCode` when the code is
    /// already taken, including by a deleted ticket.
    fn insert(&self, ticket: NewTicket) -> Result<Ticket, TicketError>;

    /// Whether any ticket, deleted or not, already uses this code.
    fn code_exists(&self, code: &str) -> Result<bool, TicketError>;

    fn get(&self, id: &str) -> Result<Option<Ticket>, TicketError>;

    fn get_by_code(&self, code: &str) -> Result<Option<Ticket>, TicketError>;

    /// List tickets matching the filter, newest first.
    fn list(&self, filter: &TicketFilter) -> Result<Vec<Ticket>, TicketError>;

    /// Count tickets matching the filter (ignores limit/offset).
    fn count(&self, filter: &TicketFilter) -> Result<i64, TicketError>;

    /// Active -> Expired, only if the expiry has been reached at `now`.
    fn mark_expired(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Ticket>, TicketError>;

    /// Active -> Redeemed by code, only if not yet expired at `now`.
    fn mark_redeemed(&self, code: &str, now: DateTime<Utc>)
        -> Result<Option<Ticket>, TicketError>;

    /// Apply a patch, only while the ticket is active.
    fn update_fields(
        &self,
        id: &str,
        patch: &TicketPatch,
        now: DateTime<Utc>,
    ) -> Result<Option<Ticket>, TicketError>;

    /// Hide a ticket from every read path. Its code stays reserved.
    /// Returns the last snapshot.
    fn soft_delete(&self, id: &str, now: DateTime<Utc>) -> Result<Option<Ticket>, TicketError>;

    /// Ids of active tickets whose expiry has been reached at `now`.
    fn due_for_expiry(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<String>, TicketError>;
}
