//! Reservation tickets: issuance, lifecycle and single-use redemption.

mod code;
mod lifecycle;
mod redemption;
mod service;
mod sqlite_store;
mod store;
mod types;

pub use code::{CodeGenerator, CODE_RANDOM_LEN};
pub use lifecycle::{ensure_transition, is_due, not_active_error, TicketLifecycle};
pub use redemption::RedemptionCoordinator;
pub use service::{TicketPage, TicketService};
pub use sqlite_store::SqliteTicketStore;
pub use store::{
    CreateTicketRequest, ErrorKind, NewTicket, TicketError, TicketFilter, TicketPatch, TicketStore,
};
pub use types::{Amount, AmountError, Ticket, TicketStatus};
