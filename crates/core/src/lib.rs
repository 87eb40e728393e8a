pub mod audit;
pub mod auth;
pub mod config;
pub mod db;
pub mod metrics;
pub mod rate_limit;
pub mod testing;
pub mod ticket;

pub use audit::{
    create_audit_system, AuditError, AuditEvent, AuditEventEnvelope, AuditFilter, AuditHandle,
    AuditRecord, AuditStore, AuditWriter, SqliteAuditStore,
};
pub use auth::{
    create_authenticator, AuthError, AuthRequest, Authenticator, Identity, NoneAuthenticator,
};
pub use config::{
    config_path, load_config, load_config_from_str, validate_config, AuthMethod, Config,
    ConfigError, FailurePolicy, RateLimitConfig, SanitizedConfig,
};
pub use rate_limit::{
    create_mirror, resolve_key, Admission, CounterStore, InMemoryCounterStore, MirrorHandle,
    MirrorWriter, RateLimitError, RateLimitLog, RateLimitPolicy, RateLimiter, SqliteRateLimitLog,
    DEFAULT_MIRROR_BUFFER,
};
pub use ticket::{
    Amount, CodeGenerator, CreateTicketRequest, ErrorKind, RedemptionCoordinator,
    SqliteTicketStore, Ticket, TicketError, TicketFilter, TicketLifecycle, TicketPage,
    TicketPatch, TicketService, TicketStatus, TicketStore,
};
