use std::sync::Arc;

use brt_core::{AuditStore, Authenticator, Config, RateLimiter, SanitizedConfig, TicketService};

/// Shared application state
pub struct AppState {
    config: Config,
    authenticator: Arc<dyn Authenticator>,
    audit_store: Arc<dyn AuditStore>,
    tickets: TicketService,
    rate_limiter: RateLimiter,
}

impl AppState {
    pub fn new(
        config: Config,
        authenticator: Arc<dyn Authenticator>,
        audit_store: Arc<dyn AuditStore>,
        tickets: TicketService,
        rate_limiter: RateLimiter,
    ) -> Self {
        Self {
            config,
            authenticator,
            audit_store,
            tickets,
            rate_limiter,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn authenticator(&self) -> &dyn Authenticator {
        self.authenticator.as_ref()
    }

    pub fn audit_store(&self) -> &dyn AuditStore {
        self.audit_store.as_ref()
    }

    pub fn tickets(&self) -> &TicketService {
        &self.tickets
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.rate_limiter
    }
}
