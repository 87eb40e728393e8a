use async_trait::async_trait;
use thiserror::Error;

use super::types::{AuthRequest, Identity};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Authentication required")]
    NotAuthenticated,

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Authenticator misconfigured: {0}")]
    ConfigurationError(String),
}

impl AuthError {
    /// Label for the auth failure metric.
    pub fn reason(&self) -> &'static str {
        match self {
            AuthError::NotAuthenticated => "not_authenticated",
            AuthError::InvalidCredentials(_) => "invalid_credentials",
            AuthError::ConfigurationError(_) => "configuration_error",
        }
    }

    /// Whether the caller can fix this by sending other credentials.
    pub fn is_client_error(&self) -> bool {
        !matches!(self, AuthError::ConfigurationError(_))
    }
}

/// Resolves who is calling. Runs before rate limiting on every protected route.
#[async_trait]
pub trait Authenticator: Send + Sync {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError>;

    /// Name of this authentication method
    fn method_name(&self) -> &'static str;
}
