mod api_key;
mod none;
mod trusted_header;
mod traits;
mod types;

pub use api_key::*;
pub use none::*;
pub use trusted_header::*;
pub use traits::*;
pub use types::*;

use tracing::warn;

use crate::config::{AuthConfig, AuthMethod};

/// Build the authenticator named by `[auth] method`.
pub fn create_authenticator(config: &AuthConfig) -> Result<Box<dyn Authenticator>, AuthError> {
    let authenticator: Box<dyn Authenticator> = match config.method {
        AuthMethod::None => {
            warn!("Authentication disabled: every caller shares one anonymous identity");
            Box::new(NoneAuthenticator::new())
        }
        AuthMethod::ApiKey if config.api_keys.is_empty() => {
            return Err(AuthError::ConfigurationError(
                "method = \"api_key\" needs at least one entry in auth.api_keys".to_string(),
            ));
        }
        AuthMethod::ApiKey => Box::new(ApiKeyAuthenticator::new(config.api_keys.clone())),
        AuthMethod::TrustedHeader => {
            Box::new(TrustedHeaderAuthenticator::new(config.user_header.clone()))
        }
    };
    Ok(authenticator)
}
