//! Identity resolved upstream and forwarded in a header.

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator for deployments behind a gateway that has already
/// authenticated the caller and forwards the user id in a header.
pub struct TrustedHeaderAuthenticator {
    header: String,
}

impl TrustedHeaderAuthenticator {
    pub fn new(header: impl Into<String>) -> Self {
        Self {
            header: header.into().to_lowercase(),
        }
    }
}

#[async_trait]
impl Authenticator for TrustedHeaderAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        request
            .header(&self.header)
            .map(|user_id| Identity::user(user_id, "trusted_header"))
            .ok_or(AuthError::NotAuthenticated)
    }

    fn method_name(&self) -> &'static str {
        "trusted_header"
    }
}
