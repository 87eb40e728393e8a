use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Every caller is the same anonymous principal.
///
/// All tickets then share one owner, and rate limiting falls back to
/// origin and user agent. Must be configured explicitly.
#[derive(Debug, Default)]
pub struct NoneAuthenticator;

impl NoneAuthenticator {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Authenticator for NoneAuthenticator {
    async fn authenticate(&self, _request: &AuthRequest) -> Result<Identity, AuthError> {
        Ok(Identity::anonymous())
    }

    fn method_name(&self) -> &'static str {
        "none"
    }
}
