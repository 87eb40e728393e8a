//! API Key authentication.

use std::collections::HashMap;

use async_trait::async_trait;

use super::{AuthError, AuthRequest, Authenticator, Identity};

/// Authenticator that maps configured API keys to user ids.
///
/// Accepts the key in either:
/// - `Authorization: Bearer <key>` header
/// - `X-API-Key: <key>` header
pub struct ApiKeyAuthenticator {
    /// API key -> user id.
    keys: HashMap<String, String>,
}

impl ApiKeyAuthenticator {
    pub fn new(keys: HashMap<String, String>) -> Self {
        Self { keys }
    }

    /// Bearer token first, then `x-api-key`.
    fn extract_key<'a>(&self, request: &'a AuthRequest) -> Option<&'a str> {
        let bearer = request.header("authorization").and_then(|value| {
            let (scheme, token) = value.split_once(' ')?;
            scheme.eq_ignore_ascii_case("bearer").then_some(token.trim())
        });
        bearer
            .filter(|token| !token.is_empty())
            .or_else(|| request.header("x-api-key"))
    }
}

#[async_trait]
impl Authenticator for ApiKeyAuthenticator {
    async fn authenticate(&self, request: &AuthRequest) -> Result<Identity, AuthError> {
        let provided_key = self
            .extract_key(request)
            .ok_or(AuthError::NotAuthenticated)?;

        // Compare against every key so timing doesn't reveal which one matched.
        let mut matched: Option<&String> = None;
        for (key, user_id) in &self.keys {
            if constant_time_eq(provided_key.as_bytes(), key.as_bytes()) {
                matched = Some(user_id);
            }
        }

        match matched {
            Some(user_id) => Ok(Identity::user(user_id.clone(), "api_key")),
            None => Err(AuthError::InvalidCredentials("Invalid API key".to_string())),
        }
    }

    fn method_name(&self) -> &'static str {
        "api_key"
    }
}

/// Constant-time byte comparison to prevent timing attacks.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        result |= x ^ y;
    }
    result == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::IpAddr;

    fn make_auth() -> ApiKeyAuthenticator {
        let mut keys = HashMap::new();
        keys.insert("secret-key-123".to_string(), "alice".to_string());
        keys.insert("other-key-456".to_string(), "bob".to_string());
        ApiKeyAuthenticator::new(keys)
    }

    fn make_request(headers: Vec<(&str, &str)>) -> AuthRequest {
        AuthRequest {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.to_lowercase(), v.to_string()))
                .collect(),
            source_ip: "127.0.0.1".parse::<IpAddr>().unwrap(),
        }
    }

    #[tokio::test]
    async fn test_bearer_token_valid() {
        let request = make_request(vec![("Authorization", "Bearer secret-key-123")]);
        let identity = make_auth().authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "alice");
        assert_eq!(identity.method, "api_key");
    }

    #[tokio::test]
    async fn test_x_api_key_header_maps_to_user() {
        let request = make_request(vec![("X-API-Key", "other-key-456")]);
        let identity = make_auth().authenticate(&request).await.unwrap();

        assert_eq!(identity.user_id, "bob");
    }

    #[tokio::test]
    async fn test_invalid_key() {
        let request = make_request(vec![("Authorization", "Bearer wrong-key")]);
        let result = make_auth().authenticate(&request).await;

        assert!(matches!(result, Err(AuthError::InvalidCredentials(_))));
    }

    #[tokio::test]
    async fn test_missing_header() {
        let result = make_auth().authenticate(&make_request(vec![])).await;
        assert!(matches!(result, Err(AuthError::NotAuthenticated)));
    }

    #[tokio::test]
    async fn test_bearer_lowercase() {
        let request = make_request(vec![("Authorization", "bearer secret-key-123")]);
        let identity = make_auth().authenticate(&request).await.unwrap();
        assert_eq!(identity.user_id, "alice");
    }

    #[tokio::test]
    async fn test_other_scheme_falls_back_to_x_api_key() {
        let request = make_request(vec![
            ("Authorization", "Basic YWxpY2U6cHc="),
            ("X-API-Key", "other-key-456"),
        ]);
        let identity = make_auth().authenticate(&request).await.unwrap();
        assert_eq!(identity.user_id, "bob");
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"hello", b"hello"));
        assert!(!constant_time_eq(b"hello", b"world"));
        assert!(!constant_time_eq(b"hello", b"hell"));
        assert!(!constant_time_eq(b"", b"x"));
        assert!(constant_time_eq(b"", b""));
    }
}
