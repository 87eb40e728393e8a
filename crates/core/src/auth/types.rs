use std::collections::HashMap;
use std::net::IpAddr;

/// What an authenticator gets to see of an HTTP request.
#[derive(Debug, Clone)]
pub struct AuthRequest {
    /// Header names are lowercased.
    pub headers: HashMap<String, String>,
    pub source_ip: IpAddr,
}

impl AuthRequest {
    /// Trimmed, non-empty header value. `name` must be lowercase.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .map(|v| v.trim())
            .filter(|v| !v.is_empty())
    }
}

/// The caller a request acts for.
///
/// `user_id` becomes the owner of issued tickets and, unless anonymous,
/// the first component of the caller's rate-limit key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    /// Name of the authenticator that resolved it.
    pub method: &'static str,
}

impl Identity {
    pub const ANONYMOUS: &'static str = "anonymous";

    pub fn anonymous() -> Self {
        Self {
            user_id: Self::ANONYMOUS.to_string(),
            method: "none",
        }
    }

    pub fn user(user_id: impl Into<String>, method: &'static str) -> Self {
        Self {
            user_id: user_id.into(),
            method,
        }
    }

    /// True when no principal was resolved for the request.
    pub fn is_anonymous(&self) -> bool {
        self.method == "none"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_anonymous_identity() {
        let identity = Identity::anonymous();
        assert_eq!(identity.user_id, "anonymous");
        assert!(identity.is_anonymous());
    }

    #[test]
    fn test_user_named_anonymous_is_still_a_user() {
        let identity = Identity::user("anonymous", "api_key");
        assert!(!identity.is_anonymous());
    }

    #[test]
    fn test_header_lookup_trims_and_skips_blank() {
        let request = AuthRequest {
            headers: [
                ("x-user-id".to_string(), "  bob ".to_string()),
                ("x-api-key".to_string(), "   ".to_string()),
            ]
            .into(),
            source_ip: IpAddr::from([127, 0, 0, 1]),
        };

        assert_eq!(request.header("x-user-id"), Some("bob"));
        assert_eq!(request.header("x-api-key"), None);
        assert_eq!(request.header("authorization"), None);
    }
}
