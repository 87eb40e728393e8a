use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::path::PathBuf;

/// Root configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub auth: AuthConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub tickets: TicketConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub audit: AuditConfig,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::UNSPECIFIED)
}

fn default_port() -> u16 {
    8080
}

/// Authentication configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    pub method: AuthMethod,
    /// API key -> user id (required when method = "api_key").
    #[serde(default)]
    pub api_keys: HashMap<String, String>,
    /// Header carrying the caller's user id (method = "trusted_header").
    #[serde(default = "default_user_header")]
    pub user_header: String,
}

fn default_user_header() -> String {
    "x-user-id".to_string()
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    None,
    ApiKey,
    /// Identity already resolved by an upstream gateway.
    TrustedHeader,
}

impl AuthMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthMethod::None => "none",
            AuthMethod::ApiKey => "api_key",
            AuthMethod::TrustedHeader => "trusted_header",
        }
    }
}

/// Database configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: PathBuf,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

fn default_db_path() -> PathBuf {
    PathBuf::from("brt.db")
}

/// Ticket issuance configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TicketConfig {
    /// Prefix placed before the random part of every code.
    #[serde(default = "default_code_prefix")]
    pub code_prefix: String,
    /// How many candidate codes to try before giving up.
    #[serde(default = "default_max_code_attempts")]
    pub max_code_attempts: u32,
    /// Interval of the background expiry sweep (None = lazy expiry only).
    #[serde(default)]
    pub sweep_interval_secs: Option<u64>,
}

impl Default for TicketConfig {
    fn default() -> Self {
        Self {
            code_prefix: default_code_prefix(),
            max_code_attempts: default_max_code_attempts(),
            sweep_interval_secs: None,
        }
    }
}

fn default_code_prefix() -> String {
    "BRT".to_string()
}

fn default_max_code_attempts() -> u32 {
    10
}

/// Admission control for the issue/redeem endpoints
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_decay_secs")]
    pub decay_secs: u64,
    /// Attempt count above which denials back off exponentially.
    #[serde(default = "default_backoff_threshold")]
    pub backoff_threshold: u32,
    /// Upper bound on the backoff multiplier.
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap: u32,
    #[serde(default)]
    pub on_store_error: FailurePolicy,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_attempts: default_max_attempts(),
            decay_secs: default_decay_secs(),
            backoff_threshold: default_backoff_threshold(),
            backoff_cap: default_backoff_cap(),
            on_store_error: FailurePolicy::default(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_max_attempts() -> u32 {
    5
}

fn default_decay_secs() -> u64 {
    60
}

fn default_backoff_threshold() -> u32 {
    5
}

fn default_backoff_cap() -> u32 {
    60
}

/// What the rate limiter does when its counter store cannot be reached.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Deny the request.
    #[default]
    FailClosed,
    /// Admit the request.
    FailOpen,
}

/// Audit pipeline configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuditConfig {
    #[serde(default = "default_buffer_size")]
    pub buffer_size: usize,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            buffer_size: default_buffer_size(),
        }
    }
}

fn default_buffer_size() -> usize {
    1000
}

/// Sanitized config for API responses (secrets redacted)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub auth: SanitizedAuthConfig,
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub tickets: TicketConfig,
    pub rate_limit: RateLimitConfig,
    pub audit: AuditConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedAuthConfig {
    pub method: String,
    pub api_keys_configured: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_header: Option<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        Self {
            auth: SanitizedAuthConfig {
                method: config.auth.method.as_str().to_string(),
                api_keys_configured: config.auth.api_keys.len(),
                user_header: match config.auth.method {
                    AuthMethod::TrustedHeader => Some(config.auth.user_header.clone()),
                    _ => None,
                },
            },
            server: config.server.clone(),
            database: config.database.clone(),
            tickets: config.tickets.clone(),
            rate_limit: config.rate_limit.clone(),
            audit: config.audit.clone(),
        }
    }
}
