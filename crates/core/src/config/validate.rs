use super::{types::Config, AuthMethod, ConfigError};

/// Validate configuration semantics that serde cannot express.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::Invalid(
            "server.port cannot be 0".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::ApiKey && config.auth.api_keys.is_empty() {
        return Err(ConfigError::Invalid(
            "auth.api_keys must contain at least one key when method = \"api_key\"".to_string(),
        ));
    }

    if config.auth.method == AuthMethod::TrustedHeader && config.auth.user_header.trim().is_empty()
    {
        return Err(ConfigError::Invalid(
            "auth.user_header cannot be empty".to_string(),
        ));
    }

    let prefix = &config.tickets.code_prefix;
    if prefix.is_empty()
        || !prefix
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
    {
        return Err(ConfigError::Invalid(format!(
            "tickets.code_prefix must be non-empty uppercase alphanumeric, got {:?}",
            prefix
        )));
    }

    if config.tickets.max_code_attempts == 0 {
        return Err(ConfigError::Invalid(
            "tickets.max_code_attempts must be at least 1".to_string(),
        ));
    }

    if config.tickets.sweep_interval_secs == Some(0) {
        return Err(ConfigError::Invalid(
            "tickets.sweep_interval_secs cannot be 0".to_string(),
        ));
    }

    let rl = &config.rate_limit;
    if rl.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "rate_limit.max_attempts must be at least 1".to_string(),
        ));
    }
    if rl.decay_secs == 0 {
        return Err(ConfigError::Invalid(
            "rate_limit.decay_secs must be at least 1".to_string(),
        ));
    }
    if rl.backoff_cap == 0 {
        return Err(ConfigError::Invalid(
            "rate_limit.backoff_cap must be at least 1".to_string(),
        ));
    }

    if config.audit.buffer_size == 0 {
        return Err(ConfigError::Invalid(
            "audit.buffer_size must be at least 1".to_string(),
        ));
    }

    Ok(())
}
