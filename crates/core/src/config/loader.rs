use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::{Path, PathBuf};

use super::{types::Config, ConfigError};

/// Names the config file; read by the binary, never merged into the config.
pub const CONFIG_PATH_ENV: &str = "BRT_CONFIG";

const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Where the binary looks for its configuration file.
pub fn config_path() -> PathBuf {
    std::env::var_os(CONFIG_PATH_ENV)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Read `path`, then layer `BRT_*` environment overrides on top.
///
/// Nested keys use a double underscore, e.g. `BRT_RATE_LIMIT__MAX_ATTEMPTS=10`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    if !path.is_file() {
        return Err(ConfigError::NotFound(path.display().to_string()));
    }

    Figment::new()
        .merge(Toml::file(path))
        .merge(Env::prefixed("BRT_").ignore(&["config"]).split("__"))
        .extract()
        .map_err(|e| ConfigError::Malformed(e.to_string()))
}

/// Parse a config from TOML text, without environment overrides.
pub fn load_config_from_str(toml_str: &str) -> Result<Config, ConfigError> {
    toml::from_str(toml_str).map_err(|e| ConfigError::Malformed(e.to_string()))
}
