//! Service configuration: a TOML file, overridable from `BRT_*` variables.

mod loader;
mod types;
mod validate;

pub use loader::*;
pub use types::*;
pub use validate::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("No configuration at {0}")]
    NotFound(String),

    #[error("Malformed configuration: {0}")]
    Malformed(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}
