//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use base64::Engine;
use thiserror::Error;

use crate::config::schema::ProxyConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("Secret file is not valid base64: {0}")]
    Secret(#[from] base64::DecodeError),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<ProxyConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: ProxyConfig = toml::from_str(&content)?;

    validate_config(&config).map_err(ConfigError::Validation)?;

    Ok(config)
}

/// Read the base64-encoded signing secret shared with upstream.
pub fn load_secret(path: &Path) -> Result<Vec<u8>, ConfigError> {
    let content = fs::read_to_string(path)?;
    let secret = base64::engine::general_purpose::STANDARD.decode(content.trim())?;
    Ok(secret)
}
