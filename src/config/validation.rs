//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (timeouts > 0, addresses parse)
//! - Upstream may be a host name; it only needs an explicit port
//! - Reject upload routes that would match nothing
//! - Require a signing secret once uploads are intercepted
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: ProxyConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use std::net::SocketAddr;
use std::str::FromStr;

use axum::http::uri::Authority;
use thiserror::Error;

use crate::config::schema::ProxyConfig;

/// A single semantic problem in a configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("listener.bind_address '{0}' is not a socket address")]
    BindAddress(String),

    #[error("upstream.address '{0}' is not a host:port authority")]
    UpstreamAddress(String),

    #[error("{0} must be greater than zero")]
    ZeroTimeout(&'static str),

    #[error("upload route '{0}' must have a path prefix starting with '/'")]
    RoutePrefix(String),

    #[error("uploads.secret_path is required when upload routes are configured")]
    MissingSecret,

    #[error("send_data.{0} must not be empty")]
    EmptyExecutable(&'static str),

    #[error("observability.log_format '{0}' is not one of: pretty, json")]
    LogFormat(String),
}

/// Check a parsed configuration for semantic errors.
pub fn validate_config(config: &ProxyConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.listener.bind_address.parse::<SocketAddr>().is_err() {
        errors.push(ValidationError::BindAddress(config.listener.bind_address.clone()));
    }
    if !is_upstream_authority(&config.upstream.address) {
        errors.push(ValidationError::UpstreamAddress(config.upstream.address.clone()));
    }

    if config.timeouts.connect_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.connect_secs"));
    }
    if config.timeouts.request_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("timeouts.request_secs"));
    }
    if config.uploads.store_timeout_secs == 0 {
        errors.push(ValidationError::ZeroTimeout("uploads.store_timeout_secs"));
    }

    for route in &config.uploads.routes {
        if !route.path_prefix.starts_with('/') {
            errors.push(ValidationError::RoutePrefix(route.name.clone()));
        }
    }

    if !config.uploads.routes.is_empty() && config.uploads.secret_path.is_none() {
        errors.push(ValidationError::MissingSecret);
    }

    if config.send_data.zip_cat_path.trim().is_empty() {
        errors.push(ValidationError::EmptyExecutable("zip_cat_path"));
    }
    if config.send_data.git_path.trim().is_empty() {
        errors.push(ValidationError::EmptyExecutable("git_path"));
    }

    match config.observability.log_format.as_str() {
        "pretty" | "json" => {}
        other => errors.push(ValidationError::LogFormat(other.to_string())),
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// `host:port` as accepted by the upstream client, without userinfo.
fn is_upstream_authority(address: &str) -> bool {
    Authority::from_str(address)
        .map(|a| a.port_u16().is_some() && !a.as_str().contains('@'))
        .unwrap_or(false)
}
