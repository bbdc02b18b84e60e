//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};

/// Root configuration for the accelerating proxy.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ProxyConfig {
    /// Listener configuration (bind address).
    pub listener: ListenerConfig,

    /// The web application behind the proxy.
    pub upstream: UpstreamConfig,

    /// Timeout configuration.
    pub timeouts: TimeoutConfig,

    /// Multipart upload interception.
    pub uploads: UploadConfig,

    /// Accelerated response delivery.
    pub send_data: SendDataConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Listener configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address (e.g., "0.0.0.0:8181").
    pub bind_address: String,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0:8181".to_string(),
        }
    }
}

/// Upstream (web application) configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UpstreamConfig {
    /// Upstream address (e.g., "127.0.0.1:8080").
    pub address: String,

    /// Suffix appended to an upload path for the pre-authorization call.
    pub authorize_suffix: String,
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            address: "127.0.0.1:8080".to_string(),
            authorize_suffix: "/authorize".to_string(),
        }
    }
}

/// Timeout configuration for various operations.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Connection establishment timeout in seconds.
    pub connect_secs: u64,

    /// Request timeout (total time for request/response) in seconds.
    pub request_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            connect_secs: 5,
            request_secs: 600,
        }
    }
}

/// A path prefix whose multipart bodies are intercepted.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UploadRouteConfig {
    /// Route identifier for logging/metrics.
    pub name: String,

    /// Path prefix to match.
    pub path_prefix: String,

    /// Route priority (higher = checked first).
    #[serde(default)]
    pub priority: u32,
}

/// Upload interception configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct UploadConfig {
    /// Routes whose request bodies are rewritten.
    pub routes: Vec<UploadRouteConfig>,

    /// File holding the base64-encoded HMAC secret shared with upstream.
    pub secret_path: Option<String>,

    /// Lifetime of signed field claims in seconds.
    pub claims_ttl_secs: u64,

    /// Default deadline for a single storage write in seconds.
    pub store_timeout_secs: u64,

    /// Directory used when upstream does not name a temp path.
    pub local_temp_dir: String,

    /// Multipart field names eligible for diversion. Empty means all.
    pub allowed_fields: Vec<String>,

    /// Upper bound for one diverted part in bytes. Zero means unlimited.
    pub max_part_size: u64,

    /// Upper bound for a part forwarded inline in bytes. Zero means unlimited.
    pub max_field_size: u64,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            routes: Vec::new(),
            secret_path: None,
            claims_ttl_secs: 60,
            store_timeout_secs: 3600,
            local_temp_dir: std::env::temp_dir().to_string_lossy().into_owned(),
            allowed_fields: Vec::new(),
            max_part_size: 0,
            max_field_size: 10 * 1024 * 1024,
        }
    }
}

/// Accelerated delivery configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SendDataConfig {
    /// Path to the `zip-cat` extractor executable.
    pub zip_cat_path: String,

    /// Path to the `git` executable.
    pub git_path: String,
}

impl Default for SendDataConfig {
    fn default() -> Self {
        Self {
            zip_cat_path: "zip-cat".to_string(),
            git_path: "git".to_string(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Log output format: "pretty" or "json".
    pub log_format: String,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_address: "127.0.0.1:9229".to_string(),
        }
    }
}
