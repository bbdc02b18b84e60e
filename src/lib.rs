//! Accelerating reverse proxy library.
//!
//! Sits in front of one upstream web application and takes the heavy
//! byte-moving off its hands: multipart file parts are written to local or
//! bucket storage and replaced by signed reference fields, and upstream can
//! answer with a delivery header instead of a body to have the proxy send a
//! file, a zip entry (through the `zip-cat` helper) or a git blob.

// Request path
pub mod config;
pub mod http;
pub mod routing;

// Acceleration
pub mod archive;
pub mod send_data;
pub mod storage;
pub mod upload;

// Cross-cutting concerns
pub mod lifecycle;
pub mod observability;
pub mod resilience;

pub use config::schema::ProxyConfig;
pub use http::HttpServer;
pub use lifecycle::Shutdown;
