//! HTTP protocol handling subsystem.
//!
//! # Data Flow
//! ```text
//! TCP connection
//!     → server.rs (Axum setup, request ID, trace, timeout)
//!     → send_data middleware (advertise X-Sendfile, watch the response)
//!     → proxy_handler
//!         upload route → upload::UploadInterceptor
//!     → upstream.rs (pooled client, URI rewrite, hop-by-hop strip)
//!     → response back through send_data (hijack or pass through)
//!     → Send to client
//! ```

pub mod server;
pub mod upstream;

pub use server::{AppState, HttpServer, ServerError};
pub use upstream::{Upstream, UpstreamError};
