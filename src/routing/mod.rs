//! Routing subsystem.
//!
//! # Data Flow
//! ```text
//! Incoming Request (method, path)
//!     → router.rs (route lookup)
//!     → matcher.rs (evaluate match conditions)
//!     → Return: RouteKind::Upload(name) or RouteKind::Proxy
//!
//! Route Compilation (at startup):
//!     UploadRouteConfig[]
//!     → Sort by priority
//!     → Compile matchers
//!     → Freeze as immutable Router
//! ```
//!
//! # Design Decisions
//! - Routes compiled at startup, immutable at runtime
//! - No regex in hot path (prefix matching only)
//! - Deterministic: same input always matches same route
//! - Everything not matched is proxied untouched

pub mod matcher;
pub mod router;

pub use router::{RouteKind, Router};
