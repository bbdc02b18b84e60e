//! Object storage sink subsystem.
//!
//! # Data Flow
//! ```text
//! byte stream + Destination + deadline + cancellation token
//!     → sink.rs (dispatch on the destination's form)
//!         → local.rs  (temp file, rename on success)
//!         → bucket.rs (object_store client from the shared BucketMux)
//!     → bytes written, or ConsumeError { written, source }
//!
//! After commit:
//!     cancellation token fires → best-effort delete with backoff
//! ```
//!
//! # Design Decisions
//! - Backend chosen by descriptor form only (path vs. scheme URL)
//! - Partial objects are never visible under the destination name
//! - Bucket clients are pooled per bucket and immutable after creation

pub mod bucket;
pub mod local;
pub mod sink;
pub mod types;

pub use bucket::BucketMux;
pub use sink::ObjectSink;
pub use types::{ConsumeError, Destination, StorageError};
