//! Multipart upload interception.
//!
//! # Data Flow
//! ```text
//! POST to an upload route
//!     → authorizer.rs (empty-body copy to <path>/authorize upstream)
//!         non-200 → relayed to the client as-is
//!     → preparer.rs (authorize answer + config → UploadOpts)
//!     → rewrite.rs (parts in order)
//!         file part → hashing.rs → storage::ObjectSink → reference fields + F.upload token
//!         other part → copied unchanged
//!     → interceptor.rs (new body, signed X-Accel-Multipart-Fields header)
//!     → upstream
//!     → session.rs dropped → stored objects removed
//! ```
//!
//! # Design Decisions
//! - Stored files are hand-off objects: upstream must copy what it keeps
//!   before answering, the proxy deletes them once the response arrives
//! - A client field that shadows a generated reference field fails the
//!   whole request
//! - Upload routes carrying anything but form data are forwarded untouched
//!   after authorization

pub mod authorizer;
pub mod claims;
pub mod error;
pub mod hashing;
pub mod interceptor;
pub mod preparer;
pub mod rewrite;
pub mod session;

pub use authorizer::{Authorization, PreAuthorizer};
pub use claims::{ClaimsSigner, MultipartClaims, UploadClaims};
pub use error::UploadError;
pub use interceptor::{Interception, UploadInterceptor, REWRITTEN_FIELDS_HEADER};
pub use preparer::{AuthorizeResponse, DefaultPreparer, Preparer, RemoteObject, UploadOpts};
pub use session::{SavedFile, UploadSession};
