//! Zip entry extraction for the `zip-cat` helper.
//!
//! # Data Flow
//! ```text
//! zip-cat <archive> <entry>
//!     → entry.rs (open local file or remote.rs range reader, scan directory)
//!     → frame.rs (size line, or negative status line)
//!     → decompressed bytes on stdout
//!
//! Proxy side:
//!     send_data::entry spawns zip-cat
//!     → frame.rs decodes the first line
//!     → remaining stdout becomes the response body
//! ```
//!
//! # Design Decisions
//! - The frame is the only channel; stderr is for logs
//! - Not-found is a status, every other failure is fatal
//! - Remote archives are read with range requests, never downloaded whole

pub mod entry;
pub mod frame;
pub mod remote;

pub use entry::{cat_entry, ArchiveSource, ExtractError};
pub use frame::{Frame, FrameError, STATUS_ENTRY_NOT_FOUND};
