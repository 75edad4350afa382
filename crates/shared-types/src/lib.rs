//! # Shared Types Crate
//!
//! Value types that cross every crate boundary in the microkernel.
//!
//! ## Contents
//!
//! - [`Chunk`]: the unit of data carried by a pipe. Serializable so it can
//!   cross isolation boundaries (worker threads, child processes).
//! - [`Timestamp`]: wall-clock milliseconds since the Unix epoch.
//! - [`TimeSource`]: driven port for reading the clock, so TTL logic can be
//!   tested deterministically.
//! - [`Metadata`]: free-form, ordered key/value bag attached to endpoints.

// Allow in tests
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod chunk;
pub mod time;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use chunk::Chunk;
pub use time::{SharedTimeSource, SystemTimeSource, TimeSource, Timestamp};

/// Free-form metadata attached to endpoints and registrations.
///
/// Ordered so snapshots and serialized forms are stable.
pub type Metadata = std::collections::BTreeMap<String, serde_json::Value>;
