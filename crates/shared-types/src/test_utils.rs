//! Test utilities.
//!
//! Enable with the `test-utils` feature flag.
//!
//! # Example
//!
//! ```rust,ignore
//! use shared_types::test_utils::ManualTimeSource;
//! use shared_types::TimeSource;
//!
//! let clock = ManualTimeSource::new(1_000);
//! clock.advance(250);
//! assert_eq!(clock.now().as_millis(), 1_250);
//! ```

use crate::time::{TimeSource, Timestamp};
use parking_lot::Mutex;
use std::sync::Arc;

/// A clock that only moves when told to.
///
/// Clones share the same underlying instant, so a test can hand one clone to
/// the component under test and keep another to advance time.
#[derive(Debug, Clone)]
pub struct ManualTimeSource {
    now: Arc<Mutex<u64>>,
}

impl ManualTimeSource {
    /// Create a clock starting at `start_millis`.
    pub fn new(start_millis: u64) -> Self {
        Self {
            now: Arc::new(Mutex::new(start_millis)),
        }
    }

    /// Move the clock forward.
    pub fn advance(&self, millis: u64) {
        let mut now = self.now.lock();
        *now = now.saturating_add(millis);
    }

    /// Jump to an absolute instant.
    pub fn set(&self, millis: u64) {
        *self.now.lock() = millis;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Timestamp {
        Timestamp::from_millis(*self.now.lock())
    }
}
