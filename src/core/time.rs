//! Process-wide modification clock.
//!
//! Every modification (parameter change, rewiring, produced output) draws a
//! fresh stamp from one global counter, so stamps from different nodes can be
//! compared directly when deciding whether a node is stale.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static CLOCK: AtomicU64 = AtomicU64::new(0);

/// A monotonic modification stamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct TimeStamp(u64);

impl TimeStamp {
    /// The stamp older than every real modification.
    pub const ZERO: TimeStamp = TimeStamp(0);

    /// Draw the next stamp from the global clock.
    pub fn now() -> Self {
        Self(CLOCK.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Raw counter value.
    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TimeStamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}
