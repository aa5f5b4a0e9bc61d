//! Process-wide monotonic clock for change events.
//!
//! The initial scan and the live notification subscription stamp their
//! events from the same source, so timestamps from both are comparable.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::{Duration, Instant};

static ORIGIN: OnceLock<Instant> = OnceLock::new();
static LAST: AtomicU64 = AtomicU64::new(0);

/// Logical time of a change event, in nanoseconds since the first reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Timestamp(u64);

impl Timestamp {
    /// Read the clock. Every call returns a value strictly greater than
    /// any value returned before it.
    pub fn now() -> Self {
        let origin = ORIGIN.get_or_init(Instant::now);
        let elapsed = origin.elapsed().as_nanos() as u64;
        let mut current = LAST.load(Ordering::Relaxed);
        loop {
            let next = elapsed.max(current + 1);
            match LAST.compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed) {
                Ok(_) => return Timestamp(next),
                Err(actual) => current = actual,
            }
        }
    }

    /// Build a timestamp from raw nanoseconds.
    pub const fn from_nanos(nanos: u64) -> Self {
        Timestamp(nanos)
    }

    pub fn as_nanos(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", Duration::from_nanos(self.0))
    }
}
