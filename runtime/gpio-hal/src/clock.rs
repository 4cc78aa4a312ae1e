//! Clock sources for interval measurement
//!
//! All timestamps are integer microseconds from a monotonic, non-wrapping
//! origin. The flow validator measures inter-interrupt intervals against
//! these stamps; tests substitute [`ManualClock`] so interval arithmetic is
//! exercised deterministically.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// A monotonic microsecond clock
pub trait Clock: Send + Sync {
    /// Microseconds elapsed since the clock's origin
    fn now_us(&self) -> u64;
}

/// Wall-time-independent clock backed by `std::time::Instant`
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now_us(&self) -> u64 {
        self.origin.elapsed().as_micros() as u64
    }
}

/// Test clock advanced explicitly by the caller
pub struct ManualClock {
    us: AtomicU64,
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            us: AtomicU64::new(0),
        }
    }

    /// Move the clock forward by `us` microseconds
    pub fn advance_us(&self, us: u64) {
        self.us.fetch_add(us, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualClock {
    fn now_us(&self) -> u64 {
        self.us.load(Ordering::SeqCst)
    }
}
