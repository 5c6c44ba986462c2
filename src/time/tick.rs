//! Tick counting.

use core::time::Duration;
use portable_atomic::{AtomicU64, Ordering};

/// Count of scheduler ticks since the kernel was created.
///
/// Incremented only by the tick handler, with interrupts masked.
pub struct TickCounter {
    ticks: AtomicU64,
    /// Microseconds per tick
    period_us: u32,
}

impl TickCounter {
    pub const fn new(period_us: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            period_us,
        }
    }

    /// Count one tick and return the new total.
    pub fn increment(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    /// Get the current tick count.
    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn period_us(&self) -> u32 {
        self.period_us
    }

    /// Convert ticks to wall time.
    pub fn ticks_to_duration(&self, ticks: u64) -> Duration {
        Duration::from_micros(ticks.saturating_mul(u64::from(self.period_us)))
    }

    /// Time elapsed since the kernel was created, in whole ticks.
    pub fn elapsed(&self) -> Duration {
        self.ticks_to_duration(self.ticks())
    }
}
