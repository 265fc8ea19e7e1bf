//! Global tick counter, the time base the scheduler and sleep queue run on.

use super::Instant;
use portable_atomic::{AtomicU64, Ordering};

/// Monotonic count of periodic timer interrupts since boot.
pub struct TickCounter {
    ticks: AtomicU64,
    frequency: u32,
    ns_per_tick: u64,
}

impl TickCounter {
    pub const fn new(frequency: u32) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            frequency,
            ns_per_tick: 1_000_000_000 / frequency as u64,
        }
    }

    /// Advance the counter. Called once per `tick()` invocation.
    pub fn increment(&self) -> u64 {
        self.ticks.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn ticks(&self) -> u64 {
        self.ticks.load(Ordering::Acquire)
    }

    pub fn frequency(&self) -> u32 {
        self.frequency
    }

    pub fn ticks_to_nanos(&self, ticks: u64) -> u64 {
        ticks * self.ns_per_tick
    }

    pub fn nanos_to_ticks(&self, nanos: u64) -> u64 {
        nanos / self.ns_per_tick
    }

    pub fn now(&self) -> Instant {
        Instant::from_nanos(self.ticks_to_nanos(self.ticks()))
    }
}

/// Global tick source, shared by every CPU-bound consumer in this crate.
pub static GLOBAL_TICK_COUNTER: TickCounter = TickCounter::new(super::TIMER_FREQUENCY_HZ);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tick_counter_basic() {
        let counter = TickCounter::new(1000);
        assert_eq!(counter.ticks(), 0);
        assert_eq!(counter.frequency(), 1000);

        assert_eq!(counter.increment(), 1);
        assert_eq!(counter.ticks(), 1);

        assert_eq!(counter.ticks_to_nanos(1000), 1_000_000_000);
        assert_eq!(counter.nanos_to_ticks(1_000_000_000), 1000);
    }
}
