//! Wall-clock time, used for diagnostics only.
//!
//! Scheduling itself runs on logical ticks ([`tick`]), not nanoseconds; this
//! module exists for boot-time logging and for code outside the core that
//! wants a monotonic clock.

pub mod tick;

pub use tick::{TickCounter, GLOBAL_TICK_COUNTER};

/// Nanoseconds since an implementation-defined epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Instant(u64);

impl Instant {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    /// Read the current instant from the ARM Generic Timer.
    pub fn now() -> Self {
        #[cfg(target_arch = "aarch64")]
        {
            let cnt: u64;
            let freq: u64;
            unsafe {
                core::arch::asm!(
                    "mrs {}, cntpct_el0",
                    out(reg) cnt,
                    options(nostack, nomem, preserves_flags)
                );
                core::arch::asm!(
                    "mrs {}, cntfrq_el0",
                    out(reg) freq,
                    options(nostack, nomem, preserves_flags)
                );
            }
            let nanos = if freq > 0 {
                ((cnt as u128 * 1_000_000_000) / freq as u128) as u64
            } else {
                0
            };
            Self(nanos)
        }

        #[cfg(not(target_arch = "aarch64"))]
        {
            Self(0)
        }
    }

    /// Duration elapsed since `earlier`.
    ///
    /// Saturates to zero rather than panicking; wall-clock readings are used
    /// only for logging here, never for scheduling decisions.
    pub fn duration_since(self, earlier: Instant) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }
}

impl core::ops::Add<Duration> for Instant {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        Self(self.0 + duration.as_nanos())
    }
}

/// A duration of time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Duration(u64);

impl Duration {
    pub fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    pub fn from_micros(micros: u64) -> Self {
        Self(micros * 1_000)
    }

    pub fn from_millis(millis: u64) -> Self {
        Self(millis * 1_000_000)
    }

    pub fn as_nanos(self) -> u64 {
        self.0
    }

    pub fn as_micros(self) -> u64 {
        self.0 / 1_000
    }

    pub fn as_millis(self) -> u64 {
        self.0 / 1_000_000
    }
}

/// Default periodic timer frequency, in Hz. Tunable in [19, 1000] at boot.
pub const TIMER_FREQUENCY_HZ: u32 = 100;

/// Ticks per scheduling quantum, per the timer-tick glue.
pub const TIME_SLICE: u32 = 4;
