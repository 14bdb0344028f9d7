//! 32 kHz always-on clock derived from the host monotonic clock.

use std::time::{Duration, Instant};

use duocore_core::config::RTC_HZ;
use duocore_hal::{Instant32k, MonotonicClock};

#[derive(Debug, Clone, Copy)]
pub struct SimClock {
    origin: Instant,
}

impl SimClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    /// Wake-up value `after` from now, truncated to the 32-bit shared field.
    pub fn wakeup_after(&self, after: Duration) -> u32 {
        let ticks = self.now().ticks() + to_ticks(after);
        ticks as u32
    }
}

impl Default for SimClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock for SimClock {
    fn now(&self) -> Instant32k {
        Instant32k::from_ticks(to_ticks(self.origin.elapsed()))
    }
}

fn to_ticks(duration: Duration) -> u64 {
    (duration.as_nanos() * RTC_HZ as u128 / 1_000_000_000) as u64
}
