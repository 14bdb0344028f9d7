//! Build-time capacity budget and time-base constants.

use duocore_hal::Duration32k;

/// Queue headers available to the whole system.
pub const QUEUE_POOL_SIZE: usize = 32;

/// Queue elements shared by every queue. Also the largest legal queue depth.
pub const QUEUE_ELEMENT_POOL_SIZE: usize = 128;

/// Ports the reference port table can hand out.
pub const PORT_POOL_SIZE: usize = 64;

/// Fixed address of the power-management block shared between the cores.
pub const SHARED_PM_BLOCK_ADDR: usize = 0xa800_0000;

/// Frequency of the always-on clock used across deep sleep.
pub const RTC_HZ: u32 = 32_768;

/// OS tick rate assumed when none is configured.
pub const DEFAULT_OS_TICKS_PER_SEC: u32 = 100;

/// Power handshake tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PmConfig {
    /// OS scheduler tick rate, used to reconcile time after a resume.
    pub os_ticks_per_sec: u32,
}

impl Default for PmConfig {
    fn default() -> Self {
        Self {
            os_ticks_per_sec: DEFAULT_OS_TICKS_PER_SEC,
        }
    }
}

impl PmConfig {
    /// OS ticks covered by `elapsed`, rounded to the nearest tick.
    pub fn elapsed_os_ticks(&self, elapsed: Duration32k) -> u32 {
        let rtc = RTC_HZ as u64;
        let ticks = (elapsed.ticks() * self.os_ticks_per_sec as u64 + rtc / 2) / rtc;
        ticks.min(u32::MAX as u64) as u32
    }
}
