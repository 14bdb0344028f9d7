//! Companion-core platform: simulated devices, halt and deep sleep.

use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::thread;
use std::time::Duration;

use duocore_core::pm::{RequestKind, SharedPmBlock};
use duocore_hal::{
    CoreControl, DeviceError, DevicePower, Instant32k, MonotonicClock, PowerPolicy, PowerState,
};

use crate::clock::SimClock;

/// Where the simulated core restarts after deep sleep.
pub const RESUME_ENTRY: usize = 0x4000_0400;

const POLL: Duration = Duration::from_millis(1);

pub struct CompanionPlatform {
    clock: SimClock,
    block: &'static SharedPmBlock,
    device_failure: Option<i32>,
    deep_sleep_allowed: AtomicBool,
    suspended: AtomicBool,
    halted: AtomicBool,
    sleeps: AtomicUsize,
    announced: AtomicU32,
}

impl CompanionPlatform {
    pub fn new(clock: SimClock, block: &'static SharedPmBlock) -> Self {
        Self {
            clock,
            block,
            device_failure: None,
            deep_sleep_allowed: AtomicBool::new(true),
            suspended: AtomicBool::new(false),
            halted: AtomicBool::new(false),
            sleeps: AtomicUsize::new(0),
            announced: AtomicU32::new(0),
        }
    }

    /// Make every device suspend fail with `status`.
    pub fn with_device_failure(mut self, status: i32) -> Self {
        self.device_failure = Some(status);
        self
    }

    pub fn allow_deep_sleep(&self, allowed: bool) {
        self.deep_sleep_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn devices_suspended(&self) -> bool {
        self.suspended.load(Ordering::SeqCst)
    }

    pub fn halted(&self) -> bool {
        self.halted.load(Ordering::SeqCst)
    }

    /// Completed deep-sleep entries.
    pub fn sleeps(&self) -> usize {
        self.sleeps.load(Ordering::SeqCst)
    }

    /// OS ticks announced after the last resume.
    pub fn announced_ticks(&self) -> u32 {
        self.announced.load(Ordering::SeqCst)
    }
}

impl DevicePower for CompanionPlatform {
    fn suspend_devices(&self, state: PowerState) -> Result<(), DeviceError> {
        if let Some(status) = self.device_failure {
            return Err(DeviceError(status));
        }
        log::debug!("companion: devices to {:?}", state);
        self.suspended.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn resume_devices(&self) {
        log::debug!("companion: devices resumed");
        self.suspended.store(false, Ordering::SeqCst);
    }
}

impl MonotonicClock for CompanionPlatform {
    fn now(&self) -> Instant32k {
        self.clock.now()
    }
}

impl CoreControl for CompanionPlatform {
    fn resume_entry(&self) -> usize {
        RESUME_ENTRY
    }

    /// Stands in for the context save and halt: the "core" stays stopped
    /// until the requester moves the shared block out of the suspend phase.
    fn suspend_self(&self) {
        self.sleeps.fetch_add(1, Ordering::SeqCst);
        while self.block.snapshot().kind() == Some(RequestKind::Suspend) {
            thread::sleep(POLL);
        }
    }

    fn restore_after_resume(&self) {
        log::debug!("companion: caches and interrupt unit restored");
    }

    fn announce_elapsed(&self, os_ticks: u32) {
        self.announced.store(os_ticks, Ordering::SeqCst);
    }

    fn rearm_system_timer(&self) {}

    fn rearm_mailbox(&self) {}

    fn halt(&self) -> ! {
        self.halted.store(true, Ordering::SeqCst);
        loop {
            thread::park();
        }
    }
}

impl PowerPolicy for CompanionPlatform {
    fn deep_sleep_allowed(&self) -> bool {
        self.deep_sleep_allowed.load(Ordering::SeqCst)
    }
}
