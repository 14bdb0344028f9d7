//! Mock collaborators shared by the integration tests.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

use duocore_core::dispatch::PmNotification;
use duocore_hal::{
    CoreControl, CoreId, DeviceError, DevicePower, ExecContext, Instant32k, MemoryWindow,
    MessageAllocator, MonotonicClock, PanicLog, PortRegistry, PowerPolicy, PowerState,
    ReservedTraffic, Semaphore, TakeError, Timeout,
};

// ============================================================================
// Semaphore
// ============================================================================

/// Counting semaphore on a std mutex and condition variable.
#[derive(Default)]
pub struct TestSemaphore {
    count: Mutex<u32>,
    ready: Condvar,
    waiters: AtomicUsize,
}

impl Semaphore for TestSemaphore {
    fn give(&self) {
        let mut count = self.count.lock().unwrap();
        *count += 1;
        self.ready.notify_one();
    }

    fn take(&self, timeout: Timeout) -> Result<(), TakeError> {
        let mut count = self.count.lock().unwrap();
        let deadline = match timeout {
            Timeout::NoWait => {
                if *count == 0 {
                    return Err(TakeError::Busy);
                }
                *count -= 1;
                return Ok(());
            }
            Timeout::Forever => None,
            Timeout::Millis(ms) => Some(Instant::now() + Duration::from_millis(ms.ticks() as u64)),
        };

        self.waiters.fetch_add(1, Ordering::SeqCst);
        while *count == 0 {
            match deadline {
                None => count = self.ready.wait(count).unwrap(),
                Some(deadline) => {
                    let now = Instant::now();
                    if now >= deadline {
                        self.waiters.fetch_sub(1, Ordering::SeqCst);
                        return Err(TakeError::TimedOut);
                    }
                    count = self.ready.wait_timeout(count, deadline - now).unwrap().0;
                }
            }
        }
        self.waiters.fetch_sub(1, Ordering::SeqCst);
        *count -= 1;
        Ok(())
    }

    fn count(&self) -> u32 {
        *self.count.lock().unwrap()
    }

    fn waiters(&self) -> usize {
        self.waiters.load(Ordering::SeqCst)
    }

    fn reset(&self) {
        *self.count.lock().unwrap() = 0;
    }
}

// ============================================================================
// Dispatcher collaborators
// ============================================================================

/// Call recorded by [`MockCollab`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Allocate,
    BindCore(u16, CoreId),
    Route(usize),
    Free(usize),
    Panic(CoreId),
    Pm(CoreId, i32, i32),
    Logger(CoreId, usize),
    TestCommand(CoreId, i32, i32, usize),
}

/// Records every collaborator call and backs a small word-addressable window.
pub struct MockCollab {
    pub calls: Mutex<Vec<Call>>,
    next_port: AtomicU32,
    pub route_status: i32,
    pub window_base: usize,
    pub words: Vec<AtomicU32>,
}

impl MockCollab {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            next_port: AtomicU32::new(1),
            route_status: 0,
            window_base: 0x1000,
            words: (0..4).map(|_| AtomicU32::new(0)).collect(),
        }
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }
}

impl PortRegistry for MockCollab {
    fn allocate_port(&self, _ctx: ExecContext) -> u16 {
        self.record(Call::Allocate);
        self.next_port.fetch_add(1, Ordering::SeqCst) as u16
    }

    fn bind_core(&self, port: u16, core: CoreId) {
        self.record(Call::BindCore(port, core));
    }

    fn route(&self, message: usize) -> i32 {
        self.record(Call::Route(message));
        self.route_status
    }
}

impl MessageAllocator for MockCollab {
    fn free_message(&self, message: usize) {
        self.record(Call::Free(message));
    }
}

impl PanicLog for MockCollab {
    fn log_panic(&self, core: CoreId) {
        self.record(Call::Panic(core));
    }
}

impl ReservedTraffic for MockCollab {
    fn logger(&self, core: CoreId, payload: usize) {
        self.record(Call::Logger(core, payload));
    }

    fn test_command(&self, core: CoreId, param1: i32, param2: i32, payload: usize) -> i32 {
        self.record(Call::TestCommand(core, param1, param2, payload));
        7
    }
}

impl MemoryWindow for MockCollab {
    fn word_at(&self, addr: usize) -> Option<&AtomicU32> {
        let offset = addr.checked_sub(self.window_base)?;
        if offset % 4 != 0 {
            return None;
        }
        self.words.get(offset / 4)
    }
}

impl PmNotification for MockCollab {
    fn pm_notification(&self, core: CoreId, request: i32, param: i32) -> i32 {
        self.record(Call::Pm(core, request, param));
        0
    }
}

// ============================================================================
// Power platform
// ============================================================================

/// Step recorded by [`MockPlatform`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    SuspendDevices(PowerState),
    ResumeDevices,
    SuspendSelf,
    Restore,
    Announce(u32),
    RearmTimer,
    RearmMailbox,
}

/// Companion-core platform double.
///
/// `on_suspend` runs in place of the hardware halt, standing in for
/// whatever the other core does while this one sleeps.
pub struct MockPlatform {
    pub steps: Rc<RefCell<Vec<Step>>>,
    pub device_status: Option<i32>,
    pub deep_sleep_allowed: bool,
    pub shutdown_allowed: bool,
    pub clock: ManualClock,
    pub sleep_ticks: u64,
    pub on_suspend: RefCell<Option<Box<dyn FnMut()>>>,
}

impl MockPlatform {
    pub fn new() -> Self {
        Self {
            steps: Rc::new(RefCell::new(Vec::new())),
            device_status: None,
            deep_sleep_allowed: true,
            shutdown_allowed: true,
            clock: ManualClock::new(0),
            sleep_ticks: 0,
            on_suspend: RefCell::new(None),
        }
    }

    pub fn steps(&self) -> Vec<Step> {
        self.steps.borrow().clone()
    }

    fn record(&self, step: Step) {
        self.steps.borrow_mut().push(step);
    }
}

impl DevicePower for MockPlatform {
    fn suspend_devices(&self, state: PowerState) -> Result<(), DeviceError> {
        self.record(Step::SuspendDevices(state));
        match self.device_status {
            Some(status) => Err(DeviceError(status)),
            None => Ok(()),
        }
    }

    fn resume_devices(&self) {
        self.record(Step::ResumeDevices);
    }
}

impl MonotonicClock for MockPlatform {
    fn now(&self) -> Instant32k {
        self.clock.now()
    }
}

impl CoreControl for MockPlatform {
    fn resume_entry(&self) -> usize {
        0x4000_0100
    }

    fn suspend_self(&self) {
        self.record(Step::SuspendSelf);
        self.clock.advance(self.sleep_ticks);
        if let Some(wake) = self.on_suspend.borrow_mut().as_mut() {
            wake();
        }
    }

    fn restore_after_resume(&self) {
        self.record(Step::Restore);
    }

    fn announce_elapsed(&self, os_ticks: u32) {
        self.record(Step::Announce(os_ticks));
    }

    fn rearm_system_timer(&self) {
        self.record(Step::RearmTimer);
    }

    fn rearm_mailbox(&self) {
        self.record(Step::RearmMailbox);
    }

    fn halt(&self) -> ! {
        panic!("core halted");
    }
}

impl PowerPolicy for MockPlatform {
    fn deep_sleep_allowed(&self) -> bool {
        self.deep_sleep_allowed
    }

    fn shutdown_allowed(&self) -> bool {
        self.shutdown_allowed
    }
}

// ============================================================================
// Clock
// ============================================================================

/// 32 kHz clock that moves only when told to, plus `step` ticks per read.
pub struct ManualClock {
    ticks: AtomicU64,
    step: u64,
}

impl ManualClock {
    pub fn new(step: u64) -> Self {
        Self {
            ticks: AtomicU64::new(0),
            step,
        }
    }

    pub fn advance(&self, ticks: u64) {
        self.ticks.fetch_add(ticks, Ordering::SeqCst);
    }
}

impl MonotonicClock for ManualClock {
    fn now(&self) -> Instant32k {
        Instant32k::from_ticks(self.ticks.fetch_add(self.step, Ordering::SeqCst))
    }
}
