#![no_std]

//! Contracts between the duocore IPC/power layer and the platform it runs on.
//!
//! Drivers, the scheduler, the mailbox transport and the low-level context
//! save/restore code all live outside this workspace. They are reached only
//! through the traits below.

use core::fmt;
use core::sync::atomic::AtomicU32;

use fugit::MillisDurationU32;

/// Instant on the always-on 32.768 kHz time base.
pub type Instant32k = fugit::Instant<u64, 1, 32_768>;

/// Duration on the always-on 32.768 kHz time base.
pub type Duration32k = fugit::Duration<u64, 1, 32_768>;

/// Identifier of one of the two cores sharing the SoC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct CoreId(pub u8);

impl CoreId {
    /// Application core, owner of port allocation.
    pub const MASTER: CoreId = CoreId(0);
    /// Companion core.
    pub const SLAVE: CoreId = CoreId(1);
}

impl fmt::Display for CoreId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "core{}", self.0)
    }
}

/// Execution context a caller runs in.
///
/// Passed explicitly into every operation whose legality depends on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ExecContext {
    /// Interrupt service routine: never blocks, never takes the pool lock.
    Interrupt,
    /// Cooperative thread.
    Fiber,
    /// Preemptible thread.
    Task,
}

impl ExecContext {
    /// Returns true if the context may block and take the pool lock.
    pub const fn is_thread(self) -> bool {
        matches!(self, ExecContext::Fiber | ExecContext::Task)
    }
}

/// How long a blocking wait may last.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timeout {
    /// Poll once and return immediately.
    NoWait,
    /// Wait until signalled.
    Forever,
    /// Wait at most this long.
    Millis(MillisDurationU32),
}

impl Timeout {
    /// Bounded wait of `ms` milliseconds.
    pub const fn millis(ms: u32) -> Self {
        Timeout::Millis(MillisDurationU32::from_ticks(ms))
    }
}

// fugit durations only implement the pre-1.0 defmt trait.
#[cfg(feature = "defmt")]
impl defmt::Format for Timeout {
    fn format(&self, f: defmt::Formatter<'_>) {
        match self {
            Timeout::NoWait => defmt::write!(f, "NoWait"),
            Timeout::Forever => defmt::write!(f, "Forever"),
            Timeout::Millis(ms) => defmt::write!(f, "Millis({=u32} ms)", ms.ticks()),
        }
    }
}

/// Failure of [`Semaphore::take`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TakeError {
    /// The bounded wait expired.
    TimedOut,
    /// `Timeout::NoWait` and the count was zero.
    Busy,
}

/// Counting semaphore provided by the kernel.
///
/// Implementations enforce the deadline of a bounded `take` exactly once.
pub trait Semaphore {
    /// Increment the count and wake one waiter. Legal from any context.
    fn give(&self);

    /// Decrement the count, blocking according to `timeout` while it is zero.
    fn take(&self, timeout: Timeout) -> Result<(), TakeError>;

    /// Current count.
    fn count(&self) -> u32;

    /// Number of callers currently blocked in `take`.
    fn waiters(&self) -> usize;

    /// Drop the count back to zero.
    fn reset(&self);
}

/// Owner of port numbers and of the delivery queues behind them.
pub trait PortRegistry {
    /// Allocate a fresh port number. Takes the pool lock, so `ctx` must be a thread.
    fn allocate_port(&self, ctx: ExecContext) -> u16;

    /// Record which core owns `port`.
    fn bind_core(&self, port: u16, core: CoreId);

    /// Deliver the message referenced by `message` to its destination port.
    /// Returns the status echoed back over the transport.
    fn route(&self, message: usize) -> i32;
}

/// Allocator that owns message buffers until their receiver frees them.
pub trait MessageAllocator {
    /// Release the message referenced by `message`.
    fn free_message(&self, message: usize);
}

/// Sink for panic notifications raised by the other core.
pub trait PanicLog {
    /// Dump or record the panic of `core`.
    fn log_panic(&self, core: CoreId);
}

/// Traffic that rides the dispatcher but is interpreted elsewhere.
pub trait ReservedTraffic {
    /// Log aggregation frame.
    fn logger(&self, _core: CoreId, _payload: usize) {}

    /// Test command engine registration frame.
    fn test_command(&self, _core: CoreId, _param1: i32, _param2: i32, _payload: usize) -> i32 {
        0
    }
}

/// Word-addressable view of memory reachable by a masked write.
pub trait MemoryWindow {
    /// Word at `addr`, or `None` if the address is outside the window.
    fn word_at(&self, addr: usize) -> Option<&AtomicU32>;
}

/// Power state targeted by a suspend request or a device transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerState {
    Running = 0,
    Suspended = 1,
    Shutdown = 2,
}

impl PowerState {
    /// Decode a raw state value.
    pub const fn from_raw(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(PowerState::Running),
            1 => Some(PowerState::Suspended),
            2 => Some(PowerState::Shutdown),
            _ => None,
        }
    }
}

/// Non-zero status returned by a device that refused to suspend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceError(pub i32);

impl fmt::Display for DeviceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "device suspend failed with status {}", self.0)
    }
}

/// Local device tree power transitions.
pub trait DevicePower {
    /// Suspend every local device into `state`.
    fn suspend_devices(&self, state: PowerState) -> Result<(), DeviceError>;

    /// Resume every suspended device. Implementations halt on failure.
    fn resume_devices(&self);
}

/// Always-on monotonic clock.
pub trait MonotonicClock {
    fn now(&self) -> Instant32k;
}

/// Core-specific suspend, resume and halt sequences.
pub trait CoreControl {
    /// Address execution restarts from after a deep-sleep resume.
    fn resume_entry(&self) -> usize;

    /// Save the core context and halt. Returns once the hardware resumes the core.
    fn suspend_self(&self);

    /// Reinitialise caches and the interrupt unit after a resume.
    fn restore_after_resume(&self);

    /// Advance the OS tick count by the ticks spent asleep.
    fn announce_elapsed(&self, os_ticks: u32);

    /// Restart the periodic OS timer.
    fn rearm_system_timer(&self);

    /// Reconnect and enable the mailbox interrupt.
    fn rearm_mailbox(&self);

    /// Stop the core for good.
    fn halt(&self) -> !;
}

/// Platform veto points for low-power transitions.
pub trait PowerPolicy {
    fn deep_sleep_allowed(&self) -> bool {
        true
    }

    fn shutdown_allowed(&self) -> bool {
        true
    }
}
