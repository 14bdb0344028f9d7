//! Fatal halts.
//!
//! Budget violations and cross-core contract violations have no safe
//! continuation. They record a cause code for post-mortem log extraction and
//! then panic, which the firmware's panic handler turns into a halt.

use core::fmt;
use core::sync::atomic::{AtomicU32, Ordering};

use duocore_hal::ExecContext;

/// Why the system halted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum FatalCause {
    /// Zero or oversized queue depth, or a pool larger than its handle space.
    InvalidConfig,
    /// Handle does not name a live object.
    InvalidHandle,
    /// Queue deleted while consumers are still blocked on it.
    QueueBusy,
    /// Queue could not be emptied before deletion.
    QueueNotDrained,
    /// Thread-only operation invoked from interrupt context.
    NotAllowed,
    /// A static pool ran out of slots.
    NoMemory,
    /// Second installation of the dispatcher fallback handler.
    FallbackAlreadyInstalled,
    /// Companion core woke up without a resume request from its peer.
    ResumeDesync,
    /// Raised by platform code whose failure has no closer cause.
    Unknown,
}

impl FatalCause {
    /// Code recorded for post-mortem extraction.
    pub const fn code(self) -> u32 {
        match self {
            FatalCause::InvalidConfig => 0x01,
            FatalCause::InvalidHandle => 0x02,
            FatalCause::QueueBusy => 0x03,
            FatalCause::QueueNotDrained => 0x04,
            FatalCause::NotAllowed => 0x05,
            FatalCause::NoMemory => 0x06,
            FatalCause::FallbackAlreadyInstalled => 0x07,
            FatalCause::ResumeDesync => 0xdead_beef,
            FatalCause::Unknown => 0xff,
        }
    }
}

impl fmt::Display for FatalCause {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            FatalCause::InvalidConfig => "invalid capacity configuration",
            FatalCause::InvalidHandle => "invalid handle",
            FatalCause::QueueBusy => "queue deleted with waiting consumers",
            FatalCause::QueueNotDrained => "queue not drained before deletion",
            FatalCause::NotAllowed => "operation not allowed from interrupt context",
            FatalCause::NoMemory => "static pool exhausted",
            FatalCause::FallbackAlreadyInstalled => "fallback handler already installed",
            FatalCause::ResumeDesync => "resumed without a resume request",
            FatalCause::Unknown => "unknown error",
        };
        f.write_str(text)
    }
}

const NO_FATAL: u32 = 0;

static LAST_FATAL: AtomicU32 = AtomicU32::new(NO_FATAL);

/// Code of the most recent fatal halt, if any.
pub fn last_fatal() -> Option<u32> {
    match LAST_FATAL.load(Ordering::SeqCst) {
        NO_FATAL => None,
        code => Some(code),
    }
}

/// Record `cause` and halt.
#[cold]
#[track_caller]
pub fn fatal(cause: FatalCause) -> ! {
    LAST_FATAL.store(cause.code(), Ordering::SeqCst);
    log::error!("fatal {:#010x}: {}", cause.code(), cause);
    panic!("fatal {:#010x}: {}", cause.code(), cause)
}

/// Halt unless `ctx` is a fiber or task.
#[track_caller]
pub(crate) fn require_thread_context(ctx: ExecContext) {
    if !ctx.is_thread() {
        fatal(FatalCause::NotAllowed);
    }
}
