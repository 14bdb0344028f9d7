//! Responding side of the handshake, run from the companion core's idle path.

use core::cell::Cell;
use core::fmt;

use critical_section::Mutex;
use duocore_hal::{
    CoreControl, CoreId, DeviceError, DevicePower, Duration32k, MonotonicClock, PowerPolicy,
    PowerState,
};

use super::shared::{Ack, RequestKind, SharedPmBlock};
use crate::config::PmConfig;
use crate::dispatch::PmNotification;
use crate::fatal::{fatal, FatalCause};

/// Shutdown-class request delivered by an `INFRA_PM` frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ShutdownRequest {
    Shutdown,
    Reboot,
}

impl ShutdownRequest {
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0 => Some(ShutdownRequest::Shutdown),
            1 => Some(ShutdownRequest::Reboot),
            _ => None,
        }
    }
}

/// Why a deep-sleep entry did not happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum DeepSleepError {
    /// The responder's own next wake-up is sooner than the requester assumed.
    StaleWakeup,
    /// A local device refused to suspend.
    Devices(DeviceError),
}

impl DeepSleepError {
    /// Non-zero status for the caller.
    pub const fn code(self) -> i32 {
        match self {
            DeepSleepError::StaleWakeup => -1,
            DeepSleepError::Devices(DeviceError(0)) => -1,
            DeepSleepError::Devices(DeviceError(status)) => status,
        }
    }
}

impl fmt::Display for DeepSleepError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DeepSleepError::StaleWakeup => write!(f, "local wake-up is sooner than requested"),
            DeepSleepError::Devices(err) => write!(f, "{}", err),
        }
    }
}

/// Time spent in deep sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResumeReport {
    pub elapsed: Duration32k,
    pub os_ticks: u32,
}

/// Result of one pass through [`PowerManager::idle_hook`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IdleOutcome {
    /// Nothing to do.
    Awake,
    /// Slept and resumed.
    Slept(ResumeReport),
    /// The request was answered with an error acknowledge.
    Refused,
    /// The request was left unacknowledged.
    Aborted,
}

/// Companion-core power manager.
pub struct PowerManager<'a, P> {
    block: &'a SharedPmBlock,
    platform: P,
    config: PmConfig,
    pending: Mutex<Cell<Option<ShutdownRequest>>>,
}

impl<'a, P> PowerManager<'a, P>
where
    P: DevicePower + CoreControl + MonotonicClock + PowerPolicy,
{
    pub fn new(block: &'a SharedPmBlock, platform: P, config: PmConfig) -> Self {
        Self {
            block,
            platform,
            config,
            pending: Mutex::new(Cell::new(None)),
        }
    }

    /// Reinitialise the shared block and announce readiness.
    pub fn boot(&self) {
        self.block.reset();
        self.block.responder().set_ready(true);
        log::info!("pm: companion core ready");
    }

    pub fn platform(&self) -> &P {
        &self.platform
    }

    pub fn block(&self) -> &SharedPmBlock {
        self.block
    }

    /// Publish when this core next needs to be awake, in 32 kHz ticks.
    pub fn set_next_wakeup(&self, wakeup: Option<u32>) {
        self.block.responder().set_next_wakeup(wakeup);
    }

    /// Record a shutdown-class request. Returns 0, or -1 for an unknown request.
    pub fn notify(&self, core: CoreId, request: i32, param: i32) -> i32 {
        let Some(kind) = ShutdownRequest::from_raw(request) else {
            log::warn!("pm: unknown request {} from {}", request, core);
            return -1;
        };
        log::info!("pm: {:?} requested by {} (param {})", kind, core, param);
        critical_section::with(|cs| self.pending.borrow(cs).set(Some(kind)));
        0
    }

    /// Refuse the current round with an error acknowledge.
    pub fn ack_error(&self) -> bool {
        self.block.responder().ack(Ack::Error)
    }

    /// Idle-path entry point: performs a pending shutdown, then answers a
    /// pending suspend request.
    pub fn idle_hook(&self) -> IdleOutcome {
        if self.platform.shutdown_allowed() {
            let pending = critical_section::with(|cs| self.pending.borrow(cs).take());
            if let Some(kind) = pending {
                log::info!("pm: performing {:?}", kind);
                self.shutdown();
            }
        }

        #[cfg(feature = "deep-sleep")]
        {
            let request = self.block.snapshot();
            if request.kind() == Some(RequestKind::Suspend) && request.ack() == Ack::Pending {
                if request.target() == Some(PowerState::Suspended)
                    && self.platform.deep_sleep_allowed()
                {
                    return match self.enter_deep_sleep() {
                        Ok(report) => IdleOutcome::Slept(report),
                        Err(DeepSleepError::StaleWakeup) => IdleOutcome::Aborted,
                        Err(DeepSleepError::Devices(_)) => {
                            self.ack_error();
                            IdleOutcome::Refused
                        }
                    };
                }
                log::warn!("pm: refusing suspend to {:?}", request.target());
                self.ack_error();
                return IdleOutcome::Refused;
            }
        }

        IdleOutcome::Awake
    }

    /// Run the deep-sleep sequence for the pending suspend request.
    ///
    /// Returns after the hardware resumes the core. A stale request is left
    /// unacknowledged; a device failure is returned for the caller to
    /// acknowledge. Resuming without a resume request halts.
    pub fn enter_deep_sleep(&self) -> Result<ResumeReport, DeepSleepError> {
        if let Some(local) = self.block.responder_wakeup() {
            let requested = self.block.requester_wakeup();
            if local < requested {
                log::warn!(
                    "pm: aborting deep sleep, local wake-up {} before requested {}",
                    local,
                    requested
                );
                return Err(DeepSleepError::StaleWakeup);
            }
        }

        if let Err(err) = self.platform.suspend_devices(PowerState::Suspended) {
            log::warn!("pm: {}", err);
            return Err(DeepSleepError::Devices(err));
        }

        let responder = self.block.responder();
        responder.set_resume_entry(self.platform.resume_entry());
        responder.ack(Ack::Ok);
        let start = self.platform.now();
        log::info!("pm: entering deep sleep");

        self.platform.suspend_self();

        self.platform.restore_after_resume();
        if self.block.snapshot().kind() != Some(RequestKind::Resume) {
            fatal(FatalCause::ResumeDesync);
        }
        self.platform.resume_devices();
        responder.ack(Ack::Ok);

        let elapsed = self
            .platform
            .now()
            .checked_duration_since(start)
            .unwrap_or(Duration32k::from_ticks(0));
        let os_ticks = self.config.elapsed_os_ticks(elapsed);
        self.platform.announce_elapsed(os_ticks);
        self.platform.rearm_mailbox();
        self.platform.rearm_system_timer();
        log::info!(
            "pm: resumed after {} ms ({} os ticks)",
            elapsed.to_millis(),
            os_ticks
        );

        Ok(ResumeReport { elapsed, os_ticks })
    }

    /// Mark the core not ready and halt for good.
    pub fn shutdown(&self) -> ! {
        self.block.responder().set_ready(false);
        log::info!("pm: companion core halting");
        self.platform.halt()
    }
}

impl<P> PmNotification for PowerManager<'_, P>
where
    P: DevicePower + CoreControl + MonotonicClock + PowerPolicy,
{
    fn pm_notification(&self, core: CoreId, request: i32, param: i32) -> i32 {
        self.notify(core, request, param)
    }
}
