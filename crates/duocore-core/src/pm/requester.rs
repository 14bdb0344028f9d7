//! Requesting side of the handshake, run by the core that decides when the
//! SoC sleeps.

use core::fmt;

use duocore_hal::{Duration32k, MonotonicClock, PowerState};

use super::shared::{Ack, PmRequest, RequestKind, SharedPmBlock};

/// The responder did not acknowledge before the deadline.
///
/// This is also how a stale deep-sleep request shows up: the responder
/// aborts without writing an acknowledge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct HandshakeTimeout;

impl fmt::Display for HandshakeTimeout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "power handshake not acknowledged in time")
    }
}

pub struct PmRequester<'a> {
    block: &'a SharedPmBlock,
}

impl<'a> PmRequester<'a> {
    pub const fn new(block: &'a SharedPmBlock) -> Self {
        Self { block }
    }

    /// True once the responder has booted and until it shuts down.
    pub fn peer_ready(&self) -> bool {
        self.block.is_ready()
    }

    /// Ask the responder to suspend into `target`.
    ///
    /// `wakeup` is when the requester plans to wake the SoC, in 32 kHz
    /// ticks; `None` means no planned wake-up.
    pub fn request_suspend(&self, target: PowerState, wakeup: Option<u32>) {
        let request = PmRequest::new(RequestKind::Suspend, Some(target));
        self.block
            .requester()
            .post(request, wakeup.unwrap_or(u32::MAX));
        log::info!("pm: suspend to {:?} requested", target);
    }

    /// Tell a suspended responder it has been woken up.
    pub fn request_resume(&self) {
        let wakeup = self.block.requester_wakeup();
        self.block
            .requester()
            .post(PmRequest::new(RequestKind::Resume, None), wakeup);
        log::info!("pm: resume requested");
    }

    pub fn ack(&self) -> Ack {
        self.block.snapshot().ack()
    }

    /// Busy-wait for the responder's acknowledge.
    pub fn wait_ack<C: MonotonicClock>(
        &self,
        clock: &C,
        timeout: Duration32k,
    ) -> Result<Ack, HandshakeTimeout> {
        let start = clock.now();
        loop {
            match self.ack() {
                Ack::Pending => {}
                ack => return Ok(ack),
            }
            let waited = clock
                .now()
                .checked_duration_since(start)
                .unwrap_or(Duration32k::from_ticks(0));
            if waited >= timeout {
                return Err(HandshakeTimeout);
            }
            core::hint::spin_loop();
        }
    }

    /// Take back an unacknowledged request. If an acknowledge raced in, the
    /// request stays and the acknowledge is returned.
    pub fn withdraw(&self) -> Result<(), Ack> {
        let current = self.block.snapshot();
        if current.ack() != Ack::Pending {
            return Err(current.ack());
        }
        match self.block.requester().withdraw(current) {
            Ok(()) => {
                log::warn!("pm: request withdrawn without acknowledge");
                Ok(())
            }
            Err(raced) => Err(raced.ack()),
        }
    }

    /// Close an acknowledged round and return the block to idle.
    pub fn finish(&self) {
        self.block.requester().clear();
    }
}
