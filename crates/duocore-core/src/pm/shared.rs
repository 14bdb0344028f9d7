//! Power-management block shared between the two cores.
//!
//! The block is the only mutable state the cores share. Nothing arbitrates
//! access in hardware, so every field has one writer per handshake phase:
//!
//! | Field | Writer |
//! |-------|--------|
//! | request kind and target | requester ([`RequesterFields`]) |
//! | acknowledge bits | responder ([`ResponderFields`]) |
//! | requester wake-up | requester |
//! | responder wake-up, ready flag, resume entry | responder |
//!
//! Request word layout: bits 0..=3 kind, bits 4..=7 target state, bit 8
//! acknowledge OK, bit 9 acknowledge error.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use duocore_hal::PowerState;

const KIND_MASK: u32 = 0x0f;
const TARGET_SHIFT: u32 = 4;
const TARGET_MASK: u32 = 0xf0;
const ACK_OK: u32 = 1 << 8;
const ACK_ERROR: u32 = 1 << 9;
const ACK_MASK: u32 = ACK_OK | ACK_ERROR;

/// What the requester is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum RequestKind {
    None = 0,
    Suspend = 1,
    Resume = 2,
}

impl RequestKind {
    const fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(RequestKind::None),
            1 => Some(RequestKind::Suspend),
            2 => Some(RequestKind::Resume),
            _ => None,
        }
    }
}

/// Acknowledge status of the current round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Ack {
    Pending,
    Ok,
    Error,
}

/// Decoded copy of the request word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PmRequest(u32);

impl PmRequest {
    pub const IDLE: PmRequest = PmRequest(0);

    pub const fn new(kind: RequestKind, target: Option<PowerState>) -> Self {
        let target = match target {
            Some(state) => (state as u32) << TARGET_SHIFT,
            None => 0,
        };
        PmRequest(kind as u32 | target)
    }

    pub const fn from_raw(raw: u32) -> Self {
        PmRequest(raw)
    }

    pub const fn raw(self) -> u32 {
        self.0
    }

    /// `None` for a kind this firmware does not know.
    pub const fn kind(self) -> Option<RequestKind> {
        RequestKind::from_raw(self.0 & KIND_MASK)
    }

    pub const fn target(self) -> Option<PowerState> {
        PowerState::from_raw(((self.0 & TARGET_MASK) >> TARGET_SHIFT) as u8)
    }

    pub const fn ack(self) -> Ack {
        if self.0 & ACK_ERROR != 0 {
            Ack::Error
        } else if self.0 & ACK_OK != 0 {
            Ack::Ok
        } else {
            Ack::Pending
        }
    }

    pub const fn phase(self) -> Phase {
        match self.kind() {
            Some(RequestKind::Suspend) => Phase::Suspend {
                target: self.target(),
                ack: self.ack(),
            },
            Some(RequestKind::Resume) => Phase::Resume { ack: self.ack() },
            Some(RequestKind::None) | None => Phase::Idle,
        }
    }
}

/// Where a handshake round stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Phase {
    Idle,
    Suspend { target: Option<PowerState>, ack: Ack },
    Resume { ack: Ack },
}

/// Shared power-management block, laid out for both cores.
#[repr(C)]
pub struct SharedPmBlock {
    request: AtomicU32,
    requester_wakeup: AtomicU32,
    responder_wakeup: AtomicU32,
    responder_wakeup_valid: AtomicBool,
    responder_ready: AtomicBool,
    resume_entry: AtomicUsize,
}

impl SharedPmBlock {
    pub const fn new() -> Self {
        Self {
            request: AtomicU32::new(0),
            requester_wakeup: AtomicU32::new(0),
            responder_wakeup: AtomicU32::new(0),
            responder_wakeup_valid: AtomicBool::new(false),
            responder_ready: AtomicBool::new(false),
            resume_entry: AtomicUsize::new(0),
        }
    }

    /// Bind to the block placed at `addr`.
    ///
    /// # Safety
    ///
    /// `addr` must point to memory that is valid for the whole program,
    /// aligned for `SharedPmBlock`, and accessed by no one except through
    /// this type.
    pub unsafe fn at(addr: usize) -> &'static Self {
        &*(addr as *const Self)
    }

    /// Return every field to its boot value.
    pub fn reset(&self) {
        self.request.store(0, Ordering::SeqCst);
        self.requester_wakeup.store(0, Ordering::SeqCst);
        self.responder_wakeup.store(0, Ordering::SeqCst);
        self.responder_wakeup_valid.store(false, Ordering::SeqCst);
        self.responder_ready.store(false, Ordering::SeqCst);
        self.resume_entry.store(0, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> PmRequest {
        PmRequest(self.request.load(Ordering::SeqCst))
    }

    pub fn phase(&self) -> Phase {
        self.snapshot().phase()
    }

    pub fn is_ready(&self) -> bool {
        self.responder_ready.load(Ordering::SeqCst)
    }

    pub fn requester_wakeup(&self) -> u32 {
        self.requester_wakeup.load(Ordering::SeqCst)
    }

    pub fn responder_wakeup(&self) -> Option<u32> {
        if self.responder_wakeup_valid.load(Ordering::SeqCst) {
            Some(self.responder_wakeup.load(Ordering::SeqCst))
        } else {
            None
        }
    }

    pub fn resume_entry(&self) -> usize {
        self.resume_entry.load(Ordering::SeqCst)
    }

    pub fn requester(&self) -> RequesterFields<'_> {
        RequesterFields { block: self }
    }

    pub fn responder(&self) -> ResponderFields<'_> {
        ResponderFields { block: self }
    }
}

impl Default for SharedPmBlock {
    fn default() -> Self {
        Self::new()
    }
}

/// Fields written by the requesting core.
pub struct RequesterFields<'a> {
    block: &'a SharedPmBlock,
}

impl RequesterFields<'_> {
    /// Start a new round. Clears any acknowledge left from the previous one.
    pub fn post(&self, request: PmRequest, wakeup: u32) {
        self.block.requester_wakeup.store(wakeup, Ordering::SeqCst);
        self.block
            .request
            .store(request.raw() & !ACK_MASK, Ordering::SeqCst);
    }

    /// Clear `expected` if it is still unacknowledged. On failure returns the
    /// word that raced in.
    pub fn withdraw(&self, expected: PmRequest) -> Result<(), PmRequest> {
        self.block
            .request
            .compare_exchange(
                expected.raw() & !ACK_MASK,
                0,
                Ordering::SeqCst,
                Ordering::SeqCst,
            )
            .map(|_| ())
            .map_err(PmRequest)
    }

    /// Close the round.
    pub fn clear(&self) {
        self.block.request.store(0, Ordering::SeqCst);
    }
}

/// Fields written by the responding core.
pub struct ResponderFields<'a> {
    block: &'a SharedPmBlock,
}

impl ResponderFields<'_> {
    /// Acknowledge the pending request. Returns false if there is no pending
    /// request or it was already acknowledged; an ack is never rewritten.
    pub fn ack(&self, ack: Ack) -> bool {
        let bits = match ack {
            Ack::Ok => ACK_OK,
            Ack::Error => ACK_ERROR,
            Ack::Pending => return false,
        };
        self.block
            .request
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |word| {
                let live = word & KIND_MASK != RequestKind::None as u32;
                (live && word & ACK_MASK == 0).then_some(word | bits)
            })
            .is_ok()
    }

    pub fn set_ready(&self, ready: bool) {
        self.block.responder_ready.store(ready, Ordering::SeqCst);
    }

    /// Publish the responder's own next wake-up, or withdraw it.
    pub fn set_next_wakeup(&self, wakeup: Option<u32>) {
        match wakeup {
            Some(ticks) => {
                self.block.responder_wakeup.store(ticks, Ordering::SeqCst);
                self.block
                    .responder_wakeup_valid
                    .store(true, Ordering::SeqCst);
            }
            None => self
                .block
                .responder_wakeup_valid
                .store(false, Ordering::SeqCst),
        }
    }

    pub fn set_resume_entry(&self, entry: usize) {
        self.block.resume_entry.store(entry, Ordering::SeqCst);
    }
}
