//! Request dispatcher.
//!
//! Built-in codes are handled here and cannot be overridden. Everything else
//! goes to a single fallback handler that may be installed once.

use core::cell::Cell;
use core::sync::atomic::Ordering;

use critical_section::Mutex;
use duocore_hal::{
    CoreId, ExecContext, MemoryWindow, MessageAllocator, PanicLog, PortRegistry, ReservedTraffic,
};

use super::frame::{Frame, RequestCode};
use crate::fatal::{fatal, FatalCause};

/// Handler for request codes the dispatcher does not recognise.
pub trait FallbackHandler: Sync {
    fn handle(&self, frame: &Frame) -> i32;
}

impl<F> FallbackHandler for F
where
    F: Fn(&Frame) -> i32 + Sync,
{
    fn handle(&self, frame: &Frame) -> i32 {
        self(frame)
    }
}

/// Entry point of the power handshake for PM requests from the other core.
pub trait PmNotification {
    fn pm_notification(&self, core: CoreId, request: i32, param: i32) -> i32;
}

/// Apply `value` to the bits of `data` selected by `mask`.
pub const fn masked_write(data: u32, value: u32, mask: u32) -> u32 {
    let data = (data & !mask) | (value & mask);
    data & (value | !mask)
}

/// Demultiplexes inbound frames to built-in handlers and the fallback.
pub struct Dispatcher<C> {
    collab: C,
    fallback: Mutex<Cell<Option<&'static dyn FallbackHandler>>>,
}

impl<C> Dispatcher<C>
where
    C: PortRegistry + MessageAllocator + PanicLog + MemoryWindow + ReservedTraffic + PmNotification,
{
    pub const fn new(collab: C) -> Self {
        Self {
            collab,
            fallback: Mutex::new(Cell::new(None)),
        }
    }

    pub fn collaborators(&self) -> &C {
        &self.collab
    }

    /// Install the handler for unrecognised codes. A second install halts.
    pub fn install_fallback(&self, handler: &'static dyn FallbackHandler) {
        let installed = critical_section::with(|cs| {
            let slot = self.fallback.borrow(cs);
            if slot.get().is_some() {
                return false;
            }
            slot.set(Some(handler));
            true
        });
        if !installed {
            fatal(FatalCause::FallbackAlreadyInstalled);
        }
    }

    pub fn has_fallback(&self) -> bool {
        critical_section::with(|cs| self.fallback.borrow(cs).get().is_some())
    }

    /// Handle `frame` and return the status echoed to the sender.
    ///
    /// Port allocation takes the pool lock and is thread-only. The other
    /// built-ins never block.
    pub fn dispatch(&self, ctx: ExecContext, frame: &Frame) -> i32 {
        log::debug!(
            "ipc from {}: request {:#x} ({}, {}, {:#x})",
            frame.source,
            frame.request,
            frame.param1,
            frame.param2,
            frame.payload
        );

        match frame.code() {
            Some(RequestCode::AllocPort) => {
                let port = self.collab.allocate_port(ctx);
                self.collab.bind_core(port, frame.source);
                i32::from(port)
            }
            Some(RequestCode::Message) => self.collab.route(frame.payload),
            Some(RequestCode::Free) => {
                self.collab.free_message(frame.payload);
                0
            }
            Some(RequestCode::PanicNotification) => {
                self.collab.log_panic(CoreId(frame.param1 as u8));
                0
            }
            Some(RequestCode::InfraPm) => {
                self.collab
                    .pm_notification(frame.source, frame.param1, frame.param2)
            }
            Some(RequestCode::Logger) => {
                self.collab.logger(frame.source, frame.payload);
                0
            }
            Some(RequestCode::RegisterTestCommandEngine) => self.collab.test_command(
                frame.source,
                frame.param1,
                frame.param2,
                frame.payload,
            ),
            Some(RequestCode::WriteMask) => {
                self.write_mask(frame);
                0
            }
            _ => self.forward(frame),
        }
    }

    fn write_mask(&self, frame: &Frame) {
        let Some(word) = self.collab.word_at(frame.payload) else {
            log::warn!("write-mask to unmapped address {:#x}", frame.payload);
            return;
        };
        let value = frame.param1 as u32;
        let mask = frame.param2 as u32;
        // The closure never returns None, so the update always succeeds.
        let _ = word.fetch_update(Ordering::SeqCst, Ordering::SeqCst, |data| {
            Some(masked_write(data, value, mask))
        });
    }

    fn forward(&self, frame: &Frame) -> i32 {
        let handler = critical_section::with(|cs| self.fallback.borrow(cs).get());
        match handler {
            Some(handler) => handler.handle(frame),
            None => {
                log::debug!("no handler for request {:#x}", frame.request);
                0
            }
        }
    }
}
