//! Sender-owned message buffers.
//!
//! A message stays allocated until the receiver sends `FREE` for it. A free
//! for a handle that is not live is a protocol error and is counted, never
//! silently ignored.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Simulated message header and body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimMessage {
    pub dst_port: u16,
    pub src_port: u16,
    pub id: u32,
    pub body: u32,
}

#[derive(Default)]
pub struct MessageArena {
    slots: Mutex<Vec<Option<SimMessage>>>,
    protocol_errors: AtomicUsize,
}

impl MessageArena {
    fn slots(&self) -> MutexGuard<'_, Vec<Option<SimMessage>>> {
        self.slots.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Store `message` and return its handle. Handles are never zero.
    pub fn alloc(&self, message: SimMessage) -> usize {
        let mut slots = self.slots();
        let index = match slots.iter().position(Option::is_none) {
            Some(index) => {
                slots[index] = Some(message);
                index
            }
            None => {
                slots.push(Some(message));
                slots.len() - 1
            }
        };
        index + 1
    }

    pub fn get(&self, handle: usize) -> Option<SimMessage> {
        let index = handle.checked_sub(1)?;
        self.slots().get(index).copied().flatten()
    }

    /// Release `handle`. Returns false, and records a protocol error, if it
    /// was not live.
    pub fn free(&self, handle: usize) -> bool {
        let released = handle
            .checked_sub(1)
            .and_then(|index| self.slots().get_mut(index).and_then(Option::take))
            .is_some();
        if !released {
            self.protocol_errors.fetch_add(1, Ordering::SeqCst);
            log::warn!("free of message {:#x} that is not live", handle);
        }
        released
    }

    /// Messages still waiting for their free notification.
    pub fn live(&self) -> usize {
        self.slots().iter().filter(|slot| slot.is_some()).count()
    }

    pub fn protocol_errors(&self) -> usize {
        self.protocol_errors.load(Ordering::SeqCst)
    }
}
