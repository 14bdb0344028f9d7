//! Fixed-capacity slot arena with an index free list.
//!
//! Capacity is part of the build-time budget. [`Pool`] itself never decides
//! whether exhaustion is fatal; [`SharedPool::acquire_or_fatal`] and the queue
//! element path do.

use core::cell::RefCell;

use critical_section::Mutex;
use duocore_hal::ExecContext;

use crate::fatal::{fatal, require_thread_context, FatalCause};

/// Index-based handle to a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct SlotId(u16);

impl SlotId {
    pub const fn new(index: u16) -> Self {
        SlotId(index)
    }

    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// Arena of `N` slots of `T`.
pub struct Pool<T, const N: usize> {
    slots: [Option<T>; N],
    free: heapless::Vec<u16, N>,
}

impl<T, const N: usize> Pool<T, N> {
    /// Empty pool with every slot free. Halts if `N` does not fit a handle.
    pub fn new() -> Self {
        if N > u16::MAX as usize + 1 {
            fatal(FatalCause::InvalidConfig);
        }
        let mut free = heapless::Vec::new();
        // Reverse order so the lowest index is handed out first.
        for index in (0..N).rev() {
            if free.push(index as u16).is_err() {
                fatal(FatalCause::InvalidConfig);
            }
        }
        Self {
            slots: core::array::from_fn(|_| None),
            free,
        }
    }

    /// Store `value` in a free slot. Returns `None` when the pool is exhausted.
    pub fn acquire(&mut self, value: T) -> Option<SlotId> {
        let index = self.free.pop()?;
        self.slots[index as usize] = Some(value);
        Some(SlotId(index))
    }

    /// Return `slot` to the free list and hand back its value.
    ///
    /// Releasing a slot that is not in use halts with `InvalidHandle`.
    pub fn release(&mut self, slot: SlotId) -> T {
        let value = match self.slots.get_mut(slot.index()).and_then(Option::take) {
            Some(value) => value,
            None => fatal(FatalCause::InvalidHandle),
        };
        if self.free.push(slot.0).is_err() {
            fatal(FatalCause::InvalidHandle);
        }
        value
    }

    pub fn get(&self, slot: SlotId) -> Option<&T> {
        self.slots.get(slot.index()).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, slot: SlotId) -> Option<&mut T> {
        self.slots.get_mut(slot.index()).and_then(Option::as_mut)
    }

    pub fn is_in_use(&self, slot: SlotId) -> bool {
        self.get(slot).is_some()
    }

    /// Slots currently issued.
    pub fn in_use(&self) -> usize {
        N - self.free.len()
    }

    /// Slots still free.
    pub fn available(&self) -> usize {
        self.free.len()
    }

    pub const fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for Pool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

/// [`Pool`] behind the pool-wide lock.
///
/// Allocation and release are thread-only: interrupt context never takes the
/// pool lock.
pub struct SharedPool<T, const N: usize> {
    inner: Mutex<RefCell<Pool<T, N>>>,
}

impl<T, const N: usize> SharedPool<T, N> {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(RefCell::new(Pool::new())),
        }
    }

    /// Store `value` in a free slot, or `None` when exhausted.
    pub fn acquire(&self, ctx: ExecContext, value: T) -> Option<SlotId> {
        require_thread_context(ctx);
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).acquire(value))
    }

    /// Store `value` in a free slot. Exhaustion halts with `NoMemory`.
    pub fn acquire_or_fatal(&self, ctx: ExecContext, value: T) -> SlotId {
        match self.acquire(ctx, value) {
            Some(slot) => slot,
            None => fatal(FatalCause::NoMemory),
        }
    }

    pub fn release(&self, ctx: ExecContext, slot: SlotId) -> T {
        require_thread_context(ctx);
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).release(slot))
    }

    /// Run `f` on the value in `slot`, if it is in use.
    pub fn with<R>(&self, slot: SlotId, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        critical_section::with(|cs| self.inner.borrow_ref_mut(cs).get_mut(slot).map(f))
    }

    pub fn in_use(&self) -> usize {
        critical_section::with(|cs| self.inner.borrow_ref(cs).in_use())
    }

    pub fn capacity(&self) -> usize {
        N
    }
}

impl<T, const N: usize> Default for SharedPool<T, N> {
    fn default() -> Self {
        Self::new()
    }
}
