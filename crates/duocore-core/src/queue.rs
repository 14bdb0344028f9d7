//! Pooled blocking FIFO of opaque messages.
//!
//! Queue headers and list elements come from two fixed pools shared by every
//! queue in a [`QueueService`]. Each queue owns one counting semaphore whose
//! count always equals the queue length: `send` gives exactly once per
//! enqueued element, `receive` takes exactly once per dequeue attempt.
//!
//! Linked-list mutation runs inside an interrupt-masking critical section, so
//! `send` is legal from interrupt context. Creation, deletion and `receive`
//! are thread-only.

use core::cell::RefCell;
use core::fmt;

use critical_section::Mutex;
use duocore_hal::{ExecContext, Semaphore, TakeError, Timeout};

use crate::config::{QUEUE_ELEMENT_POOL_SIZE, QUEUE_POOL_SIZE};
use crate::fatal::{fatal, require_thread_context, FatalCause};
use crate::pool::{Pool, SlotId};

/// Handle to a live queue. Stale handles to deleted queues are rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueId {
    slot: SlotId,
    generation: u16,
}

impl QueueId {
    pub const fn slot(self) -> SlotId {
        self.slot
    }
}

/// Where `send` places the message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Insert {
    /// Normal FIFO order.
    Tail,
    /// Ahead of everything already queued.
    Head,
}

/// Recoverable `send` failure. The message is handed back.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SendError<M> {
    /// Queue already holds `max_size` messages.
    Overflow(M),
    /// Handle does not name a live queue.
    Invalid(M),
}

impl<M> SendError<M> {
    pub fn into_message(self) -> M {
        match self {
            SendError::Overflow(message) | SendError::Invalid(message) => message,
        }
    }
}

impl<M> fmt::Display for SendError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Overflow(_) => write!(f, "queue overflow"),
            SendError::Invalid(_) => write!(f, "invalid queue handle"),
        }
    }
}

/// Recoverable `receive` failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RecvError {
    /// Bounded wait expired.
    TimedOut,
    /// Nothing to dequeue (no-wait poll, or a raced wake-up).
    Empty,
    /// Handle does not name a live queue.
    Invalid,
}

impl fmt::Display for RecvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecvError::TimedOut => write!(f, "receive timed out"),
            RecvError::Empty => write!(f, "queue empty"),
            RecvError::Invalid => write!(f, "invalid queue handle"),
        }
    }
}

/// Pool occupancy snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct QueueStats {
    pub queues_in_use: usize,
    pub queue_capacity: usize,
    pub elements_in_use: usize,
    pub element_capacity: usize,
}

struct QueueHeader {
    max_size: u32,
    current_size: u32,
    head: Option<SlotId>,
    tail: Option<SlotId>,
}

struct Element<M> {
    message: M,
    next: Option<SlotId>,
}

struct Tables<M, const Q: usize, const E: usize> {
    queues: Pool<QueueHeader, Q>,
    elements: Pool<Element<M>, E>,
    generations: [u16; Q],
}

impl<M, const Q: usize, const E: usize> Tables<M, Q, E> {
    /// Header of `id` together with the element pool, borrowed disjointly.
    fn split(&mut self, id: QueueId) -> Option<(&mut QueueHeader, &mut Pool<Element<M>, E>)> {
        if self.generations.get(id.slot.index()) != Some(&id.generation) {
            return None;
        }
        let header = self.queues.get_mut(id.slot)?;
        Some((header, &mut self.elements))
    }

    fn header(&self, id: QueueId) -> Option<&QueueHeader> {
        if self.generations.get(id.slot.index()) != Some(&id.generation) {
            return None;
        }
        self.queues.get(id.slot)
    }
}

enum Push<M> {
    Queued,
    Rejected(SendError<M>),
    OutOfElements,
}

/// Every queue of one system, with its header pool, element pool and
/// per-queue semaphores.
pub struct QueueService<M, S, const Q: usize = QUEUE_POOL_SIZE, const E: usize = QUEUE_ELEMENT_POOL_SIZE>
{
    tables: Mutex<RefCell<Tables<M, Q, E>>>,
    semaphores: [S; Q],
}

impl<M, S: Semaphore + Default, const Q: usize, const E: usize> QueueService<M, S, Q, E> {
    pub fn new() -> Self {
        Self::with_semaphores(core::array::from_fn(|_| S::default()))
    }
}

impl<M, S: Semaphore + Default, const Q: usize, const E: usize> Default
    for QueueService<M, S, Q, E>
{
    fn default() -> Self {
        Self::new()
    }
}

impl<M, S: Semaphore, const Q: usize, const E: usize> QueueService<M, S, Q, E> {
    /// Service backed by kernel-provided semaphores, one per queue slot.
    pub fn with_semaphores(semaphores: [S; Q]) -> Self {
        Self {
            tables: Mutex::new(RefCell::new(Tables {
                queues: Pool::new(),
                elements: Pool::new(),
                generations: [0; Q],
            })),
            semaphores,
        }
    }

    /// Create a queue holding at most `max_size` messages.
    ///
    /// Halts on a zero or oversized depth, on header pool exhaustion, or
    /// when called from interrupt context.
    pub fn create(&self, ctx: ExecContext, max_size: u32) -> QueueId {
        if max_size == 0 || max_size as usize > E {
            fatal(FatalCause::InvalidConfig);
        }
        require_thread_context(ctx);

        let header = QueueHeader {
            max_size,
            current_size: 0,
            head: None,
            tail: None,
        };
        let created = critical_section::with(|cs| {
            let mut tables = self.tables.borrow_ref_mut(cs);
            let slot = tables.queues.acquire(header)?;
            Some(QueueId {
                slot,
                generation: tables.generations[slot.index()],
            })
        });
        let Some(id) = created else {
            fatal(FatalCause::NoMemory);
        };
        self.semaphores[id.slot.index()].reset();
        log::debug!("queue {} created, depth {}", id.slot.index(), max_size);
        id
    }

    /// Enqueue `message`. Legal from any execution context.
    ///
    /// A full queue is backpressure, not an error in the budget: the message
    /// comes back in `SendError::Overflow`. Element pool exhaustion halts.
    pub fn send(&self, queue: QueueId, message: M, insert: Insert) -> Result<(), SendError<M>> {
        let outcome = critical_section::with(|cs| {
            let mut tables = self.tables.borrow_ref_mut(cs);
            let Some((header, elements)) = tables.split(queue) else {
                return Push::Rejected(SendError::Invalid(message));
            };
            if header.current_size >= header.max_size {
                return Push::Rejected(SendError::Overflow(message));
            }
            let next = match insert {
                Insert::Tail => None,
                Insert::Head => header.head,
            };
            let Some(slot) = elements.acquire(Element { message, next }) else {
                return Push::OutOfElements;
            };
            match insert {
                Insert::Tail => {
                    match header.tail.and_then(|tail| elements.get_mut(tail)) {
                        Some(last) => last.next = Some(slot),
                        None => header.head = Some(slot),
                    }
                    header.tail = Some(slot);
                }
                Insert::Head => {
                    header.head = Some(slot);
                    if header.tail.is_none() {
                        header.tail = Some(slot);
                    }
                }
            }
            header.current_size += 1;
            Push::Queued
        });

        match outcome {
            Push::Queued => {
                self.semaphores[queue.slot.index()].give();
                Ok(())
            }
            Push::Rejected(err) => Err(err),
            Push::OutOfElements => fatal(FatalCause::NoMemory),
        }
    }

    /// Dequeue the next message, blocking according to `timeout`.
    ///
    /// Thread-only. A wake-up that finds nothing to dequeue yields
    /// `RecvError::Empty`.
    pub fn receive(&self, ctx: ExecContext, queue: QueueId, timeout: Timeout) -> Result<M, RecvError> {
        require_thread_context(ctx);
        if !self.is_live(queue) {
            return Err(RecvError::Invalid);
        }

        match self.semaphores[queue.slot.index()].take(timeout) {
            Ok(()) => {}
            Err(TakeError::Busy) => return Err(RecvError::Empty),
            Err(TakeError::TimedOut) => return Err(RecvError::TimedOut),
        }

        let received = critical_section::with(|cs| {
            let mut tables = self.tables.borrow_ref_mut(cs);
            let (header, elements) = tables.split(queue).ok_or(RecvError::Invalid)?;
            let first = header.head.ok_or(RecvError::Empty)?;
            let element = elements.release(first);
            header.head = element.next;
            if header.head.is_none() {
                header.tail = None;
            }
            header.current_size -= 1;
            Ok(element.message)
        });
        // The slot was recycled while we waited: the count belongs to its new queue.
        if let Err(RecvError::Invalid) = received {
            self.semaphores[queue.slot.index()].give();
        }
        received
    }

    /// Drain and destroy `queue`. Returns how many messages were discarded.
    ///
    /// Thread-only. Halts if the handle is stale, if a consumer is still
    /// blocked on the queue, or if it cannot be emptied.
    pub fn delete(&self, ctx: ExecContext, queue: QueueId) -> usize {
        require_thread_context(ctx);
        if !self.is_live(queue) {
            fatal(FatalCause::InvalidHandle);
        }
        let semaphore = &self.semaphores[queue.slot.index()];
        if semaphore.waiters() > 0 {
            fatal(FatalCause::QueueBusy);
        }

        let mut drained = 0;
        loop {
            match self.receive(ctx, queue, Timeout::NoWait) {
                Ok(_) => drained += 1,
                Err(RecvError::Empty) => break,
                Err(_) => fatal(FatalCause::QueueNotDrained),
            }
        }
        if self.len(queue) != Some(0) {
            fatal(FatalCause::QueueNotDrained);
        }

        // Reset before the slot can be handed to a new queue.
        semaphore.reset();
        critical_section::with(|cs| {
            let mut tables = self.tables.borrow_ref_mut(cs);
            tables.queues.release(queue.slot);
            let generation = &mut tables.generations[queue.slot.index()];
            *generation = generation.wrapping_add(1);
        });

        if drained > 0 {
            log::warn!("queue {} deleted with {} pending messages", queue.slot.index(), drained);
        } else {
            log::debug!("queue {} deleted", queue.slot.index());
        }
        drained
    }

    /// Messages currently queued, or `None` for a stale handle.
    pub fn len(&self, queue: QueueId) -> Option<usize> {
        critical_section::with(|cs| {
            self.tables
                .borrow_ref(cs)
                .header(queue)
                .map(|header| header.current_size as usize)
        })
    }

    /// Depth `queue` was created with.
    pub fn capacity(&self, queue: QueueId) -> Option<usize> {
        critical_section::with(|cs| {
            self.tables
                .borrow_ref(cs)
                .header(queue)
                .map(|header| header.max_size as usize)
        })
    }

    /// Consumers currently blocked in `receive` on `queue`.
    pub fn waiters(&self, queue: QueueId) -> usize {
        self.semaphores[queue.slot.index()].waiters()
    }

    pub fn is_live(&self, queue: QueueId) -> bool {
        critical_section::with(|cs| self.tables.borrow_ref(cs).header(queue).is_some())
    }

    /// Occupancy of both pools.
    pub fn stats(&self) -> QueueStats {
        critical_section::with(|cs| {
            let tables = self.tables.borrow_ref(cs);
            QueueStats {
                queues_in_use: tables.queues.in_use(),
                queue_capacity: Q,
                elements_in_use: tables.elements.in_use(),
                element_capacity: E,
            }
        })
    }
}
