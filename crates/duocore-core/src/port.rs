//! Reference port registry.
//!
//! Ports are numbered endpoints bound to an owning core and, for ports owned
//! locally, to a delivery queue. The dispatcher reaches this table only
//! through the `PortRegistry` contract, so a platform may substitute its own.

use core::fmt;

use duocore_hal::{CoreId, ExecContext, Semaphore};

use crate::config::PORT_POOL_SIZE;
use crate::pool::{SharedPool, SlotId};
use crate::queue::{Insert, QueueId, QueueService, SendError};

/// Port number as carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortId(pub u16);

impl PortId {
    fn slot(self) -> SlotId {
        SlotId::new(self.0)
    }
}

impl fmt::Display for PortId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "port{}", self.0)
    }
}

/// State of one allocated port.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PortEntry {
    pub owner: CoreId,
    pub queue: Option<QueueId>,
}

/// Why a message could not be routed. The message is handed back.
#[derive(Debug, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RouteError<M> {
    UnknownPort(M),
    /// Port belongs to the other core; the transport must forward it.
    NotLocal { owner: CoreId, message: M },
    /// Local port with no delivery queue bound yet.
    NoQueue(M),
    Queue(SendError<M>),
}

impl<M> RouteError<M> {
    pub fn into_message(self) -> M {
        match self {
            RouteError::UnknownPort(message)
            | RouteError::NotLocal { message, .. }
            | RouteError::NoQueue(message) => message,
            RouteError::Queue(err) => err.into_message(),
        }
    }
}

impl<M> fmt::Display for RouteError<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RouteError::UnknownPort(_) => write!(f, "unknown port"),
            RouteError::NotLocal { owner, .. } => write!(f, "port owned by {}", owner),
            RouteError::NoQueue(_) => write!(f, "port has no delivery queue"),
            RouteError::Queue(err) => write!(f, "{}", err),
        }
    }
}

/// Fixed pool of ports allocated on behalf of either core.
pub struct PortTable<const N: usize = PORT_POOL_SIZE> {
    local: CoreId,
    ports: SharedPool<PortEntry, N>,
}

impl<const N: usize> PortTable<N> {
    /// Empty table for a registry running on `local`.
    pub fn new(local: CoreId) -> Self {
        Self {
            local,
            ports: SharedPool::new(),
        }
    }

    pub fn local_core(&self) -> CoreId {
        self.local
    }

    /// Allocate a port owned by the local core. Halts when the pool is exhausted.
    pub fn allocate(&self, ctx: ExecContext) -> PortId {
        let entry = PortEntry {
            owner: self.local,
            queue: None,
        };
        let slot = self.ports.acquire_or_fatal(ctx, entry);
        let port = PortId(slot.index() as u16);
        log::debug!("{} allocated", port);
        port
    }

    /// Record `core` as the owner of `port`. Returns false for an unknown port.
    pub fn bind_core(&self, port: PortId, core: CoreId) -> bool {
        self.ports
            .with(port.slot(), |entry| entry.owner = core)
            .is_some()
    }

    /// Attach the delivery queue of a locally owned port.
    pub fn bind_queue(&self, port: PortId, queue: QueueId) -> bool {
        self.ports
            .with(port.slot(), |entry| entry.queue = Some(queue))
            .is_some()
    }

    pub fn entry(&self, port: PortId) -> Option<PortEntry> {
        self.ports.with(port.slot(), |entry| *entry)
    }

    pub fn release(&self, ctx: ExecContext, port: PortId) -> PortEntry {
        self.ports.release(ctx, port.slot())
    }

    pub fn in_use(&self) -> usize {
        self.ports.in_use()
    }

    /// Post `message` into the delivery queue of `port`.
    pub fn route<M, S, const Q: usize, const E: usize>(
        &self,
        queues: &QueueService<M, S, Q, E>,
        port: PortId,
        message: M,
    ) -> Result<(), RouteError<M>>
    where
        S: Semaphore,
    {
        let Some(entry) = self.entry(port) else {
            return Err(RouteError::UnknownPort(message));
        };
        if entry.owner != self.local {
            return Err(RouteError::NotLocal {
                owner: entry.owner,
                message,
            });
        }
        let Some(queue) = entry.queue else {
            return Err(RouteError::NoQueue(message));
        };
        queues
            .send(queue, message, Insert::Tail)
            .map_err(RouteError::Queue)
    }
}
