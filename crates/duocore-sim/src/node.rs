//! One simulated core: the collaborator set its dispatcher runs against.

use std::sync::atomic::AtomicU32;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use duocore_core::dispatch::PmNotification;
use duocore_core::port::{PortId, PortTable};
use duocore_core::queue::QueueService;
use duocore_hal::{
    CoreId, ExecContext, MemoryWindow, MessageAllocator, PanicLog, PortRegistry, ReservedTraffic,
};

use crate::memory::SharedRam;
use crate::message::MessageArena;
use crate::semaphore::StdSemaphore;

/// Queues of one core. Messages are arena handles.
pub type Queues = QueueService<usize, StdSemaphore>;

pub struct Node {
    core: CoreId,
    pub ports: PortTable,
    pub queues: Queues,
    arena: Arc<MessageArena>,
    ram: &'static SharedRam,
    panics: Mutex<Vec<CoreId>>,
    pm: OnceLock<Arc<dyn PmNotification + Send + Sync>>,
}

impl Node {
    pub fn new(core: CoreId, arena: Arc<MessageArena>, ram: &'static SharedRam) -> Self {
        Self {
            core,
            ports: PortTable::new(core),
            queues: Queues::new(),
            arena,
            ram,
            panics: Mutex::new(Vec::new()),
            pm: OnceLock::new(),
        }
    }

    pub fn core(&self) -> CoreId {
        self.core
    }

    pub fn arena(&self) -> &MessageArena {
        &self.arena
    }

    /// Route `INFRA_PM` frames to `pm`. Only the first attachment counts.
    pub fn attach_power(&self, pm: Arc<dyn PmNotification + Send + Sync>) -> bool {
        self.pm.set(pm).is_ok()
    }

    /// Cores whose panic this core was notified of.
    pub fn panics(&self) -> Vec<CoreId> {
        self.panics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl PortRegistry for Node {
    fn allocate_port(&self, ctx: ExecContext) -> u16 {
        self.ports.allocate(ctx).0
    }

    fn bind_core(&self, port: u16, core: CoreId) {
        if !self.ports.bind_core(PortId(port), core) {
            log::warn!("{}: bind of unknown port {}", self.core, port);
        }
    }

    fn route(&self, message: usize) -> i32 {
        let Some(header) = self.arena.get(message) else {
            log::warn!("{}: route of dead message {:#x}", self.core, message);
            return -1;
        };
        let port = PortId(header.dst_port);
        match self.ports.route(&self.queues, port, message) {
            Ok(()) => 0,
            Err(err) => {
                log::debug!("{}: message {} to {}: {}", self.core, header.id, port, err);
                -1
            }
        }
    }
}

impl MessageAllocator for Node {
    fn free_message(&self, message: usize) {
        self.arena.free(message);
    }
}

impl PanicLog for Node {
    fn log_panic(&self, core: CoreId) {
        log::error!("{}: {} reported a panic", self.core, core);
        self.panics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(core);
    }
}

impl ReservedTraffic for Node {
    fn logger(&self, core: CoreId, payload: usize) {
        log::info!("{}: log buffer {:#x} from {}", self.core, payload, core);
    }
}

impl MemoryWindow for Node {
    fn word_at(&self, addr: usize) -> Option<&AtomicU32> {
        self.ram.word_at(addr)
    }
}

impl PmNotification for Node {
    fn pm_notification(&self, core: CoreId, request: i32, param: i32) -> i32 {
        match self.pm.get() {
            Some(pm) => pm.pm_notification(core, request, param),
            None => {
                log::warn!("{}: PM request from {} with no power manager", self.core, core);
                -1
            }
        }
    }
}
