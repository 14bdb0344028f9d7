//! Both simulated cores wired together.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use duocore_core::config::PmConfig;
use duocore_core::dispatch::{Dispatcher, FallbackHandler, Frame};
use duocore_core::pm::{IdleOutcome, PmRequester, PowerManager};
use duocore_hal::{CoreId, ExecContext};

use crate::clock::SimClock;
use crate::memory::SharedRam;
use crate::message::MessageArena;
use crate::node::Node;
use crate::platform::CompanionPlatform;
use crate::scenario::SimConfig;

const SCRATCH_WORDS: usize = 16;
const IDLE_POLL: Duration = Duration::from_millis(1);

pub type CompanionPower = PowerManager<'static, CompanionPlatform>;

/// Counts frames no built-in handler claimed.
#[derive(Default)]
pub struct UnknownFrames {
    count: AtomicUsize,
}

impl UnknownFrames {
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

impl FallbackHandler for UnknownFrames {
    fn handle(&self, frame: &Frame) -> i32 {
        log::debug!("unclaimed request {:#x} from {}", frame.request, frame.source);
        self.count.fetch_add(1, Ordering::SeqCst);
        0
    }
}

pub struct System {
    pub clock: SimClock,
    pub ram: &'static SharedRam,
    pub arena: Arc<MessageArena>,
    pub master: Arc<Dispatcher<Node>>,
    pub slave: Arc<Dispatcher<Node>>,
    pub power: Arc<CompanionPower>,
    pub unknown_at_master: &'static UnknownFrames,
}

impl System {
    /// Boot both cores. The slave is the companion core running the power
    /// manager.
    pub fn new(config: &SimConfig) -> Self {
        let clock = SimClock::new();
        let ram = SharedRam::leak(SCRATCH_WORDS);
        let arena = Arc::new(MessageArena::default());

        let master = Arc::new(Dispatcher::new(Node::new(CoreId::MASTER, Arc::clone(&arena), ram)));
        let slave = Arc::new(Dispatcher::new(Node::new(CoreId::SLAVE, Arc::clone(&arena), ram)));

        let mut platform = CompanionPlatform::new(clock, &ram.pm);
        if let Some(status) = config.device_failure {
            platform = platform.with_device_failure(status);
        }
        let power = Arc::new(PowerManager::new(&ram.pm, platform, PmConfig::default()));
        power.boot();
        slave.collaborators().attach_power(power.clone());

        let unknown_at_master: &'static UnknownFrames = Box::leak(Box::new(UnknownFrames::default()));
        master.install_fallback(unknown_at_master);

        Self {
            clock,
            ram,
            arena,
            master,
            slave,
            power,
            unknown_at_master,
        }
    }

    /// Deliver a frame from the slave to the master.
    pub fn to_master(&self, ctx: ExecContext, frame: Frame) -> i32 {
        self.master.dispatch(ctx, &frame)
    }

    /// Deliver a frame from the master to the slave.
    pub fn to_slave(&self, ctx: ExecContext, frame: Frame) -> i32 {
        self.slave.dispatch(ctx, &frame)
    }

    /// Power handshake requester, run by the master.
    pub fn requester(&self) -> PmRequester<'static> {
        PmRequester::new(&self.ram.pm)
    }

    /// Start the companion core's idle loop.
    pub fn spawn_companion(&self) -> Companion {
        let (tx, outcomes) = mpsc::channel();
        let stop = Arc::new(AtomicBool::new(false));
        let power = Arc::clone(&self.power);
        let thread = {
            let stop = Arc::clone(&stop);
            thread::spawn(move || {
                while !stop.load(Ordering::SeqCst) {
                    let outcome = power.idle_hook();
                    if outcome != IdleOutcome::Awake && tx.send(outcome).is_err() {
                        break;
                    }
                    thread::sleep(IDLE_POLL);
                }
            })
        };
        Companion {
            outcomes,
            stop,
            thread: Some(thread),
            power: Arc::clone(&self.power),
        }
    }
}

/// Running companion idle loop.
pub struct Companion {
    outcomes: Receiver<IdleOutcome>,
    stop: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
    power: Arc<CompanionPower>,
}

impl Companion {
    /// Next non-idle outcome, or `None` if the loop went quiet or died.
    pub fn next(&self, timeout: Duration) -> Option<IdleOutcome> {
        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout | RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stop the loop and wait for it, unless the core has halted for good.
    pub fn stop(mut self) {
        self.stop.store(true, Ordering::SeqCst);
        if self.power.platform().halted() {
            return;
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                log::error!("companion idle loop panicked");
            }
        }
    }
}

impl Drop for Companion {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
    }
}
