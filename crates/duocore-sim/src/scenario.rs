//! End-to-end scenarios between the simulated master and companion cores.

use std::sync::atomic::Ordering;
use std::thread;
use std::time::{Duration, Instant};

use duocore_core::config::RTC_HZ;
use duocore_core::dispatch::{masked_write, Frame, RequestCode};
use duocore_core::pm::{Ack, IdleOutcome};
use duocore_core::QueueId;
use duocore_hal::{CoreId, Duration32k, ExecContext, PowerState, Timeout};

use crate::error::SimError;
use crate::message::SimMessage;
use crate::system::System;

const TASK: ExecContext = ExecContext::Task;
/// Frames arrive through the mailbox interrupt.
const MAILBOX: ExecContext = ExecContext::Interrupt;

const MASKED_WORD_INITIAL: u32 = 0xF0F0_F0F0;
const MASKED_WORD_VALUE: u32 = 0x0F0F_0F0F;
const MASKED_WORD_MASK: u32 = 0x0000_00FF;

/// Scenario knobs, filled from the command line.
#[derive(Debug, Clone)]
pub struct SimConfig {
    /// Messages the slave sends in the traffic scenario.
    pub messages: u32,
    /// Depth of the master's delivery queue.
    pub queue_depth: u32,
    /// How long the master keeps the SoC asleep.
    pub sleep: Duration,
    /// How long the master waits for each acknowledge.
    pub ack_timeout: Duration,
    /// Status every companion device returns on suspend, if it fails.
    pub device_failure: Option<i32>,
    /// Give the companion a wake-up sooner than the requested one.
    pub stale_wakeup: bool,
    /// Ask for a reboot instead of a shutdown.
    pub reboot: bool,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            messages: 64,
            queue_depth: 8,
            sleep: Duration::from_millis(50),
            ack_timeout: Duration::from_millis(200),
            device_failure: None,
            stale_wakeup: false,
            reboot: false,
        }
    }
}

/// Summary of a traffic run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrafficReport {
    /// Port the master granted to the slave.
    pub granted_port: u16,
    pub delivered: u32,
    /// Sends bounced by a full delivery queue and retried.
    pub overflows: u32,
    pub unclaimed_frames: usize,
    pub masked_word: u32,
}

/// How a suspend round ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuspendOutcome {
    Slept { os_ticks: u32, elapsed_ms: u64 },
    /// The companion answered with an error acknowledge.
    Refused,
    /// The companion never acknowledged and the request was withdrawn.
    Aborted,
}

fn to_rtc(duration: Duration) -> Duration32k {
    Duration32k::from_ticks((duration.as_millis() as u64 * RTC_HZ as u64) / 1000)
}

/// Slave allocates a port from the master, then streams messages into the
/// master's delivery queue while a master task consumes and frees them.
pub fn run_traffic(config: &SimConfig) -> Result<TrafficReport, SimError> {
    let system = System::new(config);

    let granted = system.to_master(
        TASK,
        Frame::new(CoreId::SLAVE, RequestCode::AllocPort.raw(), 0, 0, 0),
    );
    let granted_port = u16::try_from(granted).map_err(|_| SimError::PortAllocation(granted))?;
    log::info!("slave granted port {}", granted_port);

    let master = system.master.collaborators();
    let inbox = master.ports.allocate(TASK);
    let queue = master.queues.create(TASK, config.queue_depth);
    master.ports.bind_queue(inbox, queue);

    // Not a built-in: lands in the master's fallback handler.
    system.to_master(MAILBOX, Frame::new(CoreId::SLAVE, RequestCode::Sync.raw(), 0, 0, 0));

    let overflows = thread::scope(|s| {
        let consumer = s.spawn(|| consume(&system, queue, config.messages));

        let mut overflows = 0;
        for id in 0..config.messages {
            let handle = system.arena.alloc(SimMessage {
                dst_port: inbox.0,
                src_port: granted_port,
                id,
                body: id.wrapping_mul(31),
            });
            let frame = Frame::new(CoreId::SLAVE, RequestCode::Message.raw(), 0, 0, handle);
            while system.to_master(MAILBOX, frame) != 0 {
                overflows += 1;
                thread::yield_now();
            }
        }

        match consumer.join() {
            Ok(result) => result.map(|()| overflows),
            Err(_) => Err(SimError::Starved {
                received: 0,
                expected: config.messages,
            }),
        }
    })?;

    let expected = masked_write(MASKED_WORD_INITIAL, MASKED_WORD_VALUE, MASKED_WORD_MASK);
    let Some(word) = system.ram.word(0) else {
        return Err(SimError::MaskedWrite { expected, got: 0 });
    };
    word.store(MASKED_WORD_INITIAL, Ordering::SeqCst);
    system.to_master(
        MAILBOX,
        Frame::new(
            CoreId::SLAVE,
            RequestCode::WriteMask.raw(),
            MASKED_WORD_VALUE as i32,
            MASKED_WORD_MASK as i32,
            system.ram.address_of(0),
        ),
    );
    let masked_word = word.load(Ordering::SeqCst);
    if masked_word != expected {
        return Err(SimError::MaskedWrite {
            expected,
            got: masked_word,
        });
    }

    let leaked = system.arena.live();
    let protocol_errors = system.arena.protocol_errors();
    if leaked != 0 || protocol_errors != 0 {
        return Err(SimError::Ownership {
            leaked,
            protocol_errors,
        });
    }
    master.queues.delete(TASK, queue);

    Ok(TrafficReport {
        granted_port,
        delivered: config.messages,
        overflows,
        unclaimed_frames: system.unknown_at_master.count(),
        masked_word,
    })
}

/// Master task: receive in order and send each message back for freeing.
fn consume(system: &System, queue: QueueId, expected: u32) -> Result<(), SimError> {
    let master = system.master.collaborators();
    for received in 0..expected {
        let handle = match master.queues.receive(TASK, queue, Timeout::millis(500)) {
            Ok(handle) => handle,
            Err(_) => {
                return Err(SimError::Starved { received, expected });
            }
        };
        let got = system.arena.get(handle).map_or(u32::MAX, |message| message.id);
        if got != received {
            return Err(SimError::OutOfOrder {
                expected: received,
                got,
            });
        }
        system.to_slave(
            MAILBOX,
            Frame::new(CoreId::MASTER, RequestCode::Free.raw(), 0, 0, handle),
        );
    }
    Ok(())
}

/// Master asks the companion to deep sleep, keeps it asleep for
/// `config.sleep`, then resumes it.
pub fn run_suspend(config: &SimConfig) -> Result<SuspendOutcome, SimError> {
    let system = System::new(config);
    let requester = system.requester();
    let timeout = to_rtc(config.ack_timeout);

    if config.stale_wakeup {
        system
            .power
            .set_next_wakeup(Some(system.clock.wakeup_after(Duration::from_millis(1))));
    }
    let companion = system.spawn_companion();

    requester.request_suspend(
        PowerState::Suspended,
        Some(system.clock.wakeup_after(config.sleep)),
    );
    match requester.wait_ack(&system.clock, timeout) {
        Ok(Ack::Ok) => {}
        Ok(Ack::Error) => {
            requester.finish();
            companion.stop();
            return Ok(SuspendOutcome::Refused);
        }
        Ok(Ack::Pending) => return Err(SimError::UnexpectedAck(Ack::Pending)),
        Err(_) => match requester.withdraw() {
            Ok(()) => {
                companion.stop();
                return Ok(SuspendOutcome::Aborted);
            }
            // Acknowledged after the deadline: the companion is asleep.
            Err(Ack::Ok) => {}
            Err(ack) => {
                requester.finish();
                companion.stop();
                log::warn!("late acknowledge {:?}", ack);
                return Ok(SuspendOutcome::Refused);
            }
        },
    }

    thread::sleep(config.sleep);
    requester.request_resume();
    match requester.wait_ack(&system.clock, timeout) {
        Ok(Ack::Ok) => {}
        Ok(ack) => return Err(SimError::UnexpectedAck(ack)),
        Err(err) => return Err(SimError::Resume(err)),
    }

    let outcome = loop {
        match companion.next(config.ack_timeout) {
            Some(IdleOutcome::Slept(report)) => break report,
            Some(_) => continue,
            None => return Err(SimError::CompanionSilent),
        }
    };
    requester.finish();
    companion.stop();

    Ok(SuspendOutcome::Slept {
        os_ticks: outcome.os_ticks,
        elapsed_ms: outcome.elapsed.to_millis(),
    })
}

/// Master sends a shutdown-class PM request; the companion marks itself not
/// ready and halts.
pub fn run_shutdown(config: &SimConfig) -> Result<(), SimError> {
    let system = System::new(config);
    let requester = system.requester();
    let companion = system.spawn_companion();

    let request = if config.reboot { 1 } else { 0 };
    let status = system.to_slave(
        MAILBOX,
        Frame::new(CoreId::MASTER, RequestCode::InfraPm.raw(), request, 0, 0),
    );
    if status != 0 {
        return Err(SimError::UnexpectedStatus(status));
    }

    let deadline = Instant::now() + config.ack_timeout;
    while requester.peer_ready() || !system.power.platform().halted() {
        if Instant::now() >= deadline {
            return Err(SimError::ShutdownIgnored);
        }
        thread::sleep(Duration::from_millis(1));
    }
    log::info!("companion core halted");

    companion.stop();
    Ok(())
}
