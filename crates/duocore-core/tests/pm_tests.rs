//! Tests for the power handshake, driving both halves against one shared
//! block with a mock companion platform.

mod common;

use std::panic::{catch_unwind, AssertUnwindSafe};

use common::{ManualClock, MockPlatform, Step};
use duocore_core::config::PmConfig;
use duocore_core::pm::{
    Ack, HandshakeTimeout, IdleOutcome, Phase, PmRequester, PowerManager, SharedPmBlock,
};
use duocore_hal::{CoreId, Duration32k, PowerState};

fn leak_block() -> &'static SharedPmBlock {
    Box::leak(Box::new(SharedPmBlock::new()))
}

fn manager(block: &'static SharedPmBlock, platform: MockPlatform) -> PowerManager<'static, MockPlatform> {
    let pm = PowerManager::new(block, platform, PmConfig { os_ticks_per_sec: 100 });
    pm.boot();
    pm
}

// ============================================================================
// Shared block
// ============================================================================

mod shared_block_tests {
    use super::*;

    #[test]
    fn boot_resets_block_and_marks_ready() {
        let block = leak_block();
        block.requester().post(duocore_core::pm::PmRequest::from_raw(0x1f), 9);
        let _pm = manager(block, MockPlatform::new());
        assert!(block.is_ready());
        assert_eq!(block.phase(), Phase::Idle);
        assert_eq!(block.requester_wakeup(), 0);
    }

    #[test]
    fn acknowledge_is_written_once_per_round() {
        let block = leak_block();
        let requester = PmRequester::new(block);
        assert!(!block.responder().ack(Ack::Ok), "no request to acknowledge");

        requester.request_suspend(PowerState::Suspended, None);
        assert!(block.responder().ack(Ack::Ok));
        assert!(!block.responder().ack(Ack::Error));
        assert_eq!(requester.ack(), Ack::Ok);

        requester.request_resume();
        assert_eq!(requester.ack(), Ack::Pending);
        assert!(block.responder().ack(Ack::Error));
        assert_eq!(block.phase(), Phase::Resume { ack: Ack::Error });
    }

    #[test]
    fn responder_wakeup_is_optional() {
        let block = leak_block();
        assert_eq!(block.responder_wakeup(), None);
        block.responder().set_next_wakeup(Some(500));
        assert_eq!(block.responder_wakeup(), Some(500));
        block.responder().set_next_wakeup(None);
        assert_eq!(block.responder_wakeup(), None);
    }
}

// ============================================================================
// Suspend refusals
// ============================================================================

mod refusal_tests {
    use super::*;

    #[test]
    fn device_failure_acks_error_without_sleeping() {
        let block = leak_block();
        let mut platform = MockPlatform::new();
        platform.device_status = Some(-16);
        let pm = manager(block, platform);

        PmRequester::new(block).request_suspend(PowerState::Suspended, Some(1000));
        assert_eq!(pm.idle_hook(), IdleOutcome::Refused);

        assert_eq!(
            block.phase(),
            Phase::Suspend {
                target: Some(PowerState::Suspended),
                ack: Ack::Error
            }
        );
        assert_eq!(
            pm.platform().steps(),
            vec![Step::SuspendDevices(PowerState::Suspended)]
        );
    }

    #[test]
    fn device_failure_surfaces_status_from_deep_sleep_entry() {
        let block = leak_block();
        let mut platform = MockPlatform::new();
        platform.device_status = Some(-16);
        let pm = manager(block, platform);
        PmRequester::new(block).request_suspend(PowerState::Suspended, None);

        let err = pm.enter_deep_sleep().unwrap_err();
        assert_eq!(err.code(), -16);
        assert_eq!(block.snapshot().ack(), Ack::Pending);
    }

    #[test]
    fn stale_wakeup_aborts_without_acknowledge() {
        let block = leak_block();
        let pm = manager(block, MockPlatform::new());
        pm.set_next_wakeup(Some(100));

        let requester = PmRequester::new(block);
        requester.request_suspend(PowerState::Suspended, Some(5000));
        assert_eq!(pm.idle_hook(), IdleOutcome::Aborted);
        assert_eq!(pm.idle_hook(), IdleOutcome::Aborted);

        assert_eq!(requester.ack(), Ack::Pending);
        assert!(pm.platform().steps().is_empty());

        let clock = ManualClock::new(64);
        assert_eq!(
            requester.wait_ack(&clock, Duration32k::from_ticks(1024)),
            Err(HandshakeTimeout)
        );
        assert_eq!(requester.withdraw(), Ok(()));
        assert_eq!(block.phase(), Phase::Idle);
        assert_eq!(pm.idle_hook(), IdleOutcome::Awake);
    }

    #[test]
    fn later_local_wakeup_does_not_abort() {
        let block = leak_block();
        let mut platform = MockPlatform::new();
        platform.device_status = Some(-1);
        let pm = manager(block, platform);
        pm.set_next_wakeup(Some(9000));

        PmRequester::new(block).request_suspend(PowerState::Suspended, Some(5000));
        // Gets as far as the devices, which refuse.
        assert_eq!(pm.idle_hook(), IdleOutcome::Refused);
    }

    #[test]
    fn wrong_target_state_is_refused() {
        let block = leak_block();
        let pm = manager(block, MockPlatform::new());
        PmRequester::new(block).request_suspend(PowerState::Shutdown, None);
        assert_eq!(pm.idle_hook(), IdleOutcome::Refused);
        assert_eq!(block.snapshot().ack(), Ack::Error);
        assert!(pm.platform().steps().is_empty());
    }

    #[test]
    fn disallowed_deep_sleep_is_refused() {
        let block = leak_block();
        let mut platform = MockPlatform::new();
        platform.deep_sleep_allowed = false;
        let pm = manager(block, platform);
        PmRequester::new(block).request_suspend(PowerState::Suspended, None);
        assert_eq!(pm.idle_hook(), IdleOutcome::Refused);
    }

    #[test]
    fn withdraw_loses_to_raced_acknowledge() {
        let block = leak_block();
        let requester = PmRequester::new(block);
        requester.request_suspend(PowerState::Suspended, None);
        block.responder().ack(Ack::Error);
        assert_eq!(requester.withdraw(), Err(Ack::Error));
    }

    #[test]
    fn idle_without_request_stays_awake() {
        let block = leak_block();
        let pm = manager(block, MockPlatform::new());
        assert_eq!(pm.idle_hook(), IdleOutcome::Awake);
    }
}

// ============================================================================
// Full round
// ============================================================================

mod round_tests {
    use super::*;

    #[test]
    fn suspend_and_resume_round_trip() {
        let block = leak_block();
        let mut platform = MockPlatform::new();
        platform.sleep_ticks = 2 * 32_768;
        *platform.on_suspend.borrow_mut() = Some(Box::new(move || {
            let requester = PmRequester::new(block);
            assert_eq!(requester.ack(), Ack::Ok);
            requester.request_resume();
        }));
        let pm = manager(block, platform);

        let requester = PmRequester::new(block);
        requester.request_suspend(PowerState::Suspended, Some(70_000));

        let report = match pm.idle_hook() {
            IdleOutcome::Slept(report) => report,
            other => panic!("expected to sleep, got {:?}", other),
        };
        assert_eq!(report.os_ticks, 200);
        assert_eq!(report.elapsed, Duration32k::from_ticks(2 * 32_768));

        assert_eq!(block.phase(), Phase::Resume { ack: Ack::Ok });
        assert_eq!(block.resume_entry(), 0x4000_0100);
        assert_eq!(
            pm.platform().steps(),
            vec![
                Step::SuspendDevices(PowerState::Suspended),
                Step::SuspendSelf,
                Step::Restore,
                Step::ResumeDevices,
                Step::Announce(200),
                Step::RearmMailbox,
                Step::RearmTimer,
            ]
        );

        requester.finish();
        assert_eq!(pm.idle_hook(), IdleOutcome::Awake);
    }

    #[test]
    #[should_panic(expected = "resumed without a resume request")]
    fn resume_without_request_halts() {
        let block = leak_block();
        let pm = manager(block, MockPlatform::new());
        PmRequester::new(block).request_suspend(PowerState::Suspended, None);
        pm.idle_hook();
    }

    #[test]
    fn elapsed_time_rounds_to_nearest_os_tick() {
        let config = PmConfig { os_ticks_per_sec: 100 };
        assert_eq!(config.elapsed_os_ticks(Duration32k::from_ticks(32_768)), 100);
        assert_eq!(config.elapsed_os_ticks(Duration32k::from_ticks(163)), 0);
        assert_eq!(config.elapsed_os_ticks(Duration32k::from_ticks(164)), 1);
        assert_eq!(config.elapsed_os_ticks(Duration32k::from_ticks(0)), 0);
    }
}

// ============================================================================
// Shutdown
// ============================================================================

mod shutdown_tests {
    use super::*;
    use duocore_core::dispatch::PmNotification;

    #[test]
    fn shutdown_notification_halts_on_next_idle() {
        let block = leak_block();
        let pm = manager(block, MockPlatform::new());
        assert_eq!(pm.pm_notification(CoreId::MASTER, 0, 0), 0);
        assert!(block.is_ready());

        let halted = catch_unwind(AssertUnwindSafe(|| pm.idle_hook()));
        assert!(halted.is_err());
        assert!(!block.is_ready());
    }

    #[test]
    fn shutdown_waits_for_policy() {
        let block = leak_block();
        let mut platform = MockPlatform::new();
        platform.shutdown_allowed = false;
        let pm = manager(block, platform);
        assert_eq!(pm.notify(CoreId::MASTER, 1, 0), 0);
        assert_eq!(pm.idle_hook(), IdleOutcome::Awake);
        assert!(block.is_ready());
    }

    #[test]
    fn unknown_pm_request_is_rejected() {
        let block = leak_block();
        let pm = manager(block, MockPlatform::new());
        assert_eq!(pm.notify(CoreId::MASTER, 7, 0), -1);
        assert_eq!(pm.idle_hook(), IdleOutcome::Awake);
    }

    #[test]
    #[should_panic(expected = "core halted")]
    fn direct_shutdown_halts() {
        let block = leak_block();
        let pm = manager(block, MockPlatform::new());
        pm.shutdown();
    }
}
