//! Tests for the request dispatcher, using a recording collaborator.

mod common;

use std::sync::atomic::Ordering;
use std::sync::Mutex;

use common::{Call, MockCollab};
use duocore_core::dispatch::{masked_write, Dispatcher, FallbackHandler, Frame, RequestCode};
use duocore_hal::{CoreId, ExecContext};

const TASK: ExecContext = ExecContext::Task;

fn frame(code: RequestCode, param1: i32, param2: i32, payload: usize) -> Frame {
    Frame::new(CoreId::SLAVE, code.raw(), param1, param2, payload)
}

/// Fallback that records every frame it is handed.
#[derive(Default)]
struct RecordingFallback {
    frames: Mutex<Vec<Frame>>,
}

impl FallbackHandler for RecordingFallback {
    fn handle(&self, frame: &Frame) -> i32 {
        self.frames.lock().unwrap().push(*frame);
        -22
    }
}

fn leak_fallback() -> &'static RecordingFallback {
    Box::leak(Box::new(RecordingFallback::default()))
}

// ============================================================================
// Masked write
// ============================================================================

mod masked_write_tests {
    use super::*;

    #[test]
    fn masked_byte_takes_value_bits() {
        let result = masked_write(0xF0F0_F0F0, 0x0F0F_0F0F, 0x0000_00FF);
        assert_eq!(result & 0xFF, 0x0F);
        assert_eq!(result, 0xF0F0_F00F);
    }

    #[test]
    fn empty_mask_leaves_data_untouched() {
        assert_eq!(masked_write(0xF0F0_F0F0, 0x0F0F_0F0F, 0), 0xF0F0_F0F0);
    }

    #[test]
    fn full_mask_replaces_word() {
        assert_eq!(masked_write(0x1234_5678, 0xCAFE_F00D, u32::MAX), 0xCAFE_F00D);
    }

    #[test]
    fn dispatch_applies_write_to_addressed_word() {
        let collab = MockCollab::new();
        collab.words[1].store(0xF0F0_F0F0, Ordering::SeqCst);
        let dispatcher = Dispatcher::new(collab);

        let status = dispatcher.dispatch(
            ExecContext::Interrupt,
            &frame(RequestCode::WriteMask, 0x0F0F_0F0F, 0xFF, 0x1004),
        );

        assert_eq!(status, 0);
        let collab = dispatcher.collaborators();
        assert_eq!(collab.words[1].load(Ordering::SeqCst), 0xF0F0_F00F);
        assert_eq!(collab.words[0].load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dispatch_ignores_unmapped_address() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        let status = dispatcher.dispatch(TASK, &frame(RequestCode::WriteMask, 1, 1, 0x9000));
        assert_eq!(status, 0);
        assert!(dispatcher
            .collaborators()
            .words
            .iter()
            .all(|w| w.load(Ordering::SeqCst) == 0));
    }
}

// ============================================================================
// Built-in requests
// ============================================================================

mod builtin_tests {
    use super::*;

    #[test]
    fn alloc_port_binds_port_to_requesting_core() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        let port = dispatcher.dispatch(TASK, &frame(RequestCode::AllocPort, 0, 0, 0));
        assert_eq!(port, 1);
        assert_eq!(
            dispatcher.collaborators().calls(),
            vec![Call::Allocate, Call::BindCore(1, CoreId::SLAVE)]
        );
    }

    #[test]
    fn message_is_routed_and_status_echoed() {
        let mut collab = MockCollab::new();
        collab.route_status = -5;
        let dispatcher = Dispatcher::new(collab);
        let status = dispatcher.dispatch(TASK, &frame(RequestCode::Message, 0, 0, 0xABCD));
        assert_eq!(status, -5);
        assert_eq!(dispatcher.collaborators().calls(), vec![Call::Route(0xABCD)]);
    }

    #[test]
    fn free_releases_message() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        assert_eq!(dispatcher.dispatch(TASK, &frame(RequestCode::Free, 0, 0, 0x40)), 0);
        assert_eq!(dispatcher.collaborators().calls(), vec![Call::Free(0x40)]);
    }

    #[test]
    fn panic_notification_names_core_from_param1() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        let status = dispatcher.dispatch(TASK, &frame(RequestCode::PanicNotification, 0, 0, 0));
        assert_eq!(status, 0);
        assert_eq!(dispatcher.collaborators().calls(), vec![Call::Panic(CoreId::MASTER)]);
    }

    #[test]
    fn infra_pm_goes_to_power_notification() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        dispatcher.dispatch(TASK, &frame(RequestCode::InfraPm, 1, 3, 0));
        assert_eq!(
            dispatcher.collaborators().calls(),
            vec![Call::Pm(CoreId::SLAVE, 1, 3)]
        );
    }

    #[test]
    fn reserved_traffic_is_forwarded_uninterpreted() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        assert_eq!(dispatcher.dispatch(TASK, &frame(RequestCode::Logger, 0, 0, 0x80)), 0);
        assert_eq!(
            dispatcher.dispatch(TASK, &frame(RequestCode::RegisterTestCommandEngine, 4, 5, 0x90)),
            7
        );
        assert_eq!(
            dispatcher.collaborators().calls(),
            vec![
                Call::Logger(CoreId::SLAVE, 0x80),
                Call::TestCommand(CoreId::SLAVE, 4, 5, 0x90),
            ]
        );
    }
}

// ============================================================================
// Fallback handler
// ============================================================================

mod fallback_tests {
    use super::*;

    #[test]
    fn unknown_code_without_fallback_is_neutral() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        let status = dispatcher.dispatch(TASK, &Frame::new(CoreId::SLAVE, 0x7F, 1, 2, 3));
        assert_eq!(status, 0);
        assert!(dispatcher.collaborators().calls().is_empty());
        assert!(!dispatcher.has_fallback());
    }

    #[test]
    fn unknown_code_reaches_fallback_with_exact_tuple() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        let fallback = leak_fallback();
        dispatcher.install_fallback(fallback);

        let sent = Frame::new(CoreId::MASTER, 0x7F, -1, 0x55, 0xDEAD_0000);
        assert_eq!(dispatcher.dispatch(TASK, &sent), -22);
        assert_eq!(*fallback.frames.lock().unwrap(), vec![sent]);
        assert!(dispatcher.collaborators().calls().is_empty());
    }

    #[test]
    fn sync_and_power_management_codes_are_not_builtins() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        let fallback = leak_fallback();
        dispatcher.install_fallback(fallback);

        dispatcher.dispatch(TASK, &frame(RequestCode::Sync, 0, 0, 0));
        dispatcher.dispatch(TASK, &frame(RequestCode::PowerManagement, 0, 0, 0));
        let codes: Vec<i32> = fallback.frames.lock().unwrap().iter().map(|f| f.request).collect();
        assert_eq!(codes, vec![0x03, 0x16]);
    }

    #[test]
    fn closures_can_serve_as_fallback() {
        static CLOSURE: fn(&Frame) -> i32 = |f| f.param1 + f.param2;
        let dispatcher = Dispatcher::new(MockCollab::new());
        dispatcher.install_fallback(&CLOSURE);
        assert_eq!(dispatcher.dispatch(TASK, &Frame::new(CoreId::SLAVE, 0x60, 2, 3, 0)), 5);
    }

    #[test]
    #[should_panic(expected = "fallback handler already installed")]
    fn second_install_halts() {
        let dispatcher = Dispatcher::new(MockCollab::new());
        dispatcher.install_fallback(leak_fallback());
        dispatcher.install_fallback(leak_fallback());
    }
}

#[test]
fn request_codes_are_stable() {
    assert_eq!(RequestCode::Message.raw(), 0x01);
    assert_eq!(RequestCode::AllocPort.raw(), 0x10);
    assert_eq!(RequestCode::WriteMask.raw(), 0x19);
    assert_eq!(RequestCode::from_raw(0x18), Some(RequestCode::InfraPm));
    assert_eq!(RequestCode::from_raw(0x04), None);
}
