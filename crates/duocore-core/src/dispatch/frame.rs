//! Inbound frame and request code table.

use duocore_hal::CoreId;

/// One dispatched request, as delivered by the mailbox transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Frame {
    pub source: CoreId,
    pub request: i32,
    pub param1: i32,
    pub param2: i32,
    /// Pointer-sized payload reference.
    pub payload: usize,
}

impl Frame {
    pub const fn new(source: CoreId, request: i32, param1: i32, param2: i32, payload: usize) -> Self {
        Self {
            source,
            request,
            param1,
            param2,
            payload,
        }
    }

    pub fn code(&self) -> Option<RequestCode> {
        RequestCode::from_raw(self.request)
    }
}

/// Request codes. Values are shared with the other core and never renumbered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(i32)]
pub enum RequestCode {
    Message = 0x01,
    Free = 0x02,
    Sync = 0x03,
    AllocPort = 0x10,
    RegisterTestCommandEngine = 0x13,
    PanicNotification = 0x15,
    PowerManagement = 0x16,
    Logger = 0x17,
    InfraPm = 0x18,
    WriteMask = 0x19,
}

impl RequestCode {
    pub const fn from_raw(raw: i32) -> Option<Self> {
        match raw {
            0x01 => Some(RequestCode::Message),
            0x02 => Some(RequestCode::Free),
            0x03 => Some(RequestCode::Sync),
            0x10 => Some(RequestCode::AllocPort),
            0x13 => Some(RequestCode::RegisterTestCommandEngine),
            0x15 => Some(RequestCode::PanicNotification),
            0x16 => Some(RequestCode::PowerManagement),
            0x17 => Some(RequestCode::Logger),
            0x18 => Some(RequestCode::InfraPm),
            0x19 => Some(RequestCode::WriteMask),
            _ => None,
        }
    }

    pub const fn raw(self) -> i32 {
        self as i32
    }
}
