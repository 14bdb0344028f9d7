//! Cross-core power handshake over the shared PM block.
//!
//! A round runs `Idle -> Suspend -> ack -> [deep sleep] -> Resume -> ack ->
//! Idle`. The requester owns the request fields, the responder owns the
//! acknowledge fields.

pub mod requester;
pub mod responder;
pub mod shared;

pub use requester::{HandshakeTimeout, PmRequester};
pub use responder::{DeepSleepError, IdleOutcome, PowerManager, ResumeReport, ShutdownRequest};
pub use shared::{Ack, Phase, PmRequest, RequestKind, SharedPmBlock};
