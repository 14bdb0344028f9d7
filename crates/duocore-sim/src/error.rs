use duocore_core::pm::{Ack, HandshakeTimeout};

/// Failures of a simulation scenario.
#[derive(Debug, thiserror::Error)]
pub enum SimError {
    /// The slave's port request did not produce a port.
    #[error("port allocation failed with status {0}")]
    PortAllocation(i32),

    /// A message was received ahead of an earlier one.
    #[error("message {got} received, expected {expected}")]
    OutOfOrder { expected: u32, got: u32 },

    /// The consumer gave up waiting.
    #[error("consumer timed out after {received} of {expected} messages")]
    Starved { received: u32, expected: u32 },

    /// Messages left without a free notification, or freed twice.
    #[error("{leaked} messages leaked, {protocol_errors} protocol errors")]
    Ownership {
        leaked: usize,
        protocol_errors: usize,
    },

    /// The masked write did not land.
    #[error("masked write produced {got:#010x}, expected {expected:#010x}")]
    MaskedWrite { expected: u32, got: u32 },

    /// The companion thread stopped reporting (it halted or panicked).
    #[error("companion core stopped responding")]
    CompanionSilent,

    /// The companion core acknowledged with something unexpected.
    #[error("unexpected acknowledge {0:?}")]
    UnexpectedAck(Ack),

    /// Resume was never acknowledged.
    #[error("resume handshake failed: {0}")]
    Resume(HandshakeTimeout),

    /// A dispatched request returned a failure status.
    #[error("request rejected with status {0}")]
    UnexpectedStatus(i32),

    /// The companion core was still ready after the shutdown deadline.
    #[error("companion core ignored the shutdown request")]
    ShutdownIgnored,
}
