#![cfg_attr(not(test), no_std)]

//! Inter-core communication and power coordination for a dual-core SoC.
//!
//! Generic over the contracts in `duocore-hal`, so the same code runs on the
//! companion core, on the application core, and on the host for tests.

pub mod config;
pub mod dispatch;
pub mod fatal;
pub mod pm;
pub mod pool;
pub mod port;
pub mod queue;

pub use dispatch::{Dispatcher, FallbackHandler, Frame, PmNotification, RequestCode};
pub use fatal::{fatal, last_fatal, FatalCause};
pub use pool::{Pool, SharedPool, SlotId};
pub use port::{PortEntry, PortId, PortTable, RouteError};
pub use queue::{Insert, QueueId, QueueService, QueueStats, RecvError, SendError};
