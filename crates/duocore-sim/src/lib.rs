//! Host simulation of the two cores.
//!
//! Each core is a [`node::Node`] behind its own dispatcher. Frames are
//! "delivered" by calling the peer's dispatcher directly, the companion core's
//! idle loop runs on a std thread, and the shared PM block lives in leaked
//! host memory.

pub mod clock;
pub mod error;
pub mod memory;
pub mod message;
pub mod node;
pub mod platform;
pub mod scenario;
pub mod semaphore;
pub mod system;

pub use error::SimError;
pub use scenario::{run_shutdown, run_suspend, run_traffic, SimConfig};
pub use system::System;
