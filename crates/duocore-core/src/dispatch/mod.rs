//! Cross-core request demultiplexing.

pub mod dispatcher;
pub mod frame;

pub use dispatcher::{masked_write, Dispatcher, FallbackHandler, PmNotification};
pub use frame::{Frame, RequestCode};
