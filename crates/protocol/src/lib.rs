//! Wire protocol for the CreatorGuard dashboard event stream.
//!
//! Every frame is a JSON object `{type, payload, timestamp}` exchanged over a
//! single WebSocket connection.

pub mod constants;
pub mod envelope;

pub use constants::MessageType;
pub use envelope::{FrameError, Message};
