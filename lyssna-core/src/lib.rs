//! # lyssna-core
//!
//! Shared event types for the capture pipeline.
//!
//! ### Key Submodules:
//! - `packet`: the captured, optionally decoded, unit of wire data
//! - `observer`: broadcast-backed fire-and-forget event streams
//! - `queue`: bounded packet backlog for pull-based consumers

pub mod observer;
pub mod packet;
pub mod queue;

pub mod prelude {
    pub use crate::observer::*;
    pub use crate::packet::*;
    pub use crate::queue::*;
}

pub use observer::{Observer, Subscription};
pub use packet::Packet;
pub use queue::PacketQueue;
