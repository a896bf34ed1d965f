//! lyssna-capture
//!
//! Client for the capture proxy's local IPC channel. Frames read from the
//! channel are decoded, named through the action registry and delivered to
//! observers as [`lyssna_core::Packet`]s. Structured requests travel the other
//! way through [`CaptureClient::inject`].

pub mod client;
pub mod connector;
pub mod error;
pub mod filter;
pub mod pipeline;
mod reader;
pub mod session;

pub use client::{CaptureClient, CaptureState};
pub use connector::{BoxedStream, Connector, IpcStream, LocalSocketConnector};
pub use error::{CaptureError, CaptureFailure};
pub use filter::{FilterError, PacketFilter};
pub use pipeline::FramePipeline;
pub use session::SessionStats;
