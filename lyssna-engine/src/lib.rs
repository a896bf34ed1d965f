//! lyssna-engine
//!
//! Assembles the capture client, action registry and endpoint orchestrator
//! into a running process. Frontends construct a [`Runtime`] and drive it.

pub mod error;
pub mod request;
pub mod router;
pub mod runtime;

pub use error::EngineError;
pub use request::build_request;
pub use router::{PacketRecord, PacketSink, Router, StreamSink, ANALYSIS_ENDPOINT};
pub use runtime::Runtime;
