//! Supervision of auxiliary endpoints: connection state machine, health
//! checks and jittered reconnect backoff.

pub mod backoff;
pub mod endpoint;
pub mod error;
pub mod orchestrator;
pub mod probe;
pub mod state;
mod supervisor;

pub use backoff::Backoff;
pub use endpoint::{AddressError, EndpointAddress, EndpointDescriptor};
pub use error::OrchestratorError;
pub use orchestrator::Orchestrator;
pub use probe::{EndpointProbe, ProbeError, SocketProbe};
pub use state::{EndpointState, EndpointStatus, StatusChange};
