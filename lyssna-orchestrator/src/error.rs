use thiserror::Error;

use crate::endpoint::AddressError;

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Unknown endpoint: {0}")]
    UnknownEndpoint(String),

    #[error("Endpoint already registered: {0}")]
    DuplicateEndpoint(String),

    #[error("Invalid address for endpoint '{name}': {source}")]
    InvalidAddress {
        name: String,
        #[source]
        source: AddressError,
    },
}
