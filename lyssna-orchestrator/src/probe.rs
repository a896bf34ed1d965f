//! Connect and health primitives for auxiliary endpoints.

use std::io;

use async_trait::async_trait;
use thiserror::Error;
use tokio::net::TcpStream;
use tracing::trace;

use crate::endpoint::{EndpointAddress, EndpointDescriptor};

#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Probe timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Transport not supported on this platform: {0}")]
    Unsupported(String),
}

/// Liveness primitives for an endpoint. Implementations need not enforce
/// timeouts; the orchestrator bounds every call.
#[async_trait]
pub trait EndpointProbe: Send + Sync {
    async fn connect(&self, endpoint: &EndpointDescriptor) -> Result<(), ProbeError>;

    async fn health_check(&self, endpoint: &EndpointDescriptor) -> Result<(), ProbeError>;
}

/// Treats a successful socket connect as proof of life.
#[derive(Debug, Clone, Copy, Default)]
pub struct SocketProbe;

impl SocketProbe {
    async fn open(&self, address: &EndpointAddress) -> Result<(), ProbeError> {
        match address {
            EndpointAddress::Tcp { .. } | EndpointAddress::Http { .. } => {
                let target = address
                    .socket_addr()
                    .ok_or_else(|| ProbeError::Unsupported(address.to_string()))?;
                let stream = TcpStream::connect(&target).await?;
                trace!(%target, "TCP probe connected");
                drop(stream);
                Ok(())
            }
            #[cfg(unix)]
            EndpointAddress::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                drop(stream);
                Ok(())
            }
            #[cfg(not(unix))]
            EndpointAddress::Unix(_) => Err(ProbeError::Unsupported(address.to_string())),
        }
    }
}

#[async_trait]
impl EndpointProbe for SocketProbe {
    async fn connect(&self, endpoint: &EndpointDescriptor) -> Result<(), ProbeError> {
        self.open(&endpoint.address).await
    }

    async fn health_check(&self, endpoint: &EndpointDescriptor) -> Result<(), ProbeError> {
        self.open(&endpoint.address).await
    }
}

#[cfg(test)]
mod tests {
    use tokio::net::TcpListener;

    use super::*;

    fn descriptor(port: u16) -> EndpointDescriptor {
        EndpointDescriptor::new(
            "kb",
            EndpointAddress::Tcp {
                host: "127.0.0.1".into(),
                port,
            },
        )
    }

    #[tokio::test]
    async fn tcp_probe_succeeds_against_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        SocketProbe.connect(&descriptor(port)).await.unwrap();
        SocketProbe.health_check(&descriptor(port)).await.unwrap();
    }

    #[tokio::test]
    async fn tcp_probe_fails_against_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);
        assert!(matches!(
            SocketProbe.connect(&descriptor(port)).await,
            Err(ProbeError::Io(_))
        ));
    }
}
