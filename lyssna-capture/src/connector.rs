//! IPC transport to the capture proxy.
//!
//! The proxy owns the server side of the channel; this crate only connects.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite};

/// A bidirectional byte stream to the proxy.
pub trait IpcStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> IpcStream for T {}

pub type BoxedStream = Box<dyn IpcStream>;

/// Opens connections to the capture proxy.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self) -> io::Result<BoxedStream>;

    /// Human readable target used in logs and errors.
    fn target(&self) -> String;
}

/// Connects to a local channel: a Unix domain socket on Unix, a named pipe on
/// Windows.
#[derive(Debug, Clone)]
pub struct LocalSocketConnector {
    #[cfg(unix)]
    path: std::path::PathBuf,
    #[cfg(windows)]
    pipe: String,
}

impl LocalSocketConnector {
    /// Connector for a channel name, e.g. `lyssna-capture`.
    #[cfg(unix)]
    pub fn for_channel(channel: &str) -> Self {
        Self {
            path: std::env::temp_dir().join(format!("{channel}.sock")),
        }
    }

    #[cfg(windows)]
    pub fn for_channel(channel: &str) -> Self {
        Self {
            pipe: format!(r"\\.\pipe\{channel}"),
        }
    }

    /// Connector for an explicit socket path.
    #[cfg(unix)]
    pub fn at_path(path: impl Into<std::path::PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl Connector for LocalSocketConnector {
    #[cfg(unix)]
    async fn connect(&self) -> io::Result<BoxedStream> {
        let stream = tokio::net::UnixStream::connect(&self.path).await?;
        Ok(Box::new(stream))
    }

    #[cfg(windows)]
    async fn connect(&self) -> io::Result<BoxedStream> {
        let client = tokio::net::windows::named_pipe::ClientOptions::new().open(&self.pipe)?;
        Ok(Box::new(client))
    }

    #[cfg(unix)]
    fn target(&self) -> String {
        self.path.display().to_string()
    }

    #[cfg(windows)]
    fn target(&self) -> String {
        self.pipe.clone()
    }
}
