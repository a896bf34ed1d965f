use std::time::Duration;

use thiserror::Error;

use lyssna_protocols::{EncodeError, FrameError};

use crate::filter::FilterError;

#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("Failed to connect to {target}: {source}")]
    Connect {
        target: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Timed out connecting to {target} after {timeout:?}")]
    ConnectTimeout { target: String, timeout: Duration },

    #[error("Capture connect cancelled")]
    ConnectCancelled,

    #[error("Capture is already active")]
    AlreadyActive,

    #[error("Capture is not streaming")]
    NotStreaming,

    #[error("Invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    #[error("Failed to encode injected payload: {0}")]
    Encode(#[from] EncodeError),

    #[error("Malformed frame: {0}")]
    Frame(#[from] FrameError),

    #[error("Frame body of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("Frame not completed within {0:?}")]
    ReadTimeout(Duration),

    #[error("Capture proxy closed the channel")]
    Disconnected,

    #[error("IPC I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Error notification delivered to `on_error` subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureFailure {
    pub message: String,
    /// Sequence number of the affected packet, when there is one.
    pub sequence: Option<u64>,
}

impl CaptureFailure {
    pub fn new(message: impl Into<String>, sequence: Option<u64>) -> Self {
        Self {
            message: message.into(),
            sequence,
        }
    }
}
