//! Endpoint connection state.

use std::fmt;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EndpointStatus {
    Disconnected,
    Connecting,
    Connected,
    /// Connected, but the last health check failed.
    Degraded,
    /// Failure threshold reached; waiting out the backoff.
    Error,
}

impl EndpointStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Disconnected => "disconnected",
            EndpointStatus::Connecting => "connecting",
            EndpointStatus::Connected => "connected",
            EndpointStatus::Degraded => "degraded",
            EndpointStatus::Error => "error",
        }
    }

    pub fn is_healthy(&self) -> bool {
        *self == EndpointStatus::Connected
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Snapshot of one endpoint's connection state.
#[derive(Debug, Clone, PartialEq)]
pub struct EndpointState {
    pub status: EndpointStatus,
    pub last_error: Option<String>,
    pub consecutive_failures: u32,
    /// Wall clock time of the last successful connect or health check.
    pub last_healthy: Option<DateTime<Utc>>,
    /// When the current status was entered.
    pub since: Instant,
}

impl EndpointState {
    pub fn new() -> Self {
        Self {
            status: EndpointStatus::Disconnected,
            last_error: None,
            consecutive_failures: 0,
            last_healthy: None,
            since: Instant::now(),
        }
    }
}

impl Default for EndpointState {
    fn default() -> Self {
        Self::new()
    }
}

/// Published on every status change.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChange {
    pub endpoint: String,
    pub previous: EndpointStatus,
    pub state: EndpointState,
}
