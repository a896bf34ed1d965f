//! Auxiliary endpoint configuration.
//!
//! Health-check cadence, failure threshold and retry backoff shared by every
//! endpoint, plus the endpoint list itself.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

use crate::validation;

/// Exponential backoff parameters.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct BackoffConfig {
    /// Smallest delay (milliseconds).
    #[validate(range(min = 1, max = 3_600_000))]
    pub floor_ms: u64,

    /// Largest delay before jitter (milliseconds).
    #[validate(range(min = 1, max = 3_600_000))]
    pub cap_ms: u64,

    /// Jitter added on top of the delay, as a fraction of it.
    #[validate(range(min = 0.0, max = 1.0))]
    #[serde(default = "default_jitter_ratio")]
    pub jitter_ratio: f64,
}

fn default_jitter_ratio() -> f64 {
    0.2
}

impl BackoffConfig {
    pub fn floor(&self) -> Duration {
        Duration::from_millis(self.floor_ms)
    }

    pub fn cap(&self) -> Duration {
        Duration::from_millis(self.cap_ms)
    }
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            floor_ms: 1_000,
            cap_ms: 60_000,
            jitter_ratio: default_jitter_ratio(),
        }
    }
}

/// One auxiliary endpoint.
#[derive(Debug, Serialize, Deserialize, Validate, Clone, PartialEq)]
pub struct EndpointConfig {
    #[validate(length(min = 1, max = 64))]
    pub name: String,

    #[validate(custom(function = validation::validate_address))]
    pub address: String,

    #[serde(default = "default_true")]
    pub enabled: bool,
}

fn default_true() -> bool {
    true
}

impl EndpointConfig {
    pub fn new(name: impl Into<String>, address: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            address: address.into(),
            enabled: true,
        }
    }
}

/// Connection orchestrator configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct OrchestratorConfig {
    /// Time between health checks of a connected endpoint (milliseconds).
    #[validate(range(min = 10, max = 3_600_000))]
    pub health_interval_ms: u64,

    /// Bound on each connect or health probe (milliseconds).
    #[validate(range(min = 10, max = 300_000))]
    pub probe_timeout_ms: u64,

    /// Consecutive failures before an endpoint enters `Error`.
    #[validate(range(min = 1, max = 100))]
    pub failure_threshold: u32,

    /// Delay before reconnecting an endpoint in `Error`.
    #[validate(nested)]
    #[validate(custom(function = validation::validate_backoff))]
    pub backoff: BackoffConfig,

    /// Buffered status changes per observer.
    #[validate(range(min = 1, max = 65536))]
    pub status_capacity: usize,

    #[validate(nested)]
    #[validate(custom(function = validation::validate_unique_endpoints))]
    pub endpoints: Vec<EndpointConfig>,
}

impl OrchestratorConfig {
    pub fn health_interval(&self) -> Duration {
        Duration::from_millis(self.health_interval_ms)
    }

    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn endpoint(&self, name: &str) -> Option<&EndpointConfig> {
        self.endpoints.iter().find(|e| e.name == name)
    }
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            health_interval_ms: 10_000,
            probe_timeout_ms: 3_000,
            failure_threshold: 3,
            backoff: BackoffConfig::default(),
            status_capacity: 256,
            endpoints: vec![
                EndpointConfig::new("knowledge-query", "tcp://127.0.0.1:8401"),
                EndpointConfig::new("traffic-analysis", "tcp://127.0.0.1:8402"),
                EndpointConfig::new("tool-execution", "http://127.0.0.1:8403/health"),
                EndpointConfig::new("debug-protocol", "tcp://127.0.0.1:8404"),
            ],
        }
    }
}
