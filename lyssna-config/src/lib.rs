//! # Lyssna Configuration System
//!
//! Hierarchical configuration for the capture client, action registry,
//! endpoint orchestrator and telemetry.
//!
//! ## Features
//! - **Layered sources**: defaults, YAML files and `LYSSNA_*` environment variables
//! - **Validation**: range checks plus custom validators for channel names,
//!   endpoint addresses and backoff bounds

#![warn(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

mod capture;
mod error;
mod orchestrator;
mod registry;
mod telemetry;
pub mod validation;

pub use capture::CaptureConfig;
pub use error::ConfigError;
pub use orchestrator::{BackoffConfig, EndpointConfig, OrchestratorConfig};
pub use registry::RegistryConfig;
pub use telemetry::TelemetryConfig;

/// Base configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "config/lyssna.yaml";

const ENV_PREFIX: &str = "LYSSNA_";

/// Top-level configuration container for all Lyssna components.
#[derive(Debug, Serialize, Deserialize, Validate, Default, Clone)]
#[serde(default)]
pub struct LyssnaConfig {
    /// IPC link to the capture proxy.
    #[validate(nested)]
    pub capture: CaptureConfig,

    /// Action catalog source.
    #[validate(nested)]
    pub registry: RegistryConfig,

    /// Auxiliary endpoints and their supervision.
    #[validate(nested)]
    pub orchestrator: OrchestratorConfig,

    /// Logging and metrics.
    #[validate(nested)]
    pub telemetry: TelemetryConfig,
}

impl LyssnaConfig {
    /// Load configuration from default files and environment.
    ///
    /// Hierarchy:
    /// 1. Default values
    /// 2. `config/lyssna.yaml` - base settings. If missing, defaults are used.
    /// 3. `config/<LYSSNA_ENV>.yaml` - environment-specific overrides.
    /// 4. `LYSSNA_*` environment variables, `__` separating nested keys.
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(LyssnaConfig::default()));

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            figment = figment.merge(Yaml::file(DEFAULT_CONFIG_FILE));
        } else {
            eprintln!("{DEFAULT_CONFIG_FILE} not found, using default configuration");
        }

        let env = std::env::var("LYSSNA_ENV").unwrap_or_else(|_| "production".into());
        let env_file = format!("config/{}.yaml", env);
        if Path::new(&env_file).exists() {
            figment = figment.merge(Yaml::file(env_file));
        }

        Self::extract(figment)
    }

    /// Load configuration from a specific file layered over the defaults.
    pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.to_path_buf()));
        }

        let figment =
            Figment::from(Serialized::defaults(LyssnaConfig::default())).merge(Yaml::file(path));
        Self::extract(figment)
    }

    fn extract(figment: Figment) -> Result<Self, ConfigError> {
        figment
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .map_err(ConfigError::from)
            .and_then(|config: Self| {
                config.validate()?;
                Ok(config)
            })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn full_config_validation() {
        let config = LyssnaConfig::default();
        config.validate().expect("Default config should validate");
        assert_eq!(config.orchestrator.endpoints.len(), 4);
        assert!(config.orchestrator.endpoint("traffic-analysis").is_some());
    }

    #[test]
    fn environment_override() {
        std::env::set_var("LYSSNA_CAPTURE__BACKLOG_CAPACITY", "8192");
        let config = LyssnaConfig::load().unwrap();
        std::env::remove_var("LYSSNA_CAPTURE__BACKLOG_CAPACITY");
        assert_eq!(config.capture.backlog_capacity, 8192);
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
        writeln!(
            file,
            "capture:\n  channel: test-proxy\n  max_frame_len: 1MiB\norchestrator:\n  failure_threshold: 5\n  endpoints:\n    - name: kb\n      address: unix:///tmp/kb.sock"
        )
        .unwrap();
        let config = LyssnaConfig::load_from_path(file.path()).unwrap();
        assert_eq!(config.capture.channel, "test-proxy");
        assert_eq!(config.capture.max_frame_len, 1024 * 1024);
        assert_eq!(config.capture.read_timeout_ms, 10_000);
        assert_eq!(config.orchestrator.failure_threshold, 5);
        assert_eq!(config.orchestrator.endpoints.len(), 1);
        assert!(config.orchestrator.endpoints[0].enabled);
    }

    #[test]
    fn invalid_values_are_reported() {
        let mut config = LyssnaConfig::default();
        config.orchestrator.backoff.floor_ms = 120_000;
        config.orchestrator.endpoints.push(EndpointConfig::new("kb", "smtp://x:25"));
        let err = ConfigError::from(config.validate().unwrap_err());
        let message = err.to_string();
        assert!(message.contains("Invalid configuration"));
    }

    #[test]
    fn missing_file() {
        assert!(matches!(
            LyssnaConfig::load_from_path("/nonexistent/lyssna.yaml"),
            Err(ConfigError::FileNotFound(_))
        ));
    }
}
