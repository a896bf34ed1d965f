//! Action registry source configuration.

use serde::{Deserialize, Serialize};
use validator::{self, Validate};

/// Registry source configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct RegistryConfig {
    /// JSON or YAML action catalog.
    #[validate(length(min = 1))]
    pub path: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            path: "config/actions.yaml".into(),
        }
    }
}
