// lyssna-config/src/validation.rs
//! Custom validation functions for configuration.
//!
//! Provides shared validation logic used across multiple configuration modules.

use std::collections::HashSet;

use validator::ValidationError;

use crate::{BackoffConfig, EndpointConfig};

/// Validate that an IPC channel name is a bare name, not a path.
pub fn validate_channel(name: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new("^[a-zA-Z0-9_.-]{1,64}$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if re.is_match(name) && name != "." && name != ".." {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_channel"))
    }
}

/// Validate an endpoint address: `tcp://host:port`, `http://host:port[/path]`
/// or `unix:///path`.
pub fn validate_address(address: &str) -> Result<(), ValidationError> {
    let re = regex::Regex::new(r"^((tcp|http)://[^/:\s]+:[0-9]{1,5}(/\S*)?|unix:///\S+)$")
        .map_err(|_| ValidationError::new("invalid_regex"))?;
    if !re.is_match(address) {
        return Err(ValidationError::new("invalid_endpoint_address"));
    }
    let port_ok = address
        .split_once("://")
        .and_then(|(_, rest)| rest.split('/').next())
        .and_then(|authority| authority.rsplit_once(':'))
        .map_or(true, |(_, port)| port.parse::<u16>().is_ok());
    if port_ok {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_port"))
    }
}

/// Validate a tracing level name.
pub fn validate_log_level(level: &str) -> Result<(), ValidationError> {
    let valid = ["trace", "debug", "info", "warn", "error"]
        .contains(&level.to_lowercase().as_str());
    if valid {
        Ok(())
    } else {
        Err(ValidationError::new("invalid_log_level"))
    }
}

/// Validate that a given value is a power of two.
pub fn validate_power_of_two(value: usize) -> Result<(), ValidationError> {
    if value.is_power_of_two() {
        Ok(())
    } else {
        Err(ValidationError::new("must_be_power_of_two"))
    }
}

/// Validate that every endpoint has a distinct, non-empty name.
pub fn validate_unique_endpoints(endpoints: &[EndpointConfig]) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for endpoint in endpoints {
        if endpoint.name.trim().is_empty() {
            return Err(ValidationError::new("empty_endpoint_name"));
        }
        if !seen.insert(endpoint.name.as_str()) {
            let mut err = ValidationError::new("duplicate_endpoint_name");
            err.add_param("name".into(), &endpoint.name);
            return Err(err);
        }
    }
    Ok(())
}

/// Validate that the backoff floor does not exceed its cap.
pub fn validate_backoff(backoff: &BackoffConfig) -> Result<(), ValidationError> {
    if backoff.floor_ms <= backoff.cap_ms {
        Ok(())
    } else {
        Err(ValidationError::new("backoff_floor_exceeds_cap"))
    }
}
