// lyssna-config/src/capture.rs
//! Traffic capture configuration.
//!
//! Parameters for the IPC link to the capture proxy:
//! - Channel name and timeouts
//! - Frame size and decode depth limits
//! - Backlog and observer buffering

use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};
use validator::{self, Validate};

use crate::validation;
use crate::BackoffConfig;

/// Traffic capture configuration.
#[derive(Debug, Serialize, Deserialize, Validate, Clone)]
#[serde(default)]
pub struct CaptureConfig {
    /// Local channel name. Becomes `<tmp>/<channel>.sock` on Unix and
    /// `\\.\pipe\<channel>` on Windows.
    #[validate(custom(function = validation::validate_channel))]
    pub channel: String,

    /// Start capturing when the runtime starts.
    pub auto_start: bool,

    /// Filter expression applied when capture starts.
    pub filter: Option<String>,

    /// Connect timeout (milliseconds).
    #[validate(range(min = 10, max = 60_000))]
    pub connect_timeout_ms: u64,

    /// Time allowed for the rest of a frame once it has started arriving
    /// (milliseconds).
    #[validate(range(min = 10, max = 300_000))]
    pub read_timeout_ms: u64,

    /// Largest frame body accepted, in bytes.
    #[validate(range(min = 1024, max = 1073741824))]
    #[serde(deserialize_with = "deserialize_size")]
    pub max_frame_len: usize,

    /// Nesting ceiling for decoded payloads.
    #[validate(range(min = 1, max = 1024))]
    pub max_depth: usize,

    /// Packets kept for pull-based consumers (must be a power of two).
    #[validate(range(min = 16, max = 1048576))]
    #[validate(custom(function = validation::validate_power_of_two))]
    pub backlog_capacity: usize,

    /// Buffered events per observer before slow subscribers start lagging.
    #[validate(range(min = 1, max = 65536))]
    pub observer_capacity: usize,

    /// Delay between capture restarts after an IPC failure.
    #[validate(nested)]
    #[validate(custom(function = validation::validate_backoff))]
    pub reconnect: BackoffConfig,
}

impl CaptureConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            channel: "lyssna-capture".into(),
            auto_start: true,
            filter: None,
            connect_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            max_frame_len: 16 * 1024 * 1024,
            max_depth: 64,
            backlog_capacity: 1024,
            observer_capacity: 256,
            reconnect: BackoffConfig {
                floor_ms: 500,
                cap_ms: 30_000,
                jitter_ratio: 0.2,
            },
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SizeValue {
    Num(usize),
    Str(String),
}

/// Accepts either a byte count or a human-friendly size such as `"16MiB"`.
fn deserialize_size<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    match SizeValue::deserialize(deserializer)? {
        SizeValue::Num(n) => Ok(n),
        SizeValue::Str(s) => parse_size(&s).map_err(serde::de::Error::custom),
    }
}

fn parse_size(s: &str) -> Result<usize, String> {
    let s = s.trim();
    let split = s
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let number: f64 = number
        .parse()
        .map_err(|_| format!("Invalid size value: {s}"))?;
    let multiplier = match unit.trim().to_lowercase().as_str() {
        "" | "b" => 1.0,
        "kb" | "kib" => 1024.0,
        "mb" | "mib" => 1024.0 * 1024.0,
        "gb" | "gib" => 1024.0 * 1024.0 * 1024.0,
        other => return Err(format!("Unknown size unit: {other}")),
    };
    Ok((number * multiplier) as usize)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sizes() {
        assert_eq!(parse_size("16MiB"), Ok(16 * 1024 * 1024));
        assert_eq!(parse_size("512 kb"), Ok(512 * 1024));
        assert_eq!(parse_size("4096"), Ok(4096));
        assert!(parse_size("12 parsecs").is_err());
    }

    #[test]
    fn timeouts_as_durations() {
        let config = CaptureConfig::default();
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert_eq!(config.read_timeout(), Duration::from_secs(10));
    }
}
