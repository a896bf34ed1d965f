use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading a registry source.
#[derive(Debug, Error)]
pub enum LoadError {
    #[error("Failed to read registry source {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid JSON registry: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid YAML registry: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Unsupported registry format: {0}")]
    UnsupportedFormat(PathBuf),

    #[error("Action name must not be empty")]
    EmptyName,

    #[error("Duplicate action name {0}")]
    DuplicateName(String),

    #[error("Command id {id} used by both {first} and {second}")]
    DuplicateCommandId {
        id: u32,
        first: String,
        second: String,
    },
}

/// Errors raised when a payload does not satisfy an action's parameters.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("Unknown action {0}")]
    UnknownAction(String),

    #[error("Payload for {action} must be an object, got {found}")]
    NotAnObject { action: String, found: &'static str },

    #[error("Missing required parameter {parameter} for {action}")]
    Missing { action: String, parameter: String },

    #[error("Parameter {parameter} of {action} has type {found}")]
    TypeMismatch {
        action: String,
        parameter: String,
        found: &'static str,
    },
}
