use thiserror::Error;
use tokio::task::JoinError;

use lyssna_capture::CaptureError;
use lyssna_config::ConfigError;
use lyssna_orchestrator::OrchestratorError;
use lyssna_registry::ParamError;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Orchestrator error: {0}")]
    Orchestrator(#[from] OrchestratorError),

    #[error("Invalid request: {0}")]
    Request(#[from] ParamError),

    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("Runtime already running")]
    AlreadyRunning,

    #[error("Task failed: {0}")]
    Task(String),
}

impl From<JoinError> for EngineError {
    fn from(err: JoinError) -> Self {
        EngineError::Task(err.to_string())
    }
}
