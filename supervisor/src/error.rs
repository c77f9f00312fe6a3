//! Supervisor-specific error types

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use shared::{Phase, SharedError};

/// Why a liveness probe against the companion agent failed
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProbeError {
    #[error("Health probe timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("Companion agent unreachable: {message}")]
    Unreachable { message: String },

    #[error("Unexpected health probe response: {message}")]
    UnexpectedResponse { message: String },
}

#[derive(Error, Debug)]
pub enum SupervisorError {
    #[error("Server executable path is not configured")]
    ExecutableNotConfigured,

    #[error("Server executable not found: {}", path.display())]
    ExecutableMissing { path: PathBuf },

    #[error("Failed to spawn server process {}: {source}", path.display())]
    SpawnFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Stale '{name}' processes still running after {waited:?}")]
    StaleProcessKillFailed { name: String, waited: Duration },

    #[error("Health probe failed: {0}")]
    Probe(#[from] ProbeError),

    #[error("Server did not become ready within {timeout:?}")]
    RestartTimeout { timeout: Duration },

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: Phase, to: Phase },

    #[error("Supervisor loop is not running")]
    LoopUnavailable,

    #[error("Configuration error: {message}")]
    ConfigurationError { message: String },

    #[error("Shared component error")]
    SharedError(#[from] SharedError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    JsonError(#[from] serde_json::Error),
}

impl SupervisorError {
    pub fn config(message: impl Into<String>) -> Self {
        SupervisorError::ConfigurationError {
            message: message.into(),
        }
    }

    /// Configuration problems keep the loop idle; they are not spawn failures
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            SupervisorError::ExecutableNotConfigured
                | SupervisorError::ExecutableMissing { .. }
                | SupervisorError::ConfigurationError { .. }
        )
    }
}

pub type SupervisorResult<T> = Result<T, SupervisorError>;
