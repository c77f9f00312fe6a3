//! Core types used throughout the supervisor system

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use crate::errors::SharedError;

/// Global component identity - set once at startup
static COMPONENT_ID: OnceLock<ComponentId> = OnceLock::new();

/// Identity attached to every log record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ComponentId {
    /// The supervisor itself
    Supervisor,
    /// The managed game server (records re-emitted from its output)
    Server,
}

impl ComponentId {
    /// Initialize the global component ID for the supervisor
    pub fn init_supervisor() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Supervisor)
    }

    /// Get the global component ID, defaulting to the supervisor
    pub fn current() -> &'static ComponentId {
        COMPONENT_ID.get_or_init(|| ComponentId::Supervisor)
    }
}

impl fmt::Display for ComponentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ComponentId::Supervisor => write!(f, "supervisor"),
            ComponentId::Server => write!(f, "flserver"),
        }
    }
}

/// Supervisor state-machine phase
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Idle,
    Starting,
    AwaitingReady,
    Ready,
    RestartPending,
    Terminated,
}

impl Phase {
    /// Whether a child process is expected to be running in this phase
    pub fn is_running(&self) -> bool {
        matches!(self, Phase::AwaitingReady | Phase::Ready)
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Phase::Idle => "idle",
            Phase::Starting => "starting",
            Phase::AwaitingReady => "awaiting_ready",
            Phase::Ready => "ready",
            Phase::RestartPending => "restart_pending",
            Phase::Terminated => "terminated",
        };
        write!(f, "{name}")
    }
}

impl FromStr for Phase {
    type Err = SharedError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(Phase::Idle),
            "starting" => Ok(Phase::Starting),
            "awaiting_ready" => Ok(Phase::AwaitingReady),
            "ready" => Ok(Phase::Ready),
            "restart_pending" => Ok(Phase::RestartPending),
            "terminated" => Ok(Phase::Terminated),
            _ => Err(SharedError::UnknownPhase { input: s.to_string() }),
        }
    }
}

/// Snapshot of the supervisor published after every state change
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    pub phase: Phase,
    pub alive: bool,
    pub ready_to_start: bool,
    pub pid: Option<u32>,
    /// Number of successful process starts since the supervisor came up
    pub starts: u64,
    pub consecutive_health_failures: u32,
}

impl Default for SupervisorStatus {
    fn default() -> Self {
        Self {
            phase: Phase::Idle,
            alive: false,
            ready_to_start: false,
            pid: None,
            starts: 0,
            consecutive_health_failures: 0,
        }
    }
}

/// Memory usage observation of the managed server
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiagnosticSample {
    pub timestamp_utc: DateTime<Utc>,
    pub memory_bytes: u64,
}

impl DiagnosticSample {
    pub fn now(memory_bytes: u64) -> Self {
        Self {
            timestamp_utc: Utc::now(),
            memory_bytes,
        }
    }
}

/// A line of console output captured from the managed server
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsoleLine {
    pub text: String,
    pub received_at_utc: DateTime<Utc>,
}

impl ConsoleLine {
    pub fn now(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            received_at_utc: Utc::now(),
        }
    }
}
