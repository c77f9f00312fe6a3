//! Trait definitions with mockall annotations for testing
//!
//! The supervisor loop only talks to the operating system and the network
//! through these traits, so the state machine can be driven in tests without
//! real processes or a live companion agent.

use chrono::{DateTime, Utc};
use std::time::Duration;

use crate::config::LaunchSpec;
use crate::error::{ProbeError, SupervisorResult};

/// Which pipe a line of child output arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A raw line read from the child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputLine {
    pub text: String,
    pub stream: OutputStream,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stream: OutputStream::Stdout,
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            stream: OutputStream::Stderr,
        }
    }
}

/// Identity of a freshly started child process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub started_at: DateTime<Utc>,
}

/// Ownership and mechanics of the single managed OS process
///
/// Implementations own the process handle exclusively; callers only ever see
/// [`ProcessInfo`] and the drained output.
#[mockall::automock]
#[async_trait::async_trait]
pub trait ProcessController: Send + Sync {
    /// Kill stale same-named processes, then spawn the server with piped stdio
    async fn start(&self, launch: &LaunchSpec) -> SupervisorResult<ProcessInfo>;

    /// Stop reading output, force-kill, wait (bounded) and dispose the handle.
    /// A no-op when nothing is running.
    async fn terminate(&self);

    /// True while a handle exists and the process has not exited
    async fn is_alive(&self) -> bool;

    /// Write a console line to the server's stdin; ignored when not running
    async fn send_input(&self, line: &str);

    /// Take every output line queued since the last call
    async fn drain_output(&self) -> Vec<OutputLine>;

    /// Resident memory of the running server in bytes, if known
    async fn memory_usage(&self) -> SupervisorResult<Option<u64>>;
}

/// Out-of-band liveness check against the companion agent
#[mockall::automock]
#[async_trait::async_trait]
pub trait HealthCheck: Send + Sync {
    /// One liveness request; no internal retries
    async fn ping(&self, timeout: Duration) -> Result<(), ProbeError>;
}

/// View of the host's process table
#[mockall::automock]
pub trait ProcessTable: Send + Sync {
    /// PIDs of running processes with this exact name, excluding ourselves
    fn find_by_name(&self, name: &str) -> Vec<u32>;

    /// Force-kill a process. Returns false if the signal could not be sent.
    fn kill(&self, pid: u32) -> bool;

    /// Resident memory of a process in bytes
    fn memory_of(&self, pid: u32) -> Option<u64>;
}
