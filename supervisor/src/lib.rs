//! Supervisor library for keeping a game server process running
//!
//! Launches the server executable, follows its output for a readiness marker,
//! confirms health with an out-of-band HTTP probe, restarts it when it dies or
//! stops answering, and keeps bounded console and memory history for
//! operator views.

pub mod config;
pub mod console;
pub mod core;
pub mod error;
pub mod services;
pub mod supervisor;
pub mod traits;

// Re-export commonly used types
pub use config::{LaunchSpec, SupervisorConfig};
pub use self::core::{DiagnosticsSink, ReadinessDetector, Severity, StructuredLogRecord, SupervisorState};
pub use error::{ProbeError, SupervisorError, SupervisorResult};
pub use supervisor::{Supervisor, SupervisorCommand, SupervisorHandle};
pub use traits::{HealthCheck, OutputLine, OutputStream, ProcessController, ProcessInfo, ProcessTable};
