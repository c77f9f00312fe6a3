//! Core supervisor logic
//!
//! This module contains the pure parts of the supervisor with no OS or network
//! dependencies: the state machine, readiness detection and the diagnostics
//! buffers.

pub mod diagnostics;
pub mod readiness;
pub mod state;

pub use diagnostics::{DiagnosticsSink, DEFAULT_PAGE_SIZE};
pub use readiness::{ReadinessDetector, Severity, StructuredLogRecord};
pub use state::SupervisorState;
