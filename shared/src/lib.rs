//! Shared types for the game-server supervisor
//!
//! Contains the types that cross the boundary between the supervisor loop
//! and the in-process collaborators (HTTP controllers, operator console)
//! that report on it, plus the logging setup used by every binary.

pub mod errors;
pub mod logging;
pub mod types;

pub use errors::*;
pub use types::*;
