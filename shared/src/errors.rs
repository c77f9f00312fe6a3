//! Shared error types for the supervisor workspace

use thiserror::Error;

#[derive(Error, Debug)]
pub enum SharedError {
    #[error("Invalid configuration: {field} = {value}")]
    InvalidConfig { field: String, value: String },

    #[error("Unknown phase: {input}")]
    UnknownPhase { input: String },
}
