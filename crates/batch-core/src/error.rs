//! Error types for the batch engine
//!
//! Everything in here is a configuration error: it is raised before any job
//! is scheduled. Failures of individual jobs are never errors, they are
//! recorded as [`crate::OutcomeKind`] values in the batch report.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Invalid worker count: {0} (must be at least 1)")]
    InvalidWorkerCount(usize),

    #[error("Root directory not found: {}", .0.display())]
    RootNotFound(PathBuf),

    #[error("Invalid discovery pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    #[error("Unit {} is missing required input '{input}'", .unit.display())]
    MissingInput { unit: PathBuf, input: String },

    #[error("Invalid job descriptor: {0}")]
    InvalidDescriptor(String),

    #[error("Required tool unavailable: {0}")]
    ToolUnavailable(String),

    #[error("Stage configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for batch engine operations
pub type Result<T> = std::result::Result<T, BatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_input_message_names_unit_and_file() {
        let err = BatchError::MissingInput {
            unit: PathBuf::from("/data/demos/demo_01"),
            input: "imu_data.json".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/demos/demo_01"));
        assert!(msg.contains("imu_data.json"));
    }

    #[test]
    fn test_io_error_converts() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: BatchError = io.into();
        assert!(matches!(err, BatchError::Io(_)));
    }
}
