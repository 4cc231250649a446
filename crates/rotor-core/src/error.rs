//! Unified error types for the rotor ecosystem
//!
//! This module provides a common error type [`RotorError`] that can represent
//! errors from any part of the system. Domain-specific failures are mapped
//! onto a small set of variants so they can be handled uniformly at API
//! boundaries.

use thiserror::Error;

/// Unified error type for all rotor operations.
///
/// The variants mirror the failure classes of the planner: unreadable or
/// inconsistent input (`File`, `Data`, `Config`), solver-level failures
/// (`Solver`) and fatal invariant violations (`Logic`). `Logic` errors are
/// programming errors: a committed schedule that breaks time-space
/// continuity or drives a battery outside its bounds is never recoverable.
#[derive(Error, Debug)]
pub enum RotorError {
    /// I/O errors (file access, etc.)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Missing input file
    #[error("File error: {0}")]
    File(String),

    /// Unparseable or inconsistent input data (bad field, unknown id)
    #[error("Data error: {0}")]
    Data(String),

    /// Configuration errors (missing mandatory key, bad datatype)
    #[error("Configuration error: {0}")]
    Config(String),

    /// LP/MIP solver errors
    #[error("Solver error: {0}")]
    Solver(String),

    /// Fatal invariant violation, a programming error; aborts the run
    #[error("Logic error: {0}")]
    Logic(String),
}

/// Convenience type alias for Results using RotorError.
pub type RotorResult<T> = Result<T, RotorError>;

impl From<anyhow::Error> for RotorError {
    fn from(err: anyhow::Error) -> Self {
        RotorError::Data(err.to_string())
    }
}

impl From<String> for RotorError {
    fn from(s: String) -> Self {
        RotorError::Data(s)
    }
}

impl From<&str> for RotorError {
    fn from(s: &str) -> Self {
        RotorError::Data(s.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = RotorError::Logic("soc out of bounds".into());
        assert!(err.to_string().contains("Logic error"));
        assert!(err.to_string().contains("soc out of bounds"));
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: RotorError = io_err.into();
        assert!(matches!(err, RotorError::Io(_)));
    }

    #[test]
    fn test_question_mark_operator() {
        fn inner() -> RotorResult<()> {
            Err(RotorError::Data("test".into()))
        }

        fn outer() -> RotorResult<()> {
            inner()?;
            Ok(())
        }

        assert!(outer().is_err());
    }
}
