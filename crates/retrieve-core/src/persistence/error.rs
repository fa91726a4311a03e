//! Error types for persistence operations.

use std::fmt;

/// Errors that can occur while reading or writing index artifacts on disk.
#[derive(Debug)]
pub enum PersistenceError {
    /// I/O error (file operations, disk I/O)
    Io(std::io::Error),

    /// The artifact's shape didn't match what the reader expected
    /// (wrong number of fields, unparseable line, bad delimiter).
    Format {
        message: String,
        expected: Option<String>,
        actual: Option<String>,
    },

    /// JSON encoding failed while writing an artifact.
    Serialization(String),

    /// JSON decoding failed while reading an artifact.
    Deserialization(String),

    /// Operation not allowed in the current state (e.g. writing after finalize).
    InvalidState(String),

    /// A required artifact file or directory does not exist.
    NotFound(String),

    /// Invalid configuration (bad path, bad flush threshold, etc).
    InvalidConfig(String),
}

impl fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {}", e),
            Self::Format {
                message,
                expected,
                actual,
            } => {
                write!(f, "format error: {}", message)?;
                if let Some(e) = expected {
                    write!(f, " (expected: {})", e)?;
                }
                if let Some(a) = actual {
                    write!(f, " (actual: {})", a)?;
                }
                Ok(())
            }
            Self::Serialization(msg) => write!(f, "serialization error: {}", msg),
            Self::Deserialization(msg) => write!(f, "deserialization error: {}", msg),
            Self::InvalidState(msg) => write!(f, "invalid state: {}", msg),
            Self::NotFound(resource) => write!(f, "resource not found: {}", resource),
            Self::InvalidConfig(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for PersistenceError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for PersistenceError {
    fn from(e: std::io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for PersistenceError {
    fn from(e: serde_json::Error) -> Self {
        if e.is_io() {
            Self::Io(e.into())
        } else {
            Self::Deserialization(e.to_string())
        }
    }
}

/// Result type for persistence operations.
pub type PersistenceResult<T> = Result<T, PersistenceError>;
