//! Error types for retrieve-core.

use crate::persistence::PersistenceError;
use std::fmt;

/// Errors that can occur during build or query operations.
#[derive(Debug)]
pub enum RetrieveError {
    /// Malformed corpus row, non-UTF-8 text, or unreadable image bytes.
    ///
    /// During a build the offending record is skipped and this is only
    /// surfaced as a diagnostic; at query time it aborts the query.
    InputError(String),

    /// A required artifact (dictionary, postings, norms, codebook, …) is
    /// missing for the requested corpus.
    MissingArtifact { corpus: String, artifact: String },

    /// The on-disk index failed an internal consistency check: an offset
    /// points past EOF, a postings record fails to parse, or a recorded
    /// `df` doesn't match the actual posting count.
    CorruptIndex(String),

    /// Disk or filesystem failure.
    Io(std::io::Error),

    /// Invalid configuration: unknown stemmer language, `K <= 0`, `k <= 0`.
    ConfigError(String),
}

impl fmt::Display for RetrieveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetrieveError::InputError(msg) => write!(f, "input error: {}", msg),
            RetrieveError::MissingArtifact { corpus, artifact } => {
                write!(f, "missing artifact '{}' for corpus '{}'", artifact, corpus)
            }
            RetrieveError::CorruptIndex(msg) => write!(f, "corrupt index: {}", msg),
            RetrieveError::Io(e) => write!(f, "I/O error: {}", e),
            RetrieveError::ConfigError(msg) => write!(f, "invalid configuration: {}", msg),
        }
    }
}

impl std::error::Error for RetrieveError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RetrieveError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RetrieveError {
    fn from(e: std::io::Error) -> Self {
        RetrieveError::Io(e)
    }
}

impl From<PersistenceError> for RetrieveError {
    fn from(e: PersistenceError) -> Self {
        match e {
            PersistenceError::Io(io) => RetrieveError::Io(io),
            PersistenceError::NotFound(what) => RetrieveError::MissingArtifact {
                corpus: String::new(),
                artifact: what,
            },
            PersistenceError::InvalidConfig(msg) => RetrieveError::ConfigError(msg),
            other => RetrieveError::CorruptIndex(other.to_string()),
        }
    }
}

pub type RetrieveResult<T> = Result<T, RetrieveError>;
