//! Error types for the custody ledger

use thiserror::Error;

/// Result type for custody operations
pub type Result<T> = std::result::Result<T, Error>;

/// Custody ledger errors
#[derive(Error, Debug)]
pub enum Error {
    /// Artifact or journal could not be read/written to completion
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Evidence id already present in the record store
    #[error("Duplicate evidence id: {0}")]
    DuplicateId(String),

    /// Session was never opened
    #[error("Session is not open")]
    NotOpen,

    /// Session opened twice
    #[error("Session is already open")]
    AlreadyOpen,

    /// Session already sealed
    #[error("Session is already closed")]
    AlreadyClosed,

    /// Registration of one artifact failed; nothing was committed
    #[error("Registration of '{label}' failed: {source}")]
    Registration {
        /// Label of the artifact being registered
        label: String,
        /// Underlying cause
        #[source]
        source: Box<Error>,
    },

    /// Ledger unreadable or corrupted beyond a truncated tail
    #[error("Verification error: {0}")]
    Verification(String),

    /// Canonical encoding error
    #[error("Serialization error: {0}")]
    Serialization(#[from] bincode::Error),

    /// Journal encoding error
    #[error("Journal encoding error: {0}")]
    Json(#[from] serde_json::Error),

    /// Event type does not match the payload variant
    #[error("Payload mismatch: event type {event_type} cannot carry a {payload} payload")]
    PayloadMismatch {
        /// Declared event type
        event_type: String,
        /// Actual payload variant
        payload: String,
    },

    /// Unknown digest algorithm name
    #[error("Unsupported digest algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Seal signing or key handling failed
    #[error("Signature error: {0}")]
    Signature(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Background task failure (collector panicked, runtime shut down)
    #[error("Concurrency error: {0}")]
    Concurrency(String),
}

impl Error {
    /// Wrap a cause as a registration failure for `label`
    pub fn registration(label: impl Into<String>, source: Error) -> Self {
        Error::Registration {
            label: label.into(),
            source: Box::new(source),
        }
    }

    /// Underlying cause of a registration failure, or the error itself
    pub fn root_cause(&self) -> &Error {
        match self {
            Error::Registration { source, .. } => source.root_cause(),
            other => other,
        }
    }
}

impl From<prometheus::Error> for Error {
    fn from(err: prometheus::Error) -> Self {
        Error::Config(format!("metrics registry: {}", err))
    }
}
