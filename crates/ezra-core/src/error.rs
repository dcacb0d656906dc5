use thiserror::Error;

/// Top-level error type for the Ezra workspace.
///
/// Subsystem crates define their own error types and implement
/// `From<SubsystemError> for EzraError` so that `?` works across crate
/// boundaries.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum EzraError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Storage error: {0}")]
    Storage(String),

    /// An external collaborator (notes-store, file source) could not be reached.
    #[error("Service unavailable: {0}")]
    Unavailable(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Export error: {0}")]
    Export(String),

    #[error("Voice error: {0}")]
    Voice(String),

    /// No async runtime was available to run background work.
    #[error("Runtime error: {0}")]
    Runtime(String),

    /// Broken internal invariant, such as a poisoned lock.
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Session closed")]
    SessionClosed,
}

impl From<toml::de::Error> for EzraError {
    fn from(err: toml::de::Error) -> Self {
        EzraError::Config(err.to_string())
    }
}

impl From<toml::ser::Error> for EzraError {
    fn from(err: toml::ser::Error) -> Self {
        EzraError::Config(err.to_string())
    }
}

impl From<serde_json::Error> for EzraError {
    fn from(err: serde_json::Error) -> Self {
        EzraError::Serialization(err.to_string())
    }
}

/// A specialized `Result` type for Ezra operations.
pub type Result<T> = std::result::Result<T, EzraError>;
