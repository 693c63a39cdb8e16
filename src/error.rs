//! Error types for the AIS state manager

use thiserror::Error;

/// Result type alias using the state manager's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// State manager error types
#[derive(Error, Debug)]
pub enum Error {
    /// Kubernetes API error
    #[error("Kubernetes API error: {0}")]
    Kube(#[from] kube::Error),

    /// A run cannot start or continue in the current cluster state
    #[error("Precondition failed: {0}")]
    Precondition(String),

    /// A bounded wait elapsed before the condition held
    #[error("Timed out: {0}")]
    Timeout(String),

    /// Remote command or file copy failure
    #[error("Transport error: {0}")]
    Transport(String),

    /// Local archive handling error
    #[error("Archive error: {0}")]
    Archive(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Coarse classification used to pick the process exit code
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Precondition,
    Timeout,
    Transport,
    Config,
}

impl ErrorKind {
    /// Process exit code reported for this kind of failure
    pub fn exit_code(self) -> i32 {
        match self {
            ErrorKind::Precondition => 2,
            ErrorKind::Timeout => 3,
            ErrorKind::Transport => 4,
            ErrorKind::Config => 64,
        }
    }
}

impl Error {
    /// Create a precondition error
    pub fn precondition(msg: impl Into<String>) -> Self {
        Error::Precondition(msg.into())
    }

    /// Create a timeout error
    pub fn timeout(msg: impl Into<String>) -> Self {
        Error::Timeout(msg.into())
    }

    /// Create a transport error
    pub fn transport(msg: impl Into<String>) -> Self {
        Error::Transport(msg.into())
    }

    /// Create an archive error
    pub fn archive(msg: impl Into<String>) -> Self {
        Error::Archive(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Error::Config(msg.into())
    }

    /// Create a validation error
    pub fn validation(msg: impl Into<String>) -> Self {
        Error::Validation(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Precondition(_) => ErrorKind::Precondition,
            Error::Timeout(_) => ErrorKind::Timeout,
            Error::Kube(_)
            | Error::Transport(_)
            | Error::Archive(_)
            | Error::Serialization(_)
            | Error::Io(_) => ErrorKind::Transport,
            Error::Config(_) | Error::Validation(_) => ErrorKind::Config,
        }
    }

    pub fn exit_code(&self) -> i32 {
        self.kind().exit_code()
    }
}
