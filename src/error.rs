//! Error types for Codebox

use thiserror::Error;

/// Result type alias using Codebox's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for Codebox
#[derive(Error, Debug)]
pub enum Error {
    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Unknown or unregistered language identifier
    #[error("Unsupported language: {0}")]
    UnsupportedLanguage(String),

    /// The isolation engine (Docker daemon) cannot be reached
    #[error("Isolation runtime unavailable: {0}")]
    RuntimeUnavailable(String),

    /// The referenced container image cannot be fetched
    #[error("Image unavailable: {0}")]
    ImageUnavailable(String),

    /// Dependency installation inside a sandbox failed
    #[error("Dependency install failed: {0}")]
    DependencyInstall(String),

    /// No non-deleted sandbox with the given id
    #[error("Sandbox not found: {0}")]
    SandboxNotFound(String),

    /// A non-deleted sandbox already uses the requested name
    #[error("Sandbox name conflict: {0}")]
    SandboxNameConflict(String),

    /// Docker/container error
    #[error("Container error: {0}")]
    Container(String),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl Error {
    /// Stable kind tag used in structured error payloads
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "ConfigError",
            Error::UnsupportedLanguage(_) => "UnsupportedLanguage",
            Error::RuntimeUnavailable(_) => "RuntimeUnavailable",
            Error::ImageUnavailable(_) => "ImageUnavailable",
            Error::DependencyInstall(_) => "DependencyInstallFailure",
            Error::SandboxNotFound(_) => "SandboxNotFound",
            Error::SandboxNameConflict(_) => "SandboxNameConflict",
            Error::Container(_) => "ContainerError",
            Error::Json(_) => "JsonError",
            Error::Io(_) => "IoError",
            Error::InvalidInput(_) => "InvalidInput",
        }
    }

    /// Check if error is a client error (caller's fault)
    pub fn is_client_error(&self) -> bool {
        matches!(
            self,
            Error::UnsupportedLanguage(_)
                | Error::SandboxNotFound(_)
                | Error::SandboxNameConflict(_)
                | Error::InvalidInput(_)
        )
    }
}

impl From<config::ConfigError> for Error {
    fn from(err: config::ConfigError) -> Self {
        Error::Config(err.to_string())
    }
}

impl From<bollard::errors::Error> for Error {
    fn from(err: bollard::errors::Error) -> Self {
        Error::Container(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            Error::UnsupportedLanguage("cobol".into()).kind(),
            "UnsupportedLanguage"
        );
        assert_eq!(Error::SandboxNotFound("s1".into()).kind(), "SandboxNotFound");
        assert_eq!(
            Error::DependencyInstall("pip".into()).kind(),
            "DependencyInstallFailure"
        );
    }

    #[test]
    fn test_client_error_classification() {
        assert!(Error::SandboxNameConflict("s1".into()).is_client_error());
        assert!(!Error::RuntimeUnavailable("no docker".into()).is_client_error());
    }
}
