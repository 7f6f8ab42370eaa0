use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    /// User input or an environment prerequisite is not satisfied; the
    /// operator can correct it and retry.
    #[error("{reason}")]
    Configuration { reason: String },

    #[error("Required tool `{tool}` is not installed")]
    Dependency { tool: String },

    #[error("Setup was cancelled")]
    Cancelled,

    #[error("Command failed: {stderr}")]
    CommandFailed { stderr: String },

    #[error("IO error ({kind}): {message}")]
    IoError {
        kind: std::io::ErrorKind,
        message: String,
    },

    #[error("Timeout waiting for {operation}")]
    Timeout { operation: &'static str },
}

impl BackendError {
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration {
            reason: reason.into(),
        }
    }

    pub fn dependency(tool: impl Into<String>) -> Self {
        Self::Dependency { tool: tool.into() }
    }

    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Dependency { .. })
    }
}

impl From<std::io::Error> for BackendError {
    fn from(err: std::io::Error) -> Self {
        BackendError::IoError {
            kind: err.kind(),
            message: err.to_string(),
        }
    }
}
