#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorDetail {
    Message(String),
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
    Backend(stowage_backend::BackendError),
}

impl std::fmt::Display for AppErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::Io { kind, message } => write!(f, "{kind}: {message}"),
            Self::Backend(error) => write!(f, "{error}"),
        }
    }
}

impl From<String> for AppErrorDetail {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppErrorDetail {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<std::io::Error> for AppErrorDetail {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<stowage_backend::BackendError> for AppErrorDetail {
    fn from(value: stowage_backend::BackendError) -> Self {
        Self::Backend(value)
    }
}

impl From<stowage_tailscale::DiscoveryError> for AppErrorDetail {
    fn from(value: stowage_tailscale::DiscoveryError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<stowage_platform::AppPathsError> for AppErrorDetail {
    fn from(value: stowage_platform::AppPathsError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<serde_json::Error> for AppErrorDetail {
    fn from(value: serde_json::Error) -> Self {
        Self::Message(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Message(String),
    OperationFailed {
        operation: &'static str,
        details: AppErrorDetail,
    },
    OperationCancelled {
        operation: &'static str,
    },
    UnknownBackend {
        id: String,
    },
    ConfigurationIncomplete {
        errors: Vec<String>,
    },
    DocumentMissing {
        path: String,
    },
    DocumentSaveFailed {
        action: &'static str,
        details: AppErrorDetail,
    },
    DocumentLoadFailed {
        details: AppErrorDetail,
    },
}

impl AppError {
    pub fn message(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }

    pub fn operation_failed(operation: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::OperationFailed {
            operation,
            details: details.into(),
        }
    }

    pub fn operation_cancelled(operation: &'static str) -> Self {
        Self::OperationCancelled { operation }
    }

    pub fn unknown_backend(id: impl Into<String>) -> Self {
        Self::UnknownBackend { id: id.into() }
    }

    pub fn configuration_incomplete(errors: Vec<String>) -> Self {
        Self::ConfigurationIncomplete { errors }
    }

    pub fn document_missing(path: &std::path::Path) -> Self {
        Self::DocumentMissing {
            path: path.display().to_string(),
        }
    }

    pub fn document_save_failed(action: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::DocumentSaveFailed {
            action,
            details: details.into(),
        }
    }

    pub fn document_load_failed(details: impl Into<AppErrorDetail>) -> Self {
        Self::DocumentLoadFailed {
            details: details.into(),
        }
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::OperationFailed { operation, details } => {
                write!(f, "{operation} failed: {details}")
            }
            Self::OperationCancelled { operation } => write!(f, "{operation} cancelled"),
            Self::UnknownBackend { id } => write!(f, "Unknown backend type: {id}"),
            Self::ConfigurationIncomplete { errors } => {
                write!(f, "Configuration is incomplete: {}", errors.join("; "))
            }
            Self::DocumentMissing { path } => {
                write!(f, "No configuration found at {path}. Run `stowage setup` first.")
            }
            Self::DocumentSaveFailed { action, details } => {
                write!(f, "Saving configuration failed ({action}): {details}")
            }
            Self::DocumentLoadFailed { details } => {
                write!(f, "Failed to load configuration: {details}")
            }
        }
    }
}

impl std::error::Error for AppError {}
