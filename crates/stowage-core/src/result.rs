use std::fmt;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstallDetails {
    pub message: Option<String>,
    pub output: Option<String>,
}

impl InstallDetails {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            output: None,
        }
    }

    #[must_use]
    pub fn with_output(mut self, output: impl Into<String>) -> Self {
        let output = output.into();
        if !output.trim().is_empty() {
            self.output = Some(output);
        }
        self
    }
}

/// Outcome of installing one dependency. Exactly one tag is ever active.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallResult {
    Success(InstallDetails),
    AlreadyInstalled(InstallDetails),
    UnsupportedOs(InstallDetails),
    Failed(InstallDetails),
    Timeout(InstallDetails),
    PermissionError(InstallDetails),
}

impl InstallResult {
    #[must_use]
    pub fn details(&self) -> &InstallDetails {
        match self {
            Self::Success(details)
            | Self::AlreadyInstalled(details)
            | Self::UnsupportedOs(details)
            | Self::Failed(details)
            | Self::Timeout(details)
            | Self::PermissionError(details) => details,
        }
    }

    #[must_use]
    pub fn message(&self) -> Option<&str> {
        self.details().message.as_deref()
    }

    #[must_use]
    pub fn output(&self) -> Option<&str> {
        self.details().output.as_deref()
    }

    /// The tool is usable after this outcome.
    #[must_use]
    pub fn is_available(&self) -> bool {
        matches!(self, Self::Success(_) | Self::AlreadyInstalled(_))
    }

    #[must_use]
    pub const fn tag(&self) -> &'static str {
        match self {
            Self::Success(_) => "success",
            Self::AlreadyInstalled(_) => "already-installed",
            Self::UnsupportedOs(_) => "unsupported-os",
            Self::Failed(_) => "failed",
            Self::Timeout(_) => "timeout",
            Self::PermissionError(_) => "permission-error",
        }
    }
}

impl fmt::Display for InstallResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.message() {
            Some(message) => write!(f, "{}: {message}", self.tag()),
            None => f.write_str(self.tag()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{InstallDetails, InstallResult};

    #[test]
    fn only_success_and_already_installed_are_available() {
        let details = InstallDetails::default();
        assert!(InstallResult::Success(details.clone()).is_available());
        assert!(InstallResult::AlreadyInstalled(details.clone()).is_available());
        assert!(!InstallResult::UnsupportedOs(details.clone()).is_available());
        assert!(!InstallResult::Failed(details.clone()).is_available());
        assert!(!InstallResult::Timeout(details.clone()).is_available());
        assert!(!InstallResult::PermissionError(details).is_available());
    }

    #[test]
    fn blank_output_is_not_recorded() {
        let details = InstallDetails::message("apt-get failed").with_output("  \n");
        assert!(details.output.is_none());

        let details = InstallDetails::message("apt-get failed").with_output("E: lock held");
        assert_eq!(details.output.as_deref(), Some("E: lock held"));
    }

    #[test]
    fn display_includes_tag_and_message() {
        let result = InstallResult::Timeout(InstallDetails::message("apt-get update timed out"));
        assert_eq!(result.to_string(), "timeout: apt-get update timed out");
        assert_eq!(
            InstallResult::Success(InstallDetails::default()).to_string(),
            "success"
        );
    }
}
