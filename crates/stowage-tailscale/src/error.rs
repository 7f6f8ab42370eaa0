use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    #[error("tailscale is not installed")]
    NotInstalled,

    #[error("tailscale status failed: {stderr}")]
    CommandFailed { stderr: String },

    #[error("Timeout waiting for tailscale status")]
    Timeout,

    #[error("Could not parse tailscale status: {0}")]
    ParseError(String),

    #[error("IO error: {0}")]
    IoError(String),
}

impl From<serde_json::Error> for DiscoveryError {
    fn from(err: serde_json::Error) -> Self {
        DiscoveryError::ParseError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::DiscoveryError;

    #[test]
    fn json_error_conversion_maps_to_parse_variant() {
        let err = serde_json::from_str::<serde_json::Value>("{").expect_err("invalid json");
        assert!(matches!(DiscoveryError::from(err), DiscoveryError::ParseError(_)));
    }
}
