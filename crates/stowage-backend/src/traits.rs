use async_trait::async_trait;
use std::collections::BTreeSet;

use crate::error::BackendError;
use crate::fields::{FieldRequest, Prompter};
use crate::types::{BackendConfig, BackendDescriptor, BackendKind, TailscalePeer, ValidationReport};

/// What the wizard already knows when a backend starts its interactive setup.
#[derive(Debug, Clone, Default)]
pub struct SetupContext {
    /// Values entered on an earlier visit, offered again as defaults.
    pub previous: Option<BackendConfig>,
    pub selected_peer: Option<TailscalePeer>,
}

impl SetupContext {
    #[must_use]
    pub fn previous_path(&self) -> Option<&str> {
        self.previous
            .as_ref()
            .map(|config| config.repository_path.as_str())
            .filter(|path| !path.is_empty())
    }

    #[must_use]
    pub fn previous_credential(&self, key: &str) -> Option<&str> {
        self.previous.as_ref().and_then(|config| config.credential(key))
    }
}

#[async_trait]
pub trait BackendPlugin: Send + Sync {
    fn descriptor(&self) -> &'static BackendDescriptor;

    fn kind(&self) -> BackendKind {
        self.descriptor().kind
    }

    /// External tools this destination needs. Pure.
    fn check_dependencies(&self) -> BTreeSet<String> {
        self.descriptor()
            .required_tools
            .iter()
            .map(ToString::to_string)
            .collect()
    }

    /// The fields the interactive setup will ask for, with defaults taken from
    /// the context. Pure.
    fn field_requests(&self, ctx: &SetupContext) -> Vec<FieldRequest>;

    /// Collect destination parameters. `Ok(None)` means the operator cancelled.
    async fn setup_interactive(
        &self,
        prompter: &dyn Prompter,
        ctx: &SetupContext,
    ) -> Result<Option<BackendConfig>, BackendError>;

    /// Structural and local existence checks. Never mutates state and never
    /// touches the network.
    fn validate_config(&self, config: &BackendConfig) -> ValidationReport;

    /// One real round trip against the destination. Failures are logged and
    /// reported as `false`.
    async fn test_connection(&self, config: &BackendConfig) -> bool;

    /// Backup engine arguments for a validated config. Must not perform I/O.
    fn build_invocation_args(&self, config: &BackendConfig) -> Vec<String>;

    fn build_engine_args(&self, config: &BackendConfig, password: &str) -> Vec<String> {
        let mut args = self.build_invocation_args(config);
        args.push("--password".to_string());
        args.push(password.to_string());
        args
    }
}
