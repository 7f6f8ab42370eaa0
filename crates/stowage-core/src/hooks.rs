use async_trait::async_trait;

use crate::installer::ProgressSink;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    Ready,
    /// The operator must finish authentication out of band, then reload.
    PendingAuth { url: String },
    Failed { message: String },
}

/// Runs after a tool was freshly installed, for tools that need a bootstrap
/// step before they are usable.
#[async_trait]
pub trait PostInstallHook: Send + Sync {
    async fn run(&self, progress: Option<&ProgressSink>) -> HookOutcome;
}
