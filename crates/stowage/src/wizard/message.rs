use std::path::PathBuf;

use stowage_backend::{BackendConfig, BackendError, BackendKind};
use stowage_core::{HookOutcome, InstallProgress, InstallReport};
use stowage_tailscale::Discovery;

use crate::error::AppError;

#[derive(Debug, Clone)]
pub enum WizardMessage {
    Next,
    Back,
    Cancel,
    SelectBackend(BackendKind),

    InstallMissing,
    SkipMissing,
    InstallProgress {
        seq: u64,
        progress: InstallProgress,
    },
    ToolInstalled {
        seq: u64,
        tool: String,
        report: InstallReport,
    },
    InstallFinished {
        seq: u64,
    },
    /// Check again after the operator finished signing in elsewhere.
    Reload,
    Reloaded {
        seq: u64,
        result: Result<Discovery, AppError>,
    },

    DiscoverPeers,
    PeersDiscovered {
        seq: u64,
        result: Result<Discovery, AppError>,
    },
    Connect,
    Connected {
        seq: u64,
        outcome: HookOutcome,
    },
    SelectPeer(String),
    Collect,
    Collected {
        seq: u64,
        result: Result<Option<BackendConfig>, BackendError>,
    },
    TestConnection,
    ConnectionTested {
        seq: u64,
        passed: bool,
    },

    Save,
    Saved(Result<PathBuf, AppError>),
}
