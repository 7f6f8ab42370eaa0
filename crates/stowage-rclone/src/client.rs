use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};
use serde::Deserialize;

use stowage_backend::BackendError;
use stowage_platform::{CommandOutcome, CommandRunner, CommandSpec, SystemRunner};

const QUERY_TIMEOUT: Duration = Duration::from_secs(30);

/// Hands the terminal to rclone's own remote configuration dialog.
#[async_trait]
pub trait ConfigWizard: Send + Sync {
    async fn run(&self) -> std::io::Result<bool>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct InteractiveConfigWizard;

#[async_trait]
impl ConfigWizard for InteractiveConfigWizard {
    async fn run(&self) -> std::io::Result<bool> {
        stowage_platform::run_interactive("rclone", &["config"]).await
    }
}

#[derive(Deserialize)]
struct DumpedRemote {
    #[serde(rename = "type")]
    kind: Option<String>,
}

#[derive(Clone)]
pub struct RcloneClient {
    runner: Arc<dyn CommandRunner>,
    wizard: Arc<dyn ConfigWizard>,
}

impl Default for RcloneClient {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner), Arc::new(InteractiveConfigWizard))
    }
}

impl RcloneClient {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>, wizard: Arc<dyn ConfigWizard>) -> Self {
        Self { runner, wizard }
    }

    async fn execute(&self, args: &[&str]) -> Result<String, BackendError> {
        let spec = CommandSpec::new("rclone", QUERY_TIMEOUT).args(args.iter().copied());
        match self.runner.run(&spec).await {
            CommandOutcome::Completed(output) if output.success() => Ok(output.stdout),
            CommandOutcome::Completed(output) => Err(BackendError::CommandFailed {
                stderr: output.combined(),
            }),
            CommandOutcome::TimedOut { .. } => Err(BackendError::Timeout { operation: "rclone" }),
            CommandOutcome::SpawnFailed { kind, .. } if kind == std::io::ErrorKind::NotFound => {
                Err(BackendError::dependency("rclone"))
            }
            CommandOutcome::SpawnFailed { kind, message } => {
                Err(BackendError::IoError { kind, message })
            }
        }
    }

    /// Configured remote names without the trailing colon.
    ///
    /// # Errors
    /// Returns an error if `rclone listremotes` fails.
    pub async fn list_remotes(&self) -> Result<Vec<String>, BackendError> {
        let output = self.execute(&["listremotes"]).await?;
        Ok(output
            .lines()
            .map(|line| line.trim().trim_end_matches(':'))
            .filter(|name| !name.is_empty())
            .map(ToString::to_string)
            .collect())
    }

    /// Location of the rclone config file. A path rclone merely would use is
    /// reported as missing.
    ///
    /// # Errors
    /// Returns a configuration error when no config file exists.
    pub async fn config_file(&self) -> Result<PathBuf, BackendError> {
        let output = self.execute(&["config", "file"]).await?;
        let path = output
            .lines()
            .map(str::trim)
            .rfind(|line| !line.is_empty())
            .map(PathBuf::from)
            .ok_or_else(|| BackendError::configuration("rclone did not report a config file"))?;

        if tokio::fs::metadata(&path).await.is_ok_and(|meta| meta.is_file()) {
            Ok(path)
        } else {
            Err(BackendError::configuration(format!(
                "rclone config file {} does not exist",
                path.display()
            )))
        }
    }

    /// Remote name to provider type, for display. Best effort.
    pub async fn remote_types(&self) -> BTreeMap<String, String> {
        let output = match self.execute(&["config", "dump"]).await {
            Ok(output) => output,
            Err(error) => {
                debug!("rclone config dump failed: {error}");
                return BTreeMap::new();
            }
        };

        match serde_json::from_str::<BTreeMap<String, DumpedRemote>>(&output) {
            Ok(remotes) => remotes
                .into_iter()
                .filter_map(|(name, remote)| remote.kind.map(|kind| (name, kind)))
                .collect(),
            Err(error) => {
                warn!("Could not parse rclone config dump: {error}");
                BTreeMap::new()
            }
        }
    }

    /// List top-level directories of `remote`, proving the credentials work.
    ///
    /// # Errors
    /// Returns an error if the listing fails or exceeds the query timeout.
    pub async fn list_dirs(&self, config_file: &str, remote: &str) -> Result<(), BackendError> {
        let target = format!("{remote}:");
        self.execute(&["--config", config_file, "lsd", &target])
            .await
            .map(drop)
    }

    /// Launch `rclone config` so the operator can create a remote, then list
    /// remotes again.
    ///
    /// # Errors
    /// Returns an error if the dialog cannot be launched or remotes cannot be
    /// listed afterwards.
    pub async fn configure_interactively(&self) -> Result<Vec<String>, BackendError> {
        let finished = self.wizard.run().await?;
        if !finished {
            debug!("rclone config exited with a non-zero status");
        }
        self.list_remotes().await
    }
}
