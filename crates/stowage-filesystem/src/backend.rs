use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, info, warn};

use stowage_backend::{
    BackendConfig, BackendDescriptor, BackendError, BackendKind, BackendPlugin, FieldRequest,
    Prompter, SetupContext, ValidationReport, ask_confirm, ask_text,
};

pub const DEFAULT_REPOSITORY_PATH: &str = "/backup/kopia-repository";
pub const MARKER_FILE: &str = ".stowage-connection-test";

const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(30);
const MARKER_CONTENT: &[u8] = b"stowage connection test\n";

static DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    kind: BackendKind::Filesystem,
    display_name: "Local filesystem",
    description: "A directory on this machine or a mounted disk",
    required_tools: &[],
};

#[derive(Debug, Clone)]
pub struct FilesystemBackend {
    default_path: String,
}

impl Default for FilesystemBackend {
    fn default() -> Self {
        Self::new(DEFAULT_REPOSITORY_PATH)
    }
}

impl FilesystemBackend {
    #[must_use]
    pub fn new(default_path: impl Into<String>) -> Self {
        Self {
            default_path: default_path.into(),
        }
    }

    fn create_request(path: &str) -> FieldRequest {
        FieldRequest::confirm(
            "create",
            format!("{path} does not exist. Create it?"),
            true,
        )
    }
}

#[async_trait]
impl BackendPlugin for FilesystemBackend {
    fn descriptor(&self) -> &'static BackendDescriptor {
        &DESCRIPTOR
    }

    fn field_requests(&self, ctx: &SetupContext) -> Vec<FieldRequest> {
        vec![
            FieldRequest::path("path", "Repository path")
                .with_default(Some(ctx.previous_path().unwrap_or(&self.default_path))),
        ]
    }

    async fn setup_interactive(
        &self,
        prompter: &dyn Prompter,
        ctx: &SetupContext,
    ) -> Result<Option<BackendConfig>, BackendError> {
        let requests = self.field_requests(ctx);
        let Some(path) = ask_text(prompter, &requests[0]).await? else {
            return Ok(None);
        };

        let dir = Path::new(&path);
        if !dir.is_absolute() {
            return Err(BackendError::configuration(format!(
                "Repository path must be absolute: {path}"
            )));
        }

        match tokio::fs::metadata(dir).await {
            Ok(meta) if !meta.is_dir() => {
                return Err(BackendError::configuration(format!(
                    "{path} exists but is not a directory"
                )));
            }
            Ok(_) => debug!("fs: using existing directory {path}"),
            Err(error) if error.kind() == std::io::ErrorKind::NotFound => {
                match ask_confirm(prompter, &Self::create_request(&path)).await? {
                    None => return Ok(None),
                    Some(false) => {
                        return Err(BackendError::configuration(format!(
                            "{path} does not exist and was not created"
                        )));
                    }
                    Some(true) => {
                        create_private_dir(dir).map_err(|error| {
                            BackendError::configuration(format!(
                                "Could not create {path}: {error}"
                            ))
                        })?;
                        info!("fs: created repository directory {path}");
                        prompter.note(&format!("Created {path}"));
                    }
                }
            }
            Err(error) => return Err(error.into()),
        }

        probe_writable(dir).map_err(|error| {
            BackendError::configuration(format!("No write permission for {path}: {error}"))
        })?;

        Ok(Some(
            BackendConfig::new(BackendKind::Filesystem).with_path(path),
        ))
    }

    fn validate_config(&self, config: &BackendConfig) -> ValidationReport {
        let mut report = ValidationReport::ok();
        report.require(
            config.kind == BackendKind::Filesystem,
            format!("Expected a filesystem config, got {}", config.kind),
        );

        let path = config.repository_path.trim();
        if path.is_empty() {
            report.push("Repository path is required");
            return report;
        }

        let dir = Path::new(path);
        if !dir.is_absolute() {
            report.push(format!("Repository path must be absolute: {path}"));
            return report;
        }

        match std::fs::metadata(dir) {
            Ok(meta) if !meta.is_dir() => report.push(format!("{path} is not a directory")),
            Ok(_) => {
                // Mode bits alone miss directories owned by another user.
                if let Err(error) = probe_writable(dir) {
                    report.push(format!("No write permission for {path}: {error}"));
                }
            }
            Err(_) => report.push(format!("{path} does not exist")),
        }
        report
    }

    async fn test_connection(&self, config: &BackendConfig) -> bool {
        let marker = Path::new(&config.repository_path).join(MARKER_FILE);

        let round_trip = async {
            tokio::fs::write(&marker, MARKER_CONTENT).await?;
            let read_back = tokio::fs::read(&marker).await;
            let removed = tokio::fs::remove_file(&marker).await;
            let matches = read_back? == MARKER_CONTENT;
            removed?;
            Ok::<bool, std::io::Error>(matches)
        };

        match tokio::time::timeout(CONNECTION_TEST_TIMEOUT, round_trip).await {
            Ok(Ok(true)) => {
                debug!("fs: connection test passed for {}", config.repository_path);
                true
            }
            Ok(Ok(false)) => {
                warn!("fs: marker file content mismatch in {}", config.repository_path);
                false
            }
            Ok(Err(error)) => {
                warn!("fs: connection test failed for {}: {error}", config.repository_path);
                false
            }
            Err(_) => {
                warn!("fs: connection test timed out for {}", config.repository_path);
                false
            }
        }
    }

    fn build_invocation_args(&self, config: &BackendConfig) -> Vec<String> {
        vec![
            "filesystem".to_string(),
            "--path".to_string(),
            config.repository_path.clone(),
        ]
    }
}

fn create_private_dir(dir: &Path) -> std::io::Result<()> {
    let mut builder = std::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::{DirBuilderExt, PermissionsExt};
        builder.mode(0o700);
        builder.create(dir)?;
        std::fs::set_permissions(dir, std::fs::Permissions::from_mode(0o700))
    }
    #[cfg(not(unix))]
    {
        builder.create(dir)
    }
}

fn probe_writable(dir: &Path) -> std::io::Result<()> {
    tempfile::Builder::new()
        .prefix(".stowage-probe")
        .tempfile_in(dir)
        .map(drop)
}
