use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, warn};

use stowage_backend::{
    BackendConfig, BackendDescriptor, BackendError, BackendKind, BackendPlugin, FieldRequest,
    Prompter, SetupContext, ValidationReport, ask_text,
};
use stowage_platform::{CommandRunner, CommandSpec, SystemRunner};

const DEFAULT_REMOTE_PATH: &str = "/backup/kopia-repository";
const CONNECTION_TEST_TIMEOUT: Duration = Duration::from_secs(30);
const ECHO_TOKEN: &str = "stowage-ok";

pub const HOST: &str = "host";
pub const IP: &str = "ip";
pub const SSH_USER: &str = "ssh_user";
pub const SSH_KEY_FILE: &str = "ssh_key_file";

static DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    kind: BackendKind::MeshPeer,
    display_name: "Tailscale peer (SFTP)",
    description: "Another machine in your tailnet, reached over SSH",
    required_tools: &["tailscale", "ssh"],
};

#[derive(Clone)]
pub struct MeshPeerBackend {
    runner: Arc<dyn CommandRunner>,
}

impl Default for MeshPeerBackend {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

impl MeshPeerBackend {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        Self { runner }
    }
}

fn default_user() -> Option<String> {
    std::env::var("USER").ok().filter(|user| !user.is_empty())
}

fn default_key_file() -> Option<String> {
    let ssh_dir = dirs::home_dir()?.join(".ssh");
    ["id_ed25519", "id_ecdsa", "id_rsa"]
        .iter()
        .map(|name| ssh_dir.join(name))
        .find(|path| path.is_file())
        .or_else(|| Some(ssh_dir.join("id_ed25519")))
        .map(|path| path.to_string_lossy().to_string())
}

#[async_trait]
impl BackendPlugin for MeshPeerBackend {
    fn descriptor(&self) -> &'static BackendDescriptor {
        &DESCRIPTOR
    }

    fn field_requests(&self, ctx: &SetupContext) -> Vec<FieldRequest> {
        vec![
            FieldRequest::path("path", "Repository path on the peer").with_default(Some(
                ctx.previous_path().unwrap_or(DEFAULT_REMOTE_PATH),
            )),
            FieldRequest::text(SSH_USER, "SSH user on the peer").with_default(
                ctx.previous_credential(SSH_USER)
                    .map(ToString::to_string)
                    .or_else(default_user),
            ),
            FieldRequest::path(SSH_KEY_FILE, "SSH private key").with_default(
                ctx.previous_credential(SSH_KEY_FILE)
                    .map(ToString::to_string)
                    .or_else(default_key_file),
            ),
        ]
    }

    async fn setup_interactive(
        &self,
        prompter: &dyn Prompter,
        ctx: &SetupContext,
    ) -> Result<Option<BackendConfig>, BackendError> {
        let Some(peer) = &ctx.selected_peer else {
            return Err(BackendError::configuration(
                "Select a Tailscale peer before configuring this destination",
            ));
        };
        if !peer.online {
            return Err(BackendError::configuration(format!(
                "{} is offline",
                peer.hostname
            )));
        }

        let requests = self.field_requests(ctx);
        let mut answers = Vec::with_capacity(requests.len());
        for request in &requests {
            match ask_text(prompter, request).await? {
                Some(value) => answers.push(value),
                None => return Ok(None),
            }
        }
        let [path, user, key_file] = <[String; 3]>::try_from(answers)
            .map_err(|_| BackendError::configuration("Incomplete answers"))?;

        if !Path::new(&path).is_absolute() {
            return Err(BackendError::configuration(format!(
                "Repository path must be absolute: {path}"
            )));
        }
        if !Path::new(&key_file).is_file() {
            return Err(BackendError::configuration(format!(
                "SSH key file not found: {key_file}"
            )));
        }

        debug!("mesh: configured {user}@{}:{path}", peer.hostname);
        Ok(Some(
            BackendConfig::new(BackendKind::MeshPeer)
                .with_path(path)
                .with_credential(HOST, peer.hostname.clone())
                .with_credential(IP, peer.ip.clone())
                .with_credential(SSH_USER, user)
                .with_credential(SSH_KEY_FILE, key_file),
        ))
    }

    fn validate_config(&self, config: &BackendConfig) -> ValidationReport {
        let mut report = ValidationReport::ok();
        report.require(
            config.kind == BackendKind::MeshPeer,
            format!("Expected a mesh-peer config, got {}", config.kind),
        );
        report.require(
            Path::new(&config.repository_path).is_absolute(),
            "Repository path on the peer must be absolute",
        );
        report.require(config.credential(HOST).is_some(), "No peer selected");
        report.require(config.credential(SSH_USER).is_some(), "SSH user is required");
        match config.credential(SSH_KEY_FILE) {
            Some(key) => report.require(
                Path::new(key).is_file(),
                format!("SSH key file not found: {key}"),
            ),
            None => report.push("SSH key file is required"),
        }
        report
    }

    async fn test_connection(&self, config: &BackendConfig) -> bool {
        let (Some(host), Some(user), Some(key)) = (
            config.credential(HOST),
            config.credential(SSH_USER),
            config.credential(SSH_KEY_FILE),
        ) else {
            warn!("mesh: connection test skipped for incomplete config");
            return false;
        };

        let target = format!("{user}@{host}");
        let spec = CommandSpec::new("ssh", CONNECTION_TEST_TIMEOUT).args([
            "-o",
            "BatchMode=yes",
            "-o",
            "ConnectTimeout=10",
            "-i",
            key,
            target.as_str(),
            "echo",
            ECHO_TOKEN,
        ]);

        let outcome = self.runner.run(&spec).await;
        if outcome.stdout().is_some_and(|out| out.contains(ECHO_TOKEN)) {
            debug!("mesh: {host} answered over SSH");
            true
        } else {
            warn!("mesh: SSH test to {host} failed: {}", outcome.describe());
            false
        }
    }

    fn build_invocation_args(&self, config: &BackendConfig) -> Vec<String> {
        vec![
            "sftp".to_string(),
            "--path".to_string(),
            config.repository_path.clone(),
            "--host".to_string(),
            config.credential(HOST).unwrap_or_default().to_string(),
            "--username".to_string(),
            config.credential(SSH_USER).unwrap_or_default().to_string(),
            "--sftp-key-file".to_string(),
            config.credential(SSH_KEY_FILE).unwrap_or_default().to_string(),
        ]
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stowage_backend::testing::ScriptedPrompter;
    use stowage_backend::{
        BackendConfig, BackendError, BackendKind, BackendPlugin, SetupContext, TailscalePeer,
    };

    use super::{HOST, IP, MeshPeerBackend, SSH_KEY_FILE, SSH_USER};
    use crate::fake::FakeRunner;

    fn backend(runner: FakeRunner) -> MeshPeerBackend {
        MeshPeerBackend::new(Arc::new(runner))
    }

    fn ctx_with(peer: Option<TailscalePeer>) -> SetupContext {
        SetupContext {
            previous: None,
            selected_peer: peer,
        }
    }

    #[tokio::test]
    async fn setup_without_selected_peer_is_rejected() {
        let result = backend(FakeRunner::new())
            .setup_interactive(&ScriptedPrompter::new(), &ctx_with(None))
            .await;

        assert!(matches!(result, Err(BackendError::Configuration { .. })));
    }

    #[tokio::test]
    async fn setup_records_peer_and_ssh_details() {
        let key = tempfile::NamedTempFile::new().expect("temp key");
        let key_path = key.path().to_string_lossy().to_string();
        let prompter = ScriptedPrompter::new()
            .text("path", "/srv/backup")
            .text(SSH_USER, "backup")
            .text(SSH_KEY_FILE, &key_path);
        let peer = TailscalePeer::new("nas", "100.64.0.5", true);

        let config = backend(FakeRunner::new())
            .setup_interactive(&prompter, &ctx_with(Some(peer)))
            .await
            .expect("setup succeeds")
            .expect("not cancelled");

        assert_eq!(config.kind, BackendKind::MeshPeer);
        assert_eq!(config.repository_path, "/srv/backup");
        assert_eq!(config.credential(HOST), Some("nas"));
        assert_eq!(config.credential(IP), Some("100.64.0.5"));
        assert_eq!(config.credential(SSH_USER), Some("backup"));
        assert_eq!(config.credential(SSH_KEY_FILE), Some(key_path.as_str()));
    }

    #[tokio::test]
    async fn offline_peer_or_missing_key_is_rejected() {
        let offline = TailscalePeer::new("phone", "100.64.0.9", false);
        let result = backend(FakeRunner::new())
            .setup_interactive(&ScriptedPrompter::new(), &ctx_with(Some(offline)))
            .await;
        assert!(matches!(result, Err(BackendError::Configuration { .. })));

        let prompter = ScriptedPrompter::new()
            .text("path", "/srv/backup")
            .text(SSH_USER, "backup")
            .text(SSH_KEY_FILE, "/nonexistent/id_ed25519");
        let result = backend(FakeRunner::new())
            .setup_interactive(
                &prompter,
                &ctx_with(Some(TailscalePeer::new("nas", "100.64.0.5", true))),
            )
            .await;
        assert!(
            matches!(result, Err(BackendError::Configuration { ref reason }) if reason.contains("SSH key"))
        );
    }

    #[tokio::test]
    async fn connection_test_expects_echo_token() {
        let config = BackendConfig::new(BackendKind::MeshPeer)
            .with_path("/srv/backup")
            .with_credential(HOST, "nas")
            .with_credential(SSH_USER, "backup")
            .with_credential(SSH_KEY_FILE, "/home/op/.ssh/id_ed25519");

        let ok = backend(FakeRunner::new().ok("ssh ", "stowage-ok\n"));
        assert!(ok.test_connection(&config).await);

        let refused = backend(FakeRunner::new().reply("ssh ", Some(255), "", "Permission denied (publickey)."));
        assert!(!refused.test_connection(&config).await);

        let silent = backend(FakeRunner::new().time_out("ssh "));
        assert!(!silent.test_connection(&config).await);
    }

    #[test]
    fn validation_flags_missing_fields() {
        let report = MeshPeerBackend::default()
            .validate_config(&BackendConfig::new(BackendKind::MeshPeer).with_path("relative"));

        assert_eq!(report.errors.len(), 4);
    }

    #[test]
    fn invocation_args_use_sftp_without_running_commands() {
        let runner = Arc::new(FakeRunner::new());
        let backend = MeshPeerBackend::new(runner.clone());
        let config = BackendConfig::new(BackendKind::MeshPeer)
            .with_path("/srv/backup")
            .with_credential(HOST, "nas")
            .with_credential(IP, "100.64.0.5")
            .with_credential(SSH_USER, "backup")
            .with_credential(SSH_KEY_FILE, "/home/op/.ssh/id_ed25519");

        let first = backend.build_invocation_args(&config);
        assert_eq!(
            first,
            vec![
                "sftp",
                "--path",
                "/srv/backup",
                "--host",
                "nas",
                "--username",
                "backup",
                "--sftp-key-file",
                "/home/op/.ssh/id_ed25519",
            ]
        );
        assert_eq!(first, backend.build_invocation_args(&config));
        assert!(runner.calls().is_empty());
    }
}
