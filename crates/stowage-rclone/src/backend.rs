use async_trait::async_trait;
use log::{debug, info, warn};

use stowage_backend::{
    BackendConfig, BackendDescriptor, BackendError, BackendKind, BackendPlugin, FieldRequest,
    Prompter, SelectOption, SetupContext, ValidationReport, ask_text,
};

use crate::client::RcloneClient;
use crate::config::parse_remote_sections;

pub const CONFIG_CREDENTIAL: &str = "rclone_config";

const DEFAULT_REMOTE_DIR: &str = "kopia-repository";

static DESCRIPTOR: BackendDescriptor = BackendDescriptor {
    kind: BackendKind::CloudSync,
    display_name: "Cloud storage (rclone)",
    description: "Any of the 70+ providers rclone supports",
    required_tools: &["rclone"],
};

/// Split `remote:path` into its remote name and in-remote path.
#[must_use]
pub fn split_remote_path(value: &str) -> Option<(&str, &str)> {
    let (remote, path) = value.split_once(':')?;
    (!remote.trim().is_empty()).then_some((remote, path))
}

#[derive(Clone, Default)]
pub struct CloudSyncBackend {
    client: RcloneClient,
}

impl CloudSyncBackend {
    #[must_use]
    pub fn new(client: RcloneClient) -> Self {
        Self { client }
    }

    fn remote_request(
        remotes: &[String],
        types: &std::collections::BTreeMap<String, String>,
        previous: Option<&str>,
    ) -> FieldRequest {
        let options = remotes
            .iter()
            .map(|name| {
                let option = SelectOption::new(name.clone(), name.clone());
                match types.get(name) {
                    Some(kind) => option.with_hint(kind.clone()),
                    None => option,
                }
            })
            .collect();
        let default = previous
            .filter(|name| remotes.iter().any(|remote| remote == name))
            .or_else(|| remotes.first().map(String::as_str));
        FieldRequest::select("remote", "rclone remote", options).with_default(default)
    }
}

#[async_trait]
impl BackendPlugin for CloudSyncBackend {
    fn descriptor(&self) -> &'static BackendDescriptor {
        &DESCRIPTOR
    }

    fn field_requests(&self, ctx: &SetupContext) -> Vec<FieldRequest> {
        let previous = ctx.previous_path().and_then(split_remote_path);
        let remotes: Vec<String> = previous
            .map(|(remote, _)| vec![remote.to_string()])
            .unwrap_or_default();

        vec![
            Self::remote_request(
                &remotes,
                &std::collections::BTreeMap::new(),
                previous.map(|(remote, _)| remote),
            ),
            FieldRequest::text("remote_path", "Path inside the remote").with_default(Some(
                previous.map_or(DEFAULT_REMOTE_DIR, |(_, path)| path),
            )),
        ]
    }

    async fn setup_interactive(
        &self,
        prompter: &dyn Prompter,
        ctx: &SetupContext,
    ) -> Result<Option<BackendConfig>, BackendError> {
        let mut remotes = self.client.list_remotes().await?;

        if remotes.is_empty() {
            info!("rclone: no remotes configured, launching rclone config");
            prompter.note("No rclone remotes are configured yet. Starting `rclone config`.");
            remotes = self.client.configure_interactively().await?;
        }
        if remotes.is_empty() {
            return Err(BackendError::configuration(
                "No rclone remotes are configured. Run `rclone config` to add one.",
            ));
        }

        let config_file = self.client.config_file().await?;
        let types = self.client.remote_types().await;
        debug!("rclone: {} remotes available", remotes.len());

        let previous = ctx.previous_path().and_then(split_remote_path);
        let Some(remote) = ask_text(
            prompter,
            &Self::remote_request(&remotes, &types, previous.map(|(remote, _)| remote)),
        )
        .await?
        else {
            return Ok(None);
        };
        if !remotes.contains(&remote) {
            return Err(BackendError::configuration(format!(
                "Unknown rclone remote: {remote}"
            )));
        }

        let path_request = FieldRequest::text("remote_path", "Path inside the remote")
            .with_default(Some(previous.map_or(DEFAULT_REMOTE_DIR, |(_, path)| path)));
        let Some(remote_path) = ask_text(prompter, &path_request).await? else {
            return Ok(None);
        };

        Ok(Some(
            BackendConfig::new(BackendKind::CloudSync)
                .with_path(format!("{remote}:{}", remote_path.trim_start_matches('/')))
                .with_credential(CONFIG_CREDENTIAL, config_file.to_string_lossy()),
        ))
    }

    fn validate_config(&self, config: &BackendConfig) -> ValidationReport {
        let mut report = ValidationReport::ok();
        report.require(
            config.kind == BackendKind::CloudSync,
            format!("Expected a cloud-sync config, got {}", config.kind),
        );

        let Some((remote, _)) = split_remote_path(&config.repository_path) else {
            report.push("Repository path must have the form remote:path");
            return report;
        };

        let Some(config_file) = config.credential(CONFIG_CREDENTIAL) else {
            report.push("rclone config file is not set");
            return report;
        };

        match std::fs::read_to_string(config_file) {
            Ok(content) => report.require(
                parse_remote_sections(&content).iter().any(|name| name == remote),
                format!("Remote `{remote}` is no longer present in {config_file}"),
            ),
            Err(error) => report.push(format!("Cannot read {config_file}: {error}")),
        }
        report
    }

    async fn test_connection(&self, config: &BackendConfig) -> bool {
        let (Some((remote, _)), Some(config_file)) = (
            split_remote_path(&config.repository_path),
            config.credential(CONFIG_CREDENTIAL),
        ) else {
            warn!("rclone: connection test skipped for incomplete config");
            return false;
        };

        match self.client.list_dirs(config_file, remote).await {
            Ok(()) => {
                debug!("rclone: remote {remote} reachable");
                true
            }
            Err(error) => {
                warn!("rclone: connection test for {remote} failed: {error}");
                false
            }
        }
    }

    fn build_invocation_args(&self, config: &BackendConfig) -> Vec<String> {
        let mut args = vec![
            "rclone".to_string(),
            "--remote-path".to_string(),
            config.repository_path.clone(),
        ];
        if let Some(config_file) = config.credential(CONFIG_CREDENTIAL) {
            args.push("--embed-rclone-config".to_string());
            args.push(config_file.to_string());
        }
        args
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use stowage_backend::testing::ScriptedPrompter;
    use stowage_backend::{BackendConfig, BackendError, BackendKind, BackendPlugin, SetupContext};

    use super::{CONFIG_CREDENTIAL, CloudSyncBackend, split_remote_path};
    use crate::client::tests::{FakeRclone, client};

    fn config_file(content: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().expect("temp config");
        file.write_all(content.as_bytes()).expect("write config");
        file
    }

    #[tokio::test]
    async fn setup_picks_remote_and_records_config_file() {
        let file = config_file("[gdrive]\ntype = drive\n");
        let location = file.path().to_string_lossy().to_string();
        let (client, _) = client(
            FakeRclone::default()
                .reply("listremotes", "gdrive:\n")
                .reply("config file", &format!("Configuration file is stored at:\n{location}\n"))
                .reply("config dump", r#"{"gdrive":{"type":"drive"}}"#),
        );
        let prompter = ScriptedPrompter::new().text("remote_path", "/backups/laptop");

        let config = CloudSyncBackend::new(client)
            .setup_interactive(&prompter, &SetupContext::default())
            .await
            .expect("setup succeeds")
            .expect("setup is not cancelled");

        assert_eq!(config.kind, BackendKind::CloudSync);
        assert_eq!(config.repository_path, "gdrive:backups/laptop");
        assert_eq!(config.credential(CONFIG_CREDENTIAL), Some(location.as_str()));
        assert_eq!(prompter.asked(), vec!["remote", "remote_path"]);
    }

    #[tokio::test]
    async fn no_remotes_after_rclone_config_is_configuration_error() {
        let (client, fake) = client(FakeRclone::default().reply("listremotes", ""));
        let prompter = ScriptedPrompter::new();

        let result = CloudSyncBackend::new(client)
            .setup_interactive(&prompter, &SetupContext::default())
            .await;

        assert!(matches!(result, Err(BackendError::Configuration { .. })));
        assert_eq!(
            *fake.calls.lock().expect("fake lock"),
            vec!["listremotes", "listremotes"]
        );
        assert_eq!(prompter.notes().len(), 1);
    }

    #[tokio::test]
    async fn remote_created_by_rclone_config_is_used() {
        let file = config_file("[box]\ntype = box\n");
        let location = file.path().to_string_lossy().to_string();
        let (client, _) = client(
            FakeRclone::default()
                .reply("listremotes", "")
                .reply("listremotes", "box:\n")
                .reply("config file", &location)
                .reply("config dump", "{}"),
        );

        let config = CloudSyncBackend::new(client)
            .setup_interactive(&ScriptedPrompter::new(), &SetupContext::default())
            .await
            .expect("setup succeeds")
            .expect("defaults answer every prompt");

        assert_eq!(config.repository_path, "box:kopia-repository");
    }

    #[tokio::test]
    async fn missing_config_file_stops_setup() {
        let (client, _) = client(
            FakeRclone::default()
                .reply("listremotes", "gdrive:\n")
                .reply("config file", "/nonexistent/rclone.conf\n"),
        );

        let result = CloudSyncBackend::new(client)
            .setup_interactive(&ScriptedPrompter::new(), &SetupContext::default())
            .await;

        assert!(matches!(result, Err(BackendError::Configuration { .. })));
    }

    #[test]
    fn validation_requires_remote_in_config_file() {
        let file = config_file("[gdrive]\ntype = drive\n");
        let backend = CloudSyncBackend::default();
        let base = BackendConfig::new(BackendKind::CloudSync)
            .with_credential(CONFIG_CREDENTIAL, file.path().to_string_lossy());

        assert!(
            backend
                .validate_config(&base.clone().with_path("gdrive:repo"))
                .is_ok()
        );

        let gone = backend.validate_config(&base.clone().with_path("s3:repo"));
        assert_eq!(gone.errors.len(), 1);
        assert!(gone.errors[0].contains("`s3`"));

        let malformed = backend.validate_config(&base.with_path("no-colon"));
        assert!(!malformed.is_ok());
    }

    #[tokio::test]
    async fn connection_test_lists_remote_root() {
        let (client, fake) = client(
            FakeRclone::default().reply("--config /etc/rclone.conf lsd gdrive:", "          -1 2024-01-01 00:00:00        -1 repo\n"),
        );
        let config = BackendConfig::new(BackendKind::CloudSync)
            .with_path("gdrive:repo")
            .with_credential(CONFIG_CREDENTIAL, "/etc/rclone.conf");

        assert!(CloudSyncBackend::new(client).test_connection(&config).await);
        assert_eq!(fake.calls.lock().expect("fake lock").len(), 1);
    }

    #[test]
    fn invocation_args_embed_config_without_running_rclone() {
        let (client, fake) = client(FakeRclone::default());
        let backend = CloudSyncBackend::new(client);
        let config = BackendConfig::new(BackendKind::CloudSync)
            .with_path("gdrive:repo")
            .with_credential(CONFIG_CREDENTIAL, "/home/op/.config/rclone/rclone.conf");

        let first = backend.build_invocation_args(&config);
        assert_eq!(
            first,
            vec![
                "rclone",
                "--remote-path",
                "gdrive:repo",
                "--embed-rclone-config",
                "/home/op/.config/rclone/rclone.conf",
            ]
        );
        assert_eq!(first, backend.build_invocation_args(&config));
        assert!(fake.calls.lock().expect("fake lock").is_empty());
    }

    #[test]
    fn remote_path_splitting() {
        assert_eq!(split_remote_path("gdrive:a/b"), Some(("gdrive", "a/b")));
        assert_eq!(split_remote_path("gdrive:"), Some(("gdrive", "")));
        assert_eq!(split_remote_path(":a"), None);
        assert_eq!(split_remote_path("plain"), None);
    }
}
