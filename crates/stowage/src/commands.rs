//! The non-interactive subcommands. They work on the saved configuration
//! document and print plain output that scripts can consume.

use chrono::{DateTime, Utc};
use log::{info, warn};
use tokio::sync::mpsc::unbounded_channel;

use stowage_core::{HookOutcome, InstallProgress, Installer};
use stowage_tailscale::{Discovery, PeerDiscovery};

use crate::config_store::{ConfigDocument, DocumentStore};
use crate::error::AppError;
use crate::i18n::{Language, Text};
use crate::registry::BackendRegistry;

fn print_failed(error: std::io::Error) -> AppError {
    AppError::operation_failed("Print output", error)
}

pub fn show(store: &DocumentStore) -> Result<(), AppError> {
    let document = store.load()?;
    let json = serde_json::to_string_pretty(&document)
        .map_err(|error| AppError::operation_failed("Render configuration", error))?;
    println!("{json}");
    Ok(())
}

/// Engine arguments for a saved document. The password, when given, is only
/// appended here and never stored.
pub fn engine_args(
    document: &ConfigDocument,
    registry: &BackendRegistry,
    password: Option<&str>,
) -> Result<Vec<String>, AppError> {
    let plugin = registry.lookup(document.backend_type.as_str())?;

    let report = plugin.validate_config(&document.backend_config);
    if !report.is_ok() {
        return Err(AppError::configuration_incomplete(report.errors));
    }

    Ok(match password {
        Some(password) => plugin.build_engine_args(&document.backend_config, password),
        None => plugin.build_invocation_args(&document.backend_config),
    })
}

pub fn args(
    store: &DocumentStore,
    registry: &BackendRegistry,
    password_env: Option<&str>,
) -> Result<(), AppError> {
    let document = store.load()?;
    let password = match password_env {
        Some(var) => Some(std::env::var(var).map_err(|_| {
            AppError::message(format!("Environment variable {var} is not set"))
        })?),
        None => None,
    };

    for arg in engine_args(&document, registry, password.as_deref())? {
        println!("{arg}");
    }
    Ok(())
}

/// Run the destination's connection test and record a pass in the document.
pub async fn check_connection(
    store: &DocumentStore,
    registry: &BackendRegistry,
) -> Result<DateTime<Utc>, AppError> {
    let mut document = store.load()?;
    let plugin = registry.lookup(document.backend_type.as_str())?;

    if !plugin.test_connection(&document.backend_config).await {
        return Err(AppError::operation_failed(
            "Connection test",
            format!(
                "{} at {} did not answer",
                plugin.descriptor().display_name,
                document.backend_config.repository_path
            ),
        ));
    }

    let checked = Utc::now();
    document.repository.last_check = Some(checked);
    store.save(&document)?;
    Ok(checked)
}

pub async fn test(
    store: &DocumentStore,
    registry: &BackendRegistry,
    language: Language,
) -> Result<(), AppError> {
    let checked = check_connection(store, registry).await?;
    info!("Connection test passed at {checked}");
    cliclack::log::success(language.text(Text::ConnectionOk)).map_err(print_failed)
}

pub async fn install(
    installer: &Installer,
    tools: &[String],
    language: Language,
) -> Result<(), AppError> {
    let mut unavailable = Vec::new();

    for tool in tools {
        cliclack::log::step(format!("{} {tool}", language.text(Text::Installing)))
            .map_err(print_failed)?;

        let (progress_tx, mut progress_rx) = unbounded_channel::<InstallProgress>();
        let printer = tokio::spawn(async move {
            while let Some(progress) = progress_rx.recv().await {
                let _ = cliclack::log::remark(&progress.line);
            }
        });
        let report = installer.install_with_hooks(tool, Some(&progress_tx)).await;
        drop(progress_tx);
        if let Err(error) = printer.await {
            warn!("Progress printer stopped: {error}");
        }

        if report.result.is_available() {
            cliclack::log::success(format!("{tool}: {}", report.result)).map_err(print_failed)?;
        } else {
            let mut text = format!("{tool}: {}", report.result);
            if let Some(output) = report.result.output() {
                text.push('\n');
                text.push_str(output.trim());
            }
            cliclack::log::error(text).map_err(print_failed)?;
            unavailable.push(tool.clone());
        }

        match report.hook {
            Some(HookOutcome::PendingAuth { url }) => {
                cliclack::log::warning(format!("{} {url}", language.text(Text::AuthenticateAt)))
                    .map_err(print_failed)?;
                let _ = open::that(&url);
            }
            Some(HookOutcome::Failed { message }) => {
                cliclack::log::error(message).map_err(print_failed)?;
            }
            Some(HookOutcome::Ready) | None => {}
        }
    }

    if unavailable.is_empty() {
        Ok(())
    } else {
        Err(AppError::operation_failed(
            "Install",
            format!("Not installed: {}", unavailable.join(", ")),
        ))
    }
}

pub async fn peers(discovery: &PeerDiscovery, language: Language) -> Result<(), AppError> {
    let discovered = discovery
        .discover()
        .await
        .map_err(|error| AppError::operation_failed("Peer discovery", error))?;

    let peers = match discovered {
        Discovery::NotConnected => {
            return cliclack::log::warning(language.text(Text::ConnectionRequired))
                .map_err(print_failed);
        }
        Discovery::Connected(peers) if peers.is_empty() => {
            return cliclack::log::warning(language.text(Text::NoPeers)).map_err(print_failed);
        }
        Discovery::Connected(peers) => peers,
    };

    for peer in peers {
        let status = if peer.online {
            "online"
        } else {
            language.text(Text::Offline)
        };
        let latency = peer
            .latency_ms
            .map(|ms| format!("{ms:.0}ms"))
            .unwrap_or_else(|| "-".to_string());
        let free = peer
            .free_space_gb
            .map(|gb| format!("{gb}GB"))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{}\t{}\t{}\t{status}\t{latency}\t{free}",
            peer.hostname, peer.ip, peer.os
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use stowage_backend::{BackendConfig, BackendKind};
    use stowage_filesystem::FilesystemBackend;

    use super::{check_connection, engine_args};
    use crate::config_store::{ConfigDocument, DocumentStore};
    use crate::error::AppError;
    use crate::i18n::Language;
    use crate::registry::BackendRegistry;

    fn registry() -> BackendRegistry {
        let mut registry = BackendRegistry::default();
        registry.register(Arc::new(FilesystemBackend::new("/backup/kopia-repository")));
        registry
    }

    fn saved(dir: &std::path::Path, repository: &str) -> DocumentStore {
        let store = DocumentStore::new(dir.join("repository.json"));
        let config = BackendConfig::new(BackendKind::Filesystem).with_path(repository);
        store
            .save(&ConfigDocument::new(config, Language::En, None))
            .expect("document should be saved");
        store
    }

    #[test]
    fn engine_args_append_password_only_on_request() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let repository = dir.path().to_string_lossy().to_string();
        let store = saved(dir.path(), &repository);
        let document = store.load().expect("document should load");

        assert_eq!(
            engine_args(&document, &registry(), None).expect("valid config"),
            vec!["filesystem", "--path", repository.as_str()]
        );
        assert_eq!(
            engine_args(&document, &registry(), Some("hunter2")).expect("valid config"),
            vec!["filesystem", "--path", repository.as_str(), "--password", "hunter2"]
        );
    }

    #[test]
    fn engine_args_reject_invalid_or_unknown_destinations() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let store = saved(dir.path(), "relative/path");
        let document = store.load().expect("document should load");

        assert!(matches!(
            engine_args(&document, &registry(), None),
            Err(AppError::ConfigurationIncomplete { .. })
        ));
        assert!(matches!(
            engine_args(&document, &BackendRegistry::default(), None),
            Err(AppError::UnknownBackend { .. })
        ));
    }

    #[tokio::test]
    async fn passing_check_is_recorded() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let repository = dir.path().join("repo");
        std::fs::create_dir(&repository).expect("repository directory should be created");
        let store = saved(dir.path(), &repository.to_string_lossy());

        let checked = check_connection(&store, &registry())
            .await
            .expect("connection test should pass");

        let document = store.load().expect("document should load");
        assert_eq!(document.repository.last_check, Some(checked));
    }

    #[tokio::test]
    async fn failing_check_leaves_document_untouched() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let store = saved(dir.path(), "/nonexistent/stowage-repository");
        let before = store.load().expect("document should load");

        let result = check_connection(&store, &registry()).await;

        assert!(matches!(result, Err(AppError::OperationFailed { .. })));
        assert_eq!(store.load().expect("document should load"), before);
    }

    #[tokio::test]
    async fn missing_document_is_reported() {
        let dir = tempfile::tempdir().expect("temporary directory should be created");
        let store = DocumentStore::new(dir.path().join("repository.json"));

        assert!(matches!(
            check_connection(&store, &registry()).await,
            Err(AppError::DocumentMissing { .. })
        ));
    }
}
