mod cli;
mod commands;
mod config_store;
mod error;
mod i18n;
mod logging;
mod registry;
mod settings;
mod terminal;
mod wizard;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use log::{error, info, warn};

use stowage_core::{HttpFetcher, Installer};
use stowage_platform::{AppPaths, OsInfo};
use stowage_tailscale::{PeerDiscovery, TailscaleConnectHook};

use crate::cli::{Cli, Command};
use crate::config_store::DocumentStore;
use crate::error::AppError;
use crate::i18n::Language;
use crate::logging::LogOptions;
use crate::registry::BackendRegistry;
use crate::settings::AppSettings;
use crate::terminal::{CliPrompter, Terminal};
use crate::wizard::{Services, Wizard, WizardSession, WizardStatus};

fn main() -> ExitCode {
    let cli = Cli::parse();

    let runtime = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(error) => {
            eprintln!("Failed to start the async runtime: {error}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(code) => code,
        Err(error) => {
            error!("{error}");
            if cliclack::log::error(error.to_string()).is_err() {
                eprintln!("{error}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode, AppError> {
    let paths = AppPaths::new()
        .map_err(|error| AppError::operation_failed("Locate configuration directory", error))?;
    paths
        .ensure_dirs()
        .map_err(|error| AppError::operation_failed("Create configuration directory", error))?;

    let settings = AppSettings::load(&paths);
    if !paths.settings_file().exists()
        && let Err(error) = settings.save(&paths)
    {
        warn!("Could not write default settings: {error}");
    }

    let debug = cli.debug || settings.debug_logging;
    let command = cli.command();
    logging::init_logging(
        &paths,
        LogOptions {
            debug,
            max_log_size: settings.max_log_size_bytes,
            echo_to_stderr: command != Command::Setup,
        },
    );

    let language = Language::from_environment(cli.lang.as_deref(), settings.language.as_deref());
    let os = OsInfo::detect();
    info!(
        "stowage {} on {} ({}), language={}",
        env!("CARGO_PKG_VERSION"),
        os.display_name(),
        os.family,
        language.code()
    );

    let registry = BackendRegistry::with_defaults(&settings);
    let connect = Arc::new(TailscaleConnectHook::default());
    let installer = Installer::new(os)
        .with_timeouts(settings.step_timeouts())
        .with_fetcher(Arc::new(HttpFetcher::with_retry_delays(
            settings.retry_delays_secs.clone(),
        )))
        .with_hook("tailscale", connect.clone());
    let discovery = PeerDiscovery::default();
    let store = DocumentStore::new(paths.document_file());

    match command {
        Command::Setup => {
            let mut session = WizardSession::new(language, debug);
            // Start from the saved destination so re-running setup edits it.
            if let Ok(document) = store.load() {
                info!("Loaded saved {} configuration", document.backend_type);
                session.selected = Some(document.backend_type);
                session
                    .drafts
                    .insert(document.backend_type, document.backend_config);
            }

            let wizard = Wizard::new(
                session,
                Services {
                    registry,
                    installer,
                    discovery,
                    connect,
                    prompter: Arc::new(CliPrompter),
                    store,
                },
            );
            match Terminal::new(wizard).run().await? {
                WizardStatus::Completed { .. } => Ok(ExitCode::SUCCESS),
                WizardStatus::Active | WizardStatus::Cancelled => Ok(ExitCode::FAILURE),
            }
        }
        Command::Show => commands::show(&store).map(|()| ExitCode::SUCCESS),
        Command::Args { password_env } => {
            commands::args(&store, &registry, password_env.as_deref()).map(|()| ExitCode::SUCCESS)
        }
        Command::Test => commands::test(&store, &registry, language)
            .await
            .map(|()| ExitCode::SUCCESS),
        Command::Install { tools } => commands::install(&installer, &tools, language)
            .await
            .map(|()| ExitCode::SUCCESS),
        Command::Peers => commands::peers(&discovery, language)
            .await
            .map(|()| ExitCode::SUCCESS),
    }
}
