use log::{debug, info, warn};

use stowage_backend::{BackendConfig, BackendError, BackendKind, SetupContext};
use stowage_core::HookOutcome;
use stowage_tailscale::{Discovery, HOST};

use super::message::WizardMessage;
use super::state::{ConfigurationState, JobState, NoticeLevel, Screen};
use super::task::Task;
use super::Wizard;
use crate::error::AppError;
use crate::i18n::Text;

impl Wizard {
    pub(super) fn enter_configuration(&mut self) -> Task<WizardMessage> {
        self.configuration = ConfigurationState::default();
        if let (Some(plugin), Some(draft)) = (self.plugin(), self.session.draft()) {
            self.configuration.validation = Some(plugin.validate_config(draft));
        }
        self.session.push(Screen::BackendConfiguration);

        if self.session.selected == Some(BackendKind::MeshPeer) {
            self.start_discovery()
        } else {
            Task::none()
        }
    }

    fn on_configuration_screen(&self) -> bool {
        self.session.screen() == Screen::BackendConfiguration
    }

    pub(super) fn start_discovery(&mut self) -> Task<WizardMessage> {
        if !self.on_configuration_screen() || self.session.selected != Some(BackendKind::MeshPeer)
        {
            return Task::none();
        }
        if self.configuration.discovery.is_running() {
            debug!("Ignoring discovery request: discovery already running");
            return Task::none();
        }

        let (token, seq) = self.start_job();
        self.configuration.discovery = JobState::Running {
            token: token.clone(),
            seq,
        };
        self.configuration.discovery_error = None;
        self.notify(NoticeLevel::Progress, self.text(Text::SearchingPeers));
        let discovery = self.services.discovery.clone();

        Task::perform(
            async move {
                if token.is_cancelled() {
                    return Err(AppError::operation_cancelled("Peer discovery"));
                }
                discovery
                    .discover()
                    .await
                    .map_err(|error| AppError::operation_failed("Peer discovery", error))
            },
            move |result| WizardMessage::PeersDiscovered { seq, result },
        )
    }

    pub(super) fn handle_peers_discovered(&mut self, seq: u64, result: Result<Discovery, AppError>) {
        if !self.configuration.discovery.accepts(seq) {
            debug!(
                "Ignoring stale peer discovery: request_seq={seq} current_seq={:?}",
                self.configuration.discovery.current_seq()
            );
            return;
        }
        self.configuration.discovery = JobState::Done;

        match result {
            Ok(Discovery::NotConnected) => {
                info!("Tailscale is not connected");
                self.configuration.connection_required = true;
                self.configuration.peers.clear();
                self.session.selected_peers.remove(&BackendKind::MeshPeer);
                self.notify(NoticeLevel::Warning, self.text(Text::ConnectionRequired));
            }
            Ok(Discovery::Connected(peers)) => {
                info!("Discovered {} Tailscale peers", peers.len());
                self.configuration.connection_required = false;
                self.configuration.pending_auth = None;

                // Keep the operator's choice, or the saved draft's host, if
                // that peer is still online. Latency and status come fresh.
                let chosen = self
                    .session
                    .selected_peers
                    .get(&BackendKind::MeshPeer)
                    .map(|peer| peer.hostname.clone())
                    .or_else(|| {
                        self.session
                            .drafts
                            .get(&BackendKind::MeshPeer)
                            .and_then(|draft| draft.credential(HOST))
                            .map(ToString::to_string)
                    });
                let refreshed = chosen
                    .and_then(|hostname| {
                        peers
                            .iter()
                            .find(|peer| peer.hostname == hostname && peer.online)
                    })
                    .cloned();
                match refreshed {
                    Some(peer) => {
                        self.session.selected_peers.insert(BackendKind::MeshPeer, peer);
                    }
                    None => {
                        self.session.selected_peers.remove(&BackendKind::MeshPeer);
                    }
                }

                if peers.is_empty() {
                    self.notify(NoticeLevel::Warning, self.text(Text::NoPeers));
                }
                self.configuration.peers = peers;
            }
            Err(error) => {
                warn!("Peer discovery failed: {error}");
                self.notify(NoticeLevel::Error, error.to_string());
                self.configuration.discovery_error = Some(error.to_string());
            }
        }
    }

    pub(super) fn handle_connect(&mut self) -> Task<WizardMessage> {
        if !self.on_configuration_screen() || !self.configuration.connection_required {
            return Task::none();
        }
        if self.configuration.connect.is_running() {
            debug!("Ignoring connect request: already connecting");
            return Task::none();
        }

        let (token, seq) = self.start_job();
        self.configuration.connect = JobState::Running {
            token: token.clone(),
            seq,
        };
        let hook = self.services.connect.clone();

        Task::perform(
            async move {
                if token.is_cancelled() {
                    return HookOutcome::Failed {
                        message: AppError::operation_cancelled("Tailscale connect").to_string(),
                    };
                }
                hook.run(None).await
            },
            move |outcome| WizardMessage::Connected { seq, outcome },
        )
    }

    pub(super) fn handle_connected(&mut self, seq: u64, outcome: HookOutcome) -> Task<WizardMessage> {
        if !self.configuration.connect.accepts(seq) {
            debug!("Ignoring stale connect result: request_seq={seq}");
            return Task::none();
        }
        self.configuration.connect = JobState::Done;

        match outcome {
            HookOutcome::Ready => {
                self.configuration.connection_required = false;
                self.configuration.pending_auth = None;
                self.notify(NoticeLevel::Success, "Tailscale is connected");
                self.start_discovery()
            }
            HookOutcome::PendingAuth { url } => {
                self.notify(
                    NoticeLevel::Warning,
                    format!("{} {url}", self.text(Text::AuthenticateAt)),
                );
                self.configuration.pending_auth = Some(url);
                Task::none()
            }
            HookOutcome::Failed { message } => {
                self.notify(NoticeLevel::Error, message.clone());
                self.configuration.discovery_error = Some(message);
                Task::none()
            }
        }
    }

    pub(super) fn handle_select_peer(&mut self, hostname: &str) {
        if !self.on_configuration_screen() {
            return;
        }
        let Some(peer) = self
            .configuration
            .peers
            .iter()
            .find(|peer| peer.hostname == hostname)
            .cloned()
        else {
            self.notify(NoticeLevel::Error, format!("Unknown peer: {hostname}"));
            return;
        };
        if !peer.online {
            self.notify(
                NoticeLevel::Warning,
                format!("{hostname} is {}", self.text(Text::Offline)),
            );
            return;
        }
        debug!("Selected peer {hostname} ({})", peer.ip);
        self.session.selected_peers.insert(BackendKind::MeshPeer, peer);
    }

    pub(super) fn handle_collect(&mut self) -> Task<WizardMessage> {
        if !self.on_configuration_screen() {
            return Task::none();
        }
        if self.configuration.setup.is_running() {
            debug!("Ignoring collect request: setup already running");
            return Task::none();
        }
        let Some(plugin) = self.plugin() else {
            return Task::none();
        };

        let ctx = SetupContext {
            previous: self.session.draft().cloned(),
            selected_peer: self.session.selected_peer().cloned(),
        };
        let (token, seq) = self.start_job();
        self.configuration.setup = JobState::Running {
            token: token.clone(),
            seq,
        };
        self.configuration.setup_error = None;
        let prompter = self.services.prompter.clone();

        Task::perform(
            async move {
                if token.is_cancelled() {
                    return Err(BackendError::Cancelled);
                }
                plugin.setup_interactive(prompter.as_ref(), &ctx).await
            },
            move |result| WizardMessage::Collected { seq, result },
        )
    }

    pub(super) fn handle_collected(
        &mut self,
        seq: u64,
        result: Result<Option<BackendConfig>, BackendError>,
    ) {
        if !self.configuration.setup.accepts(seq) {
            debug!("Ignoring stale setup result: request_seq={seq}");
            return;
        }
        self.configuration.setup = JobState::Done;

        match result {
            Ok(Some(config)) => {
                let Some(plugin) = self.plugin() else {
                    return;
                };
                let report = plugin.validate_config(&config);
                for error in &report.errors {
                    self.notify(NoticeLevel::Warning, error.clone());
                }
                info!("Recorded {} settings: {}", config.kind, config.repository_path);
                self.session.drafts.insert(config.kind, config);
                self.configuration.validation = Some(report);
                self.configuration.test_passed = None;
                self.configuration.tested_at = None;
            }
            Ok(None) | Err(BackendError::Cancelled) => {
                debug!("Setup dialog cancelled, keeping previous values");
            }
            Err(error) => {
                warn!("Setup failed: {error}");
                self.notify(NoticeLevel::Error, error.to_string());
                self.configuration.setup_error = Some(error.to_string());
            }
        }
    }

    pub(super) fn handle_test_connection(&mut self) -> Task<WizardMessage> {
        if !self.on_configuration_screen() || self.configuration.test.is_running() {
            return Task::none();
        }
        let report = self.completeness();
        if !report.is_ok() {
            for error in report.errors {
                self.notify(NoticeLevel::Error, error);
            }
            return Task::none();
        }
        let (Some(plugin), Some(config)) = (self.plugin(), self.session.draft().cloned()) else {
            return Task::none();
        };

        let (token, seq) = self.start_job();
        self.configuration.test = JobState::Running {
            token: token.clone(),
            seq,
        };

        Task::perform(
            async move { !token.is_cancelled() && plugin.test_connection(&config).await },
            move |passed| WizardMessage::ConnectionTested { seq, passed },
        )
    }

    /// The result is advisory: a failed test never blocks saving.
    pub(super) fn handle_connection_tested(&mut self, seq: u64, passed: bool) {
        if !self.configuration.test.accepts(seq) {
            debug!("Ignoring stale connection test: request_seq={seq}");
            return;
        }
        self.configuration.test = JobState::Done;
        self.configuration.test_passed = Some(passed);
        self.configuration.tested_at = passed.then(chrono::Utc::now);

        if passed {
            self.notify(NoticeLevel::Success, self.text(Text::ConnectionOk));
        } else {
            self.notify(NoticeLevel::Warning, self.text(Text::ConnectionFailed));
        }
    }
}
