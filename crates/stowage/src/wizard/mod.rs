//! The setup wizard as a state machine.
//!
//! [`Wizard::update`] is the only place state changes. It never blocks: work
//! that touches the system is returned as a [`Task`] which the [`Runtime`]
//! spawns, and whose result comes back as another [`WizardMessage`]. Every
//! background job carries a sequence number and a cancellation token. The
//! token is checked before each external command starts; a command already
//! running is left to finish, and its result is dropped by sequence number.

mod completion;
mod configuration;
mod dependencies;
mod message;
mod runtime;
mod state;
mod task;


use std::sync::Arc;

use log::debug;
use tokio_util::sync::CancellationToken;

use stowage_backend::{BackendConfig, BackendKind, BackendPlugin, Prompter, ValidationReport};
use stowage_core::{Installer, PostInstallHook};
use stowage_tailscale::{HOST, PeerDiscovery};

use crate::config_store::DocumentStore;
use crate::i18n::Text;
use crate::registry::BackendRegistry;

pub use message::WizardMessage;
pub use runtime::Runtime;
pub use state::{
    ConfigurationState, DependencyState, JobState, Notice, NoticeLevel, Screen, WizardSession,
    WizardStatus,
};
pub use task::Task;

/// The collaborators the wizard hands work to.
pub struct Services {
    pub registry: BackendRegistry,
    pub installer: Installer,
    pub discovery: PeerDiscovery,
    pub connect: Arc<dyn PostInstallHook>,
    pub prompter: Arc<dyn Prompter>,
    pub store: DocumentStore,
}

pub struct Wizard {
    session: WizardSession,
    services: Services,
    dependencies: DependencyState,
    configuration: ConfigurationState,
    saving: bool,
    request_seq: u64,
    notices: Vec<Notice>,
}

impl Wizard {
    pub fn new(session: WizardSession, services: Services) -> Self {
        Self {
            session,
            services,
            dependencies: DependencyState::default(),
            configuration: ConfigurationState::default(),
            saving: false,
            request_seq: 0,
            notices: Vec::new(),
        }
    }

    pub fn session(&self) -> &WizardSession {
        &self.session
    }

    pub fn dependencies(&self) -> &DependencyState {
        &self.dependencies
    }

    pub fn configuration(&self) -> &ConfigurationState {
        &self.configuration
    }

    pub fn registry(&self) -> &BackendRegistry {
        &self.services.registry
    }

    /// Notices produced since the last call, oldest first.
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    pub fn plugin(&self) -> Option<Arc<dyn BackendPlugin>> {
        self.session
            .selected
            .and_then(|kind| self.services.registry.get(kind))
    }

    /// The gate for leaving configuration and for saving: a destination is
    /// selected, its settings were entered and they validate. A mesh peer
    /// additionally needs a live connection and the draft's host online in
    /// the latest discovery.
    pub fn completeness(&self) -> ValidationReport {
        let mut report = ValidationReport::ok();
        let Some(plugin) = self.plugin() else {
            report.push("No destination selected");
            return report;
        };
        let Some(draft) = self.session.draft() else {
            report.push("Destination settings have not been entered");
            return report;
        };
        let mut report = plugin.validate_config(draft);
        if draft.kind == BackendKind::MeshPeer {
            self.check_mesh_reachable(draft, &mut report);
        }
        report
    }

    fn check_mesh_reachable(&self, draft: &BackendConfig, report: &mut ValidationReport) {
        if self.configuration.connection_required {
            report.push(self.text(Text::ConnectionRequired));
            return;
        }
        let Some(host) = draft.credential(HOST) else {
            return;
        };
        let discovered = self
            .configuration
            .peers
            .iter()
            .find(|peer| peer.hostname == host);
        let selected = self
            .session
            .selected_peer()
            .is_some_and(|peer| peer.hostname == host);

        match discovered {
            None => report.push(format!("{host} was not found in the tailnet")),
            Some(peer) if !peer.online => {
                report.push(format!("{host} is {}", self.text(Text::Offline)));
            }
            Some(_) if !selected => report.push(format!("Select {host} as the peer")),
            Some(_) => {}
        }
    }

    pub fn is_complete(&self) -> bool {
        self.completeness().is_ok()
    }

    fn notify(&mut self, level: NoticeLevel, text: impl Into<String>) {
        self.notices.push(Notice::new(level, text));
    }

    fn text(&self, key: Text) -> &'static str {
        self.session.language.text(key)
    }

    fn start_job(&mut self) -> (CancellationToken, u64) {
        self.request_seq = self.request_seq.wrapping_add(1);
        (CancellationToken::new(), self.request_seq)
    }

    fn cancel_jobs(&mut self) {
        self.dependencies.install.cancel();
        self.dependencies.reload.cancel();
        self.configuration.discovery.cancel();
        self.configuration.connect.cancel();
        self.configuration.setup.cancel();
        self.configuration.test.cancel();
    }

    pub fn update(&mut self, message: WizardMessage) -> Task<WizardMessage> {
        if !self.session.is_active() {
            debug!("Ignoring {message:?}: the session has ended");
            return Task::none();
        }

        match message {
            WizardMessage::Next => self.handle_next(),
            WizardMessage::Back => {
                self.handle_back();
                Task::none()
            }
            WizardMessage::Cancel => {
                self.handle_cancel();
                Task::none()
            }
            WizardMessage::SelectBackend(kind) => {
                self.handle_select_backend(kind);
                Task::none()
            }
            WizardMessage::InstallMissing => self.handle_install_missing(),
            WizardMessage::SkipMissing => self.handle_skip_missing(),
            WizardMessage::InstallProgress { seq, progress } => {
                self.handle_install_progress(seq, progress);
                Task::none()
            }
            WizardMessage::ToolInstalled { seq, tool, report } => {
                self.handle_tool_installed(seq, tool, report);
                Task::none()
            }
            WizardMessage::InstallFinished { seq } => self.handle_install_finished(seq),
            WizardMessage::Reload => match self.session.screen() {
                Screen::DependencyCheck => self.handle_reload(),
                Screen::BackendConfiguration => self.start_discovery(),
                _ => Task::none(),
            },
            WizardMessage::Reloaded { seq, result } => self.handle_reloaded(seq, result),
            WizardMessage::DiscoverPeers => self.start_discovery(),
            WizardMessage::PeersDiscovered { seq, result } => {
                self.handle_peers_discovered(seq, result);
                Task::none()
            }
            WizardMessage::Connect => self.handle_connect(),
            WizardMessage::Connected { seq, outcome } => self.handle_connected(seq, outcome),
            WizardMessage::SelectPeer(hostname) => {
                self.handle_select_peer(&hostname);
                Task::none()
            }
            WizardMessage::Collect => self.handle_collect(),
            WizardMessage::Collected { seq, result } => {
                self.handle_collected(seq, result);
                Task::none()
            }
            WizardMessage::TestConnection => self.handle_test_connection(),
            WizardMessage::ConnectionTested { seq, passed } => {
                self.handle_connection_tested(seq, passed);
                Task::none()
            }
            WizardMessage::Save => self.handle_save(),
            WizardMessage::Saved(result) => {
                self.handle_saved(result);
                Task::none()
            }
        }
    }

    fn handle_next(&mut self) -> Task<WizardMessage> {
        match self.session.screen() {
            Screen::Welcome => {
                self.session.push(Screen::BackendSelection);
                Task::none()
            }
            Screen::BackendSelection => {
                if self.session.selected.is_none() {
                    self.notify(NoticeLevel::Warning, self.text(Text::ChooseBackend));
                    return Task::none();
                }
                self.enter_dependency_check()
            }
            Screen::DependencyCheck => {
                if self.dependencies.install.is_running() {
                    debug!("Ignoring next while tools are being installed");
                    return Task::none();
                }
                if !self.dependencies.can_continue() {
                    let text = match &self.dependencies.pending_auth {
                        Some(url) => format!("{} {url}", self.text(Text::AuthenticateAt)),
                        None => format!(
                            "{}: {}",
                            self.text(Text::MissingTools),
                            self.dependencies.missing.join(", ")
                        ),
                    };
                    self.notify(NoticeLevel::Warning, text);
                    return Task::none();
                }
                self.enter_configuration()
            }
            Screen::BackendConfiguration => {
                if self.configuration.setup.is_running() {
                    return Task::none();
                }
                let report = self.completeness();
                if report.is_ok() {
                    self.session.push(Screen::Completion);
                } else {
                    for error in report.errors {
                        self.notify(NoticeLevel::Error, error);
                    }
                }
                Task::none()
            }
            Screen::Completion => self.handle_save(),
        }
    }

    fn handle_back(&mut self) {
        if self.saving {
            debug!("Ignoring back while the configuration is being saved");
            return;
        }
        self.cancel_jobs();
        if !self.session.pop() {
            debug!("Already on the first screen");
        }
    }

    fn handle_cancel(&mut self) {
        self.cancel_jobs();
        self.session.status = WizardStatus::Cancelled;
        self.notify(NoticeLevel::Info, self.text(Text::Cancelled));
        log::info!("Setup cancelled after {:?}", self.session.history());
    }

    fn handle_select_backend(&mut self, kind: BackendKind) {
        if self.session.screen() != Screen::BackendSelection {
            debug!("Ignoring backend selection outside the selection screen");
            return;
        }
        if self.services.registry.get(kind).is_none() {
            self.notify(
                NoticeLevel::Error,
                crate::error::AppError::unknown_backend(kind.as_str()).to_string(),
            );
            return;
        }
        debug!("Selected destination {kind}");
        self.session.selected = Some(kind);
    }
}
