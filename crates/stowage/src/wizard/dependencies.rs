use log::{debug, info, warn};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio_util::sync::CancellationToken;

use stowage_core::{HookOutcome, InstallProgress, InstallReport, InstallResult, Installer};
use stowage_tailscale::Discovery;

use super::message::WizardMessage;
use super::state::{DependencyState, JobState, NoticeLevel, Screen};
use super::task::Task;
use super::Wizard;
use crate::error::AppError;
use crate::i18n::Text;

/// Install one tool, forwarding its progress while it runs. `None` when the
/// run was cancelled between two steps; a step that already started is
/// never interrupted.
async fn install_one(
    installer: &Installer,
    tool: &str,
    seq: u64,
    token: &CancellationToken,
    sender: &UnboundedSender<WizardMessage>,
) -> Option<InstallReport> {
    let (progress_tx, mut progress_rx) = unbounded_channel::<InstallProgress>();
    let install = installer.install_until(tool, Some(&progress_tx), token);
    tokio::pin!(install);

    let report = loop {
        tokio::select! {
            report = &mut install => break report,
            Some(progress) = progress_rx.recv() => {
                let _ = sender.send(WizardMessage::InstallProgress { seq, progress });
            }
        }
    };

    while let Ok(progress) = progress_rx.try_recv() {
        let _ = sender.send(WizardMessage::InstallProgress { seq, progress });
    }
    report
}

impl Wizard {
    fn required_tools(&self) -> Vec<String> {
        self.plugin()
            .map(|plugin| plugin.check_dependencies().into_iter().collect())
            .unwrap_or_default()
    }

    fn refresh_missing(&mut self) {
        let required = self.required_tools();
        self.dependencies.missing = self.services.installer.missing(&required);
    }

    pub(super) fn enter_dependency_check(&mut self) -> Task<WizardMessage> {
        self.dependencies = DependencyState::default();
        self.refresh_missing();

        if self.dependencies.missing.is_empty() {
            debug!("All required tools present, skipping the dependency screen");
            self.notify(NoticeLevel::Success, self.text(Text::AllToolsPresent));
            return self.enter_configuration();
        }

        info!(
            "Missing tools for {:?}: {}",
            self.session.selected,
            self.dependencies.missing.join(", ")
        );
        self.session.push(Screen::DependencyCheck);
        Task::none()
    }

    pub(super) fn handle_install_missing(&mut self) -> Task<WizardMessage> {
        if self.session.screen() != Screen::DependencyCheck {
            return Task::none();
        }
        if self.dependencies.install.is_running() {
            debug!("Ignoring install request: an install is already running");
            return Task::none();
        }
        if self.dependencies.missing.is_empty() {
            return Task::none();
        }

        let tools = self.dependencies.missing.clone();
        let (token, seq) = self.start_job();
        self.dependencies.install = JobState::Running {
            token: token.clone(),
            seq,
        };
        self.dependencies.results.clear();
        self.dependencies.progress.clear();
        self.dependencies.hook_error = None;
        self.dependencies.skipped = false;

        info!("Installing {}", tools.join(", "));
        let installer = self.services.installer.clone();

        Task::channel(move |sender| async move {
            for tool in tools {
                let Some(report) = install_one(&installer, &tool, seq, &token, &sender).await
                else {
                    debug!("Install run {seq} cancelled before {tool} finished");
                    return;
                };
                let _ = sender.send(WizardMessage::ToolInstalled { seq, tool, report });
            }
            let _ = sender.send(WizardMessage::InstallFinished { seq });
        })
    }

    pub(super) fn handle_install_progress(&mut self, seq: u64, progress: InstallProgress) {
        if !self.dependencies.install.accepts(seq) {
            return;
        }
        let entry = self
            .dependencies
            .progress
            .entry(progress.tool.clone())
            .or_insert((0, String::new()));
        if progress.percent != u8::MAX {
            entry.0 = progress.percent;
        }
        entry.1.clone_from(&progress.line);
        self.notify(
            NoticeLevel::Progress,
            format!("{}: {}", progress.tool, progress.line),
        );
    }

    pub(super) fn handle_tool_installed(&mut self, seq: u64, tool: String, report: InstallReport) {
        if !self.dependencies.install.accepts(seq) {
            debug!(
                "Ignoring stale install result for {tool}: request_seq={seq} current_seq={:?}",
                self.dependencies.install.current_seq()
            );
            return;
        }

        match &report.result {
            InstallResult::Success(_) => {
                self.notify(NoticeLevel::Success, format!("{tool}: {}", report.result));
            }
            InstallResult::AlreadyInstalled(_) => {
                self.notify(NoticeLevel::Info, format!("{tool}: {}", report.result));
            }
            failed => {
                warn!("Installing {tool} did not succeed: {failed}");
                let mut text = format!("{tool}: {failed}");
                if let Some(output) = failed.output() {
                    text.push('\n');
                    text.push_str(output.trim());
                }
                self.notify(NoticeLevel::Error, text);
            }
        }

        match report.hook {
            Some(HookOutcome::Ready) => {
                self.notify(NoticeLevel::Success, format!("{tool} is connected"));
            }
            Some(HookOutcome::PendingAuth { url }) => {
                self.notify(
                    NoticeLevel::Warning,
                    format!("{} {url}", self.text(Text::AuthenticateAt)),
                );
                self.dependencies.pending_auth = Some(url);
            }
            Some(HookOutcome::Failed { message }) => {
                self.notify(NoticeLevel::Error, format!("{tool}: {message}"));
                self.dependencies.hook_error = Some(message);
            }
            None => {}
        }

        self.dependencies.results.insert(tool, report.result);
    }

    pub(super) fn handle_install_finished(&mut self, seq: u64) -> Task<WizardMessage> {
        if !self.dependencies.install.accepts(seq) {
            return Task::none();
        }
        self.dependencies.install = JobState::Done;
        self.refresh_missing();

        if self.dependencies.missing.is_empty() && self.dependencies.pending_auth.is_none() {
            self.notify(NoticeLevel::Success, self.text(Text::AllToolsPresent));
            return self.enter_configuration();
        }
        Task::none()
    }

    pub(super) fn handle_skip_missing(&mut self) -> Task<WizardMessage> {
        if self.session.screen() != Screen::DependencyCheck
            || self.dependencies.install.is_running()
        {
            return Task::none();
        }
        warn!(
            "Continuing without {}",
            self.dependencies.missing.join(", ")
        );
        self.dependencies.skipped = true;
        self.dependencies.pending_auth = None;
        self.notify(NoticeLevel::Warning, self.text(Text::SkipWarning));
        self.enter_configuration()
    }

    /// Ask Tailscale again whether the out-of-band sign-in finished.
    pub(super) fn handle_reload(&mut self) -> Task<WizardMessage> {
        if self.dependencies.reload.is_running() || self.dependencies.install.is_running() {
            return Task::none();
        }
        if self.dependencies.pending_auth.is_none() {
            self.refresh_missing();
            return Task::none();
        }

        let (token, seq) = self.start_job();
        self.dependencies.reload = JobState::Running {
            token: token.clone(),
            seq,
        };
        let discovery = self.services.discovery.clone();

        Task::perform(
            async move {
                if token.is_cancelled() {
                    return Err(AppError::operation_cancelled("Tailscale status check"));
                }
                discovery
                    .discover()
                    .await
                    .map_err(|error| AppError::operation_failed("Tailscale status check", error))
            },
            move |result| WizardMessage::Reloaded { seq, result },
        )
    }

    pub(super) fn handle_reloaded(
        &mut self,
        seq: u64,
        result: Result<Discovery, AppError>,
    ) -> Task<WizardMessage> {
        if !self.dependencies.reload.accepts(seq) {
            debug!("Ignoring stale status check: request_seq={seq}");
            return Task::none();
        }
        self.dependencies.reload = JobState::Done;

        match result {
            Ok(Discovery::Connected(_)) => {
                info!("Tailscale sign-in completed");
                self.dependencies.pending_auth = None;
                self.dependencies.hook_error = None;
                self.refresh_missing();
                if self.dependencies.can_continue() {
                    return self.enter_configuration();
                }
            }
            Ok(Discovery::NotConnected) => {
                let text = match &self.dependencies.pending_auth {
                    Some(url) => format!("{} {url}", self.text(Text::AuthenticateAt)),
                    None => self.text(Text::ConnectionRequired).to_string(),
                };
                self.notify(NoticeLevel::Warning, text);
            }
            Err(error) => self.notify(NoticeLevel::Error, error.to_string()),
        }
        Task::none()
    }
}
