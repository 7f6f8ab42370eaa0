use std::collections::HashMap;
use std::io::Write as _;
use std::sync::Arc;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::UnboundedSender;
use tokio_util::sync::CancellationToken;

use stowage_platform::{
    CommandOutcome, CommandRunner, CommandSpec, OsInfo, PathLocator, SystemRunner, ToolLocator,
};

use crate::fetch::{FetchError, Fetcher, HttpFetcher};
use crate::hooks::{HookOutcome, PostInstallHook};
use crate::result::{InstallDetails, InstallResult};
use crate::strategy::{InstallStep, StepTimeouts, manual_instructions, plan_for};

const PERMISSION_MARKERS: [&str; 6] = [
    "a password is required",
    "not in the sudoers",
    "permission denied",
    "are you root",
    "must be root",
    "operation not permitted",
];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallProgress {
    pub tool: String,
    pub percent: u8,
    pub line: String,
}

pub type ProgressSink = UnboundedSender<InstallProgress>;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstallReport {
    pub result: InstallResult,
    pub hook: Option<HookOutcome>,
}

#[derive(Clone)]
pub struct Installer {
    runner: Arc<dyn CommandRunner>,
    locator: Arc<dyn ToolLocator>,
    fetcher: Arc<dyn Fetcher>,
    os: OsInfo,
    timeouts: StepTimeouts,
    hooks: HashMap<String, Arc<dyn PostInstallHook>>,
}

impl Installer {
    #[must_use]
    pub fn new(os: OsInfo) -> Self {
        Self {
            runner: Arc::new(SystemRunner),
            locator: Arc::new(PathLocator),
            fetcher: Arc::new(HttpFetcher::default()),
            os,
            timeouts: StepTimeouts::default(),
            hooks: HashMap::new(),
        }
    }

    #[must_use]
    pub fn with_runner(mut self, runner: Arc<dyn CommandRunner>) -> Self {
        self.runner = runner;
        self
    }

    #[must_use]
    pub fn with_locator(mut self, locator: Arc<dyn ToolLocator>) -> Self {
        self.locator = locator;
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn Fetcher>) -> Self {
        self.fetcher = fetcher;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, timeouts: StepTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    #[must_use]
    pub fn with_hook(mut self, tool: &str, hook: Arc<dyn PostInstallHook>) -> Self {
        self.hooks.insert(tool.to_string(), hook);
        self
    }

    #[must_use]
    pub fn os(&self) -> &OsInfo {
        &self.os
    }

    #[must_use]
    pub fn check_installed(&self, tool: &str) -> bool {
        self.locator.is_installed(tool)
    }

    #[must_use]
    pub fn missing<'a, I>(&self, tools: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a String>,
    {
        tools
            .into_iter()
            .filter(|tool| !self.check_installed(tool))
            .cloned()
            .collect()
    }

    pub async fn install(&self, tool: &str, progress: Option<&ProgressSink>) -> InstallResult {
        self.run_plan(tool, progress, None)
            .await
            .unwrap_or_else(|| stopped(tool))
    }

    /// Install and, after a fresh successful install, run the tool's
    /// post-install hook.
    pub async fn install_with_hooks(
        &self,
        tool: &str,
        progress: Option<&ProgressSink>,
    ) -> InstallReport {
        self.install_inner(tool, progress, None)
            .await
            .unwrap_or_else(|| InstallReport {
                result: stopped(tool),
                hook: None,
            })
    }

    /// Like [`Installer::install_with_hooks`], but `stop` is checked before
    /// every step and before the hook. A step that already started runs to
    /// completion. `None` when the run stopped early.
    pub async fn install_until(
        &self,
        tool: &str,
        progress: Option<&ProgressSink>,
        stop: &CancellationToken,
    ) -> Option<InstallReport> {
        self.install_inner(tool, progress, Some(stop)).await
    }

    async fn install_inner(
        &self,
        tool: &str,
        progress: Option<&ProgressSink>,
        stop: Option<&CancellationToken>,
    ) -> Option<InstallReport> {
        let result = self.run_plan(tool, progress, stop).await?;
        let hook = match (&result, self.hooks.get(tool)) {
            (InstallResult::Success(_), Some(_)) if is_stopped(stop) => {
                info!("Skipping post-install hook for {tool}: installation was cancelled");
                None
            }
            (InstallResult::Success(_), Some(hook)) => {
                info!("Running post-install hook for {tool}");
                Some(hook.run(progress).await)
            }
            _ => None,
        };
        Some(InstallReport { result, hook })
    }

    async fn run_plan(
        &self,
        tool: &str,
        progress: Option<&ProgressSink>,
        stop: Option<&CancellationToken>,
    ) -> Option<InstallResult> {
        if self.check_installed(tool) {
            debug!("{tool} already present, nothing to install");
            report(progress, tool, 100, format!("{tool} is already installed"));
            return Some(InstallResult::AlreadyInstalled(InstallDetails::default()));
        }

        let Some(plan) = plan_for(tool, &self.os, &self.timeouts) else {
            warn!(
                "No installation strategy for {tool} on {} ({})",
                self.os.display_name(),
                self.os.family
            );
            return Some(InstallResult::UnsupportedOs(InstallDetails::message(format!(
                "Automatic installation is not available on {}. {}",
                self.os.display_name(),
                manual_instructions(tool)
            ))));
        };

        info!("Installing {tool} in {} steps", plan.steps.len());
        let total = plan.steps.len();

        for (index, step) in plan.steps.iter().enumerate() {
            if is_stopped(stop) {
                info!("Installing {tool} stopped before `{}`", step.description());
                return None;
            }
            report(progress, tool, percent(index, total), format!("{}...", step.description()));

            if let Err(failure) = self.run_step(tool, step, progress).await {
                error!("Installing {tool} stopped at `{}`: {failure}", step.description());
                return Some(failure);
            }
        }

        if !self.check_installed(tool) {
            error!("{tool} installation reported success but the binary is not on PATH");
            return Some(InstallResult::Failed(InstallDetails::message(format!(
                "{tool} was installed but not found on PATH"
            ))));
        }

        report(progress, tool, 100, format!("{tool} installed"));
        Some(InstallResult::Success(InstallDetails::message(format!(
            "{tool} installed"
        ))))
    }

    async fn run_step(
        &self,
        tool: &str,
        step: &InstallStep,
        progress: Option<&ProgressSink>,
    ) -> Result<(), InstallResult> {
        match step {
            InstallStep::Run {
                description,
                command,
            } => self.run_command(tool, description, command, progress).await,
            InstallStep::Fetch {
                description,
                url,
                destination,
            } => {
                let bytes = self.fetcher.fetch(url).await.map_err(|error| match error {
                    FetchError::Timeout { .. } => InstallResult::Timeout(InstallDetails::message(
                        format!("{description}: {error}"),
                    )),
                    other => InstallResult::Failed(InstallDetails::message(format!(
                        "{description}: {other}"
                    ))),
                })?;

                let staged = stage(&bytes).map_err(|error| {
                    InstallResult::Failed(InstallDetails::message(format!(
                        "{description}: could not stage download: {error}"
                    )))
                })?;

                let command = CommandSpec::new("install", self.timeouts.quick)
                    .args(["-m", "0644"])
                    .arg(staged.path().to_string_lossy())
                    .arg(destination.as_str())
                    .privileged();
                self.run_command(tool, description, &command, progress).await
            }
        }
    }

    async fn run_command(
        &self,
        tool: &str,
        description: &str,
        command: &CommandSpec,
        progress: Option<&ProgressSink>,
    ) -> Result<(), InstallResult> {
        let outcome = self.runner.run(command).await;

        if let CommandOutcome::Completed(output) = &outcome {
            for line in output.stdout.lines().chain(output.stderr.lines()) {
                if !line.trim().is_empty() {
                    report(progress, tool, u8::MAX, line.to_string());
                }
            }
        }

        match outcome {
            CommandOutcome::Completed(output) if output.success() => Ok(()),
            CommandOutcome::Completed(output) => {
                let details = InstallDetails::message(format!(
                    "{description} failed ({})",
                    command.display()
                ))
                .with_output(output.stderr.clone());
                if looks_like_permission_problem(&output.combined()) {
                    Err(InstallResult::PermissionError(details))
                } else {
                    Err(InstallResult::Failed(details))
                }
            }
            CommandOutcome::TimedOut { after } => Err(InstallResult::Timeout(
                InstallDetails::message(format!(
                    "{description} timed out after {}s",
                    after.as_secs()
                )),
            )),
            CommandOutcome::SpawnFailed { kind, message } => {
                let details =
                    InstallDetails::message(format!("{description}: could not start: {message}"));
                if kind == std::io::ErrorKind::PermissionDenied {
                    Err(InstallResult::PermissionError(details))
                } else {
                    Err(InstallResult::Failed(details))
                }
            }
        }
    }
}

fn is_stopped(stop: Option<&CancellationToken>) -> bool {
    stop.is_some_and(CancellationToken::is_cancelled)
}

fn stopped(tool: &str) -> InstallResult {
    InstallResult::Failed(InstallDetails::message(format!(
        "Installing {tool} was cancelled"
    )))
}

fn stage(bytes: &[u8]) -> std::io::Result<tempfile::NamedTempFile> {
    let mut file = tempfile::NamedTempFile::new()?;
    file.write_all(bytes)?;
    file.flush()?;
    Ok(file)
}

fn looks_like_permission_problem(output: &str) -> bool {
    let lowered = output.to_ascii_lowercase();
    PERMISSION_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

#[allow(clippy::cast_possible_truncation)]
fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    ((done * 100) / total).min(100) as u8
}

/// `u8::MAX` marks a log line that carries no new percentage.
fn report(progress: Option<&ProgressSink>, tool: &str, percent: u8, line: String) {
    if let Some(sink) = progress {
        let _ = sink.send(InstallProgress {
            tool: tool.to_string(),
            percent,
            line,
        });
    }
}
