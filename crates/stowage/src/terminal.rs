//! Terminal front end for the wizard, drawn with cliclack.
//!
//! Prompts block, so they run inside `block_in_place` and only while no
//! background job is running. Progress from running jobs is printed as it
//! arrives.

use std::io;

use async_trait::async_trait;
use log::{debug, info, warn};

use stowage_backend::{
    BackendError, BackendKind, FieldKind, FieldRequest, FieldValue, Prompter, TailscalePeer,
};

use crate::error::AppError;
use crate::i18n::{Language, Text};
use crate::wizard::{NoticeLevel, Runtime, Screen, Wizard, WizardMessage, WizardStatus};

/// Asks backend fields on the terminal.
#[derive(Debug, Clone, Copy, Default)]
pub struct CliPrompter;

fn prompt_field(request: &FieldRequest) -> io::Result<FieldValue> {
    match &request.kind {
        FieldKind::Text | FieldKind::Path => {
            let mut input = cliclack::input(&request.label).required(request.required);
            if let Some(default) = &request.default {
                input = input.default_input(default);
            }
            input.interact::<String>().map(FieldValue::Text)
        }
        FieldKind::Confirm => cliclack::confirm(&request.label)
            .initial_value(request.default.as_deref() == Some("true"))
            .interact()
            .map(FieldValue::Bool),
        FieldKind::Select { options } => {
            let mut select = cliclack::select(&request.label);
            for option in options {
                select = select.item(
                    option.value.clone(),
                    &option.label,
                    option.hint.as_deref().unwrap_or_default(),
                );
            }
            if let Some(default) = &request.default {
                select = select.initial_value(default.clone());
            }
            select.interact().map(FieldValue::Text)
        }
    }
}

#[async_trait]
impl Prompter for CliPrompter {
    async fn ask(&self, request: &FieldRequest) -> Result<Option<FieldValue>, BackendError> {
        match tokio::task::block_in_place(|| prompt_field(request)) {
            Ok(value) => Ok(Some(value)),
            Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                debug!("Prompt for {} interrupted", request.key);
                Ok(None)
            }
            Err(error) => Err(error.into()),
        }
    }

    fn note(&self, message: &str) {
        let _ = cliclack::log::remark(message);
    }
}

/// What the operator picked from a screen menu.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Choice {
    Backend(BackendKind),
    Peer(String),
    Next,
    Back,
    Cancel,
    Install,
    Skip,
    Reload,
    Connect,
    Collect,
    Test,
    Save,
}

impl Choice {
    fn into_messages(self) -> Vec<WizardMessage> {
        match self {
            Self::Backend(kind) => vec![WizardMessage::SelectBackend(kind), WizardMessage::Next],
            Self::Peer(hostname) => vec![WizardMessage::SelectPeer(hostname)],
            Self::Next => vec![WizardMessage::Next],
            Self::Back => vec![WizardMessage::Back],
            Self::Cancel => vec![WizardMessage::Cancel],
            Self::Install => vec![WizardMessage::InstallMissing],
            Self::Skip => vec![WizardMessage::SkipMissing],
            Self::Reload => vec![WizardMessage::Reload],
            Self::Connect => vec![WizardMessage::Connect],
            Self::Collect => vec![WizardMessage::Collect],
            Self::Test => vec![WizardMessage::TestConnection],
            Self::Save => vec![WizardMessage::Save],
        }
    }
}

fn peer_hint(peer: &TailscalePeer, language: Language) -> String {
    if !peer.online {
        return format!("{} · {}", peer.ip, language.text(Text::Offline));
    }
    let mut hint = format!("{} · {}", peer.ip, peer.os);
    if let Some(latency) = peer.latency_ms {
        hint.push_str(&format!(" · {latency:.0} ms"));
    }
    if let Some(free) = peer.free_space_gb {
        hint.push_str(&format!(" · {free} GB free"));
    }
    hint
}

fn terminal_error(error: io::Error) -> AppError {
    AppError::operation_failed("Terminal interaction", error)
}

pub struct Terminal {
    wizard: Wizard,
    runtime: Runtime,
    opened_url: Option<String>,
}

impl Terminal {
    pub fn new(wizard: Wizard) -> Self {
        Self {
            wizard,
            runtime: Runtime::default(),
            opened_url: None,
        }
    }

    fn text(&self, key: Text) -> &'static str {
        self.wizard.session().language.text(key)
    }

    /// Drive the wizard until the operator saves or cancels.
    pub async fn run(mut self) -> Result<WizardStatus, AppError> {
        cliclack::intro(self.text(Text::Title)).map_err(terminal_error)?;

        loop {
            self.print_notices();
            if !self.wizard.session().is_active() {
                break;
            }

            if !self.runtime.is_idle() {
                tokio::select! {
                    message = self.runtime.next_message() => {
                        if let Some(message) = message {
                            let task = self.wizard.update(message);
                            self.runtime.spawn(task);
                        }
                    }
                    _ = tokio::signal::ctrl_c() => {
                        info!("Interrupted while background work was running");
                        let task = self.wizard.update(WizardMessage::Cancel);
                        self.runtime.spawn(task);
                    }
                }
                continue;
            }

            self.open_pending_auth();
            let messages = match tokio::task::block_in_place(|| self.prompt_screen()) {
                Ok(choice) => choice.into_messages(),
                Err(error) if error.kind() == io::ErrorKind::Interrupted => {
                    vec![WizardMessage::Cancel]
                }
                Err(error) => return Err(terminal_error(error)),
            };
            for message in messages {
                let task = self.wizard.update(message);
                self.runtime.spawn(task);
            }
        }

        if !self.runtime.is_idle() {
            cliclack::log::remark(self.text(Text::WaitingForStep)).map_err(terminal_error)?;
            self.runtime.finish().await;
        }
        let status = self.wizard.session().status.clone();
        let closed = match &status {
            WizardStatus::Completed { saved_to } => {
                cliclack::outro(format!("{} {}", self.text(Text::Saved), saved_to.display()))
            }
            _ => cliclack::outro_cancel(self.text(Text::Cancelled)),
        };
        closed.map_err(terminal_error)?;
        Ok(status)
    }

    fn print_notices(&mut self) {
        for notice in self.wizard.take_notices() {
            let printed = match notice.level {
                NoticeLevel::Info => cliclack::log::info(&notice.text),
                NoticeLevel::Progress => cliclack::log::remark(&notice.text),
                NoticeLevel::Success => cliclack::log::success(&notice.text),
                NoticeLevel::Warning => cliclack::log::warning(&notice.text),
                NoticeLevel::Error => cliclack::log::error(&notice.text),
            };
            if let Err(error) = printed {
                warn!("Failed to print notice: {error}");
            }
        }
    }

    /// Open a sign-in link in the browser once. The link is printed either
    /// way, so failing to open it is not an error.
    fn open_pending_auth(&mut self) {
        let url = self
            .wizard
            .dependencies()
            .pending_auth
            .as_ref()
            .or(self.wizard.configuration().pending_auth.as_ref())
            .cloned();
        let Some(url) = url else {
            return;
        };
        if self.opened_url.as_ref() == Some(&url) {
            return;
        }
        if let Err(error) = open::that(&url) {
            debug!("Could not open {url} in a browser: {error}");
        }
        self.opened_url = Some(url);
    }

    fn prompt_screen(&self) -> io::Result<Choice> {
        match self.wizard.session().screen() {
            Screen::Welcome => self.prompt_welcome(),
            Screen::BackendSelection => self.prompt_backend(),
            Screen::DependencyCheck => self.prompt_dependencies(),
            Screen::BackendConfiguration => self.prompt_configuration(),
            Screen::Completion => self.prompt_completion(),
        }
    }

    fn navigation(&self, select: cliclack::Select<Choice>, back: bool) -> cliclack::Select<Choice> {
        let select = if back {
            select.item(Choice::Back, self.text(Text::Back), "")
        } else {
            select
        };
        select.item(Choice::Cancel, self.text(Text::Cancel), "")
    }

    fn prompt_welcome(&self) -> io::Result<Choice> {
        cliclack::note(self.text(Text::Title), self.text(Text::Welcome))?;
        let select = cliclack::select(self.text(Text::ChooseAction)).item(
            Choice::Next,
            self.text(Text::Continue),
            "",
        );
        self.navigation(select, false).interact()
    }

    fn prompt_backend(&self) -> io::Result<Choice> {
        let mut select = cliclack::select(self.text(Text::ChooseBackend));
        for descriptor in self.wizard.registry().descriptors() {
            select = select.item(
                Choice::Backend(descriptor.kind),
                descriptor.display_name,
                descriptor.description,
            );
        }
        if let Some(kind) = self.wizard.session().selected {
            select = select.initial_value(Choice::Backend(kind));
        }
        self.navigation(select, true).interact()
    }

    fn prompt_dependencies(&self) -> io::Result<Choice> {
        let state = self.wizard.dependencies();
        let mut lines = vec![format!(
            "{}: {}",
            self.text(Text::MissingTools),
            state.missing.join(", ")
        )];
        for (tool, result) in &state.results {
            lines.push(format!("{tool}: {result}"));
        }
        if let Some(url) = &state.pending_auth {
            lines.push(format!("{} {url}", self.text(Text::AuthenticateAt)));
        }
        cliclack::note(self.text(Text::DependencyCheck), lines.join("\n"))?;

        let mut select = cliclack::select(self.text(Text::ChooseAction));
        if state.pending_auth.is_some() {
            select = select.item(Choice::Reload, self.text(Text::Reload), "");
        } else if state.missing.is_empty() {
            select = select.item(Choice::Next, self.text(Text::Continue), "");
        } else {
            select = select.item(
                Choice::Install,
                self.text(Text::InstallMissing),
                state.missing.join(", "),
            );
        }
        if !state.missing.is_empty() || state.pending_auth.is_some() {
            select = select.item(Choice::Skip, self.text(Text::SkipMissing), "");
        }
        self.navigation(select, true).interact()
    }

    fn prompt_configuration(&self) -> io::Result<Choice> {
        let session = self.wizard.session();
        let state = self.wizard.configuration();
        let language = session.language;
        let mesh = session.selected == Some(BackendKind::MeshPeer);

        if let Some(error) = state.discovery_error.as_ref().or(state.setup_error.as_ref()) {
            cliclack::log::error(error)?;
        }

        let mut select = cliclack::select(self.text(Text::ChooseAction));

        if mesh && state.connection_required {
            select = match &state.pending_auth {
                Some(_) => select.item(Choice::Reload, self.text(Text::Reload), ""),
                None => select.item(
                    Choice::Connect,
                    self.text(Text::Connect),
                    self.text(Text::ConnectionRequired),
                ),
            };
            return self.navigation(select, true).interact();
        }

        if mesh && session.selected_peer().is_none() {
            if state.peers.is_empty() {
                cliclack::log::warning(self.text(Text::NoPeers))?;
            }
            let mut peers = cliclack::select(self.text(Text::ChoosePeer));
            for peer in &state.peers {
                peers = peers.item(
                    Choice::Peer(peer.hostname.clone()),
                    &peer.hostname,
                    peer_hint(peer, language),
                );
            }
            peers = peers.item(Choice::Reload, self.text(Text::Reload), "");
            return self.navigation(peers, true).interact();
        }

        let mut lines = Vec::new();
        if let Some(peer) = session.selected_peer() {
            lines.push(format!("{} ({})", peer.hostname, peer_hint(peer, language)));
        }
        if let Some(draft) = session.draft() {
            lines.push(draft.repository_path.clone());
        }
        if let Some(report) = &state.validation {
            lines.extend(report.errors.iter().cloned());
        }
        match state.test_passed {
            Some(true) => lines.push(self.text(Text::ConnectionOk).to_string()),
            Some(false) => lines.push(self.text(Text::ConnectionFailed).to_string()),
            None => {}
        }
        if !lines.is_empty() {
            cliclack::note(self.text(Text::Configuration), lines.join("\n"))?;
        }

        let complete = self.wizard.is_complete();
        if complete {
            select = select.item(Choice::Next, self.text(Text::Continue), "");
        }
        select = select.item(Choice::Collect, self.text(Text::EnterSettings), "");
        if complete {
            select = select.item(Choice::Test, self.text(Text::TestConnection), "");
        }
        if mesh {
            select = select.item(Choice::Reload, self.text(Text::ChoosePeer), "");
        }
        self.navigation(select, true).interact()
    }

    fn prompt_completion(&self) -> io::Result<Choice> {
        let session = self.wizard.session();
        if let (Some(plugin), Some(draft)) = (self.wizard.plugin(), session.draft()) {
            let summary = format!(
                "{}\n{}\n{}",
                plugin.descriptor().display_name,
                draft.repository_path,
                plugin.build_invocation_args(draft).join(" ")
            );
            cliclack::note(self.text(Text::Summary), summary)?;
        }

        let select = cliclack::select(self.text(Text::ChooseAction)).item(
            Choice::Save,
            self.text(Text::Save),
            "",
        );
        self.navigation(select, true).interact()
    }
}

#[cfg(test)]
mod tests {
    use stowage_backend::{BackendKind, TailscalePeer};

    use super::{Choice, peer_hint};
    use crate::i18n::Language;
    use crate::wizard::WizardMessage;

    #[test]
    fn choosing_a_backend_selects_and_advances() {
        let messages = Choice::Backend(BackendKind::MeshPeer).into_messages();

        assert!(matches!(
            messages.as_slice(),
            [
                WizardMessage::SelectBackend(BackendKind::MeshPeer),
                WizardMessage::Next
            ]
        ));
    }

    #[test]
    fn peer_hints_show_what_was_measured() {
        let mut peer = TailscalePeer::new("nas", "100.64.0.5", true);
        peer.os = "linux".to_string();
        assert_eq!(peer_hint(&peer, Language::En), "100.64.0.5 · linux");

        peer.latency_ms = Some(3.6);
        peer.free_space_gb = Some(812);
        assert_eq!(
            peer_hint(&peer, Language::En),
            "100.64.0.5 · linux · 4 ms · 812 GB free"
        );

        peer.online = false;
        assert!(peer_hint(&peer, Language::De).starts_with("100.64.0.5 · "));
    }
}
