use std::collections::BTreeMap;
use std::path::PathBuf;

use tokio_util::sync::CancellationToken;

use stowage_backend::{BackendConfig, BackendKind, TailscalePeer, ValidationReport};
use stowage_core::InstallResult;

use crate::i18n::Language;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Welcome,
    BackendSelection,
    DependencyCheck,
    BackendConfiguration,
    Completion,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WizardStatus {
    Active,
    Completed { saved_to: PathBuf },
    Cancelled,
}

/// Everything the operator has decided so far. Drafts are kept per kind so
/// switching destinations and coming back never loses entered values.
#[derive(Debug)]
pub struct WizardSession {
    history: Vec<Screen>,
    pub language: Language,
    pub debug: bool,
    pub selected: Option<BackendKind>,
    pub drafts: BTreeMap<BackendKind, BackendConfig>,
    pub selected_peers: BTreeMap<BackendKind, TailscalePeer>,
    pub status: WizardStatus,
}

impl WizardSession {
    pub fn new(language: Language, debug: bool) -> Self {
        Self {
            history: vec![Screen::Welcome],
            language,
            debug,
            selected: None,
            drafts: BTreeMap::new(),
            selected_peers: BTreeMap::new(),
            status: WizardStatus::Active,
        }
    }

    pub fn screen(&self) -> Screen {
        self.history.last().copied().unwrap_or(Screen::Welcome)
    }

    pub fn history(&self) -> &[Screen] {
        &self.history
    }

    pub(super) fn push(&mut self, screen: Screen) {
        self.history.push(screen);
    }

    /// Returns `false` on the first screen.
    pub(super) fn pop(&mut self) -> bool {
        if self.history.len() > 1 {
            self.history.pop();
            true
        } else {
            false
        }
    }

    pub fn draft(&self) -> Option<&BackendConfig> {
        self.selected.and_then(|kind| self.drafts.get(&kind))
    }

    pub fn selected_peer(&self) -> Option<&TailscalePeer> {
        self.selected.and_then(|kind| self.selected_peers.get(&kind))
    }

    pub fn is_active(&self) -> bool {
        self.status == WizardStatus::Active
    }
}

/// Guards one kind of background job against being started twice and lets
/// late results be recognized.
#[derive(Debug, Clone, Default)]
pub enum JobState {
    #[default]
    Idle,
    Running {
        token: CancellationToken,
        seq: u64,
    },
    Done,
}

impl JobState {
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Running { .. })
    }

    pub(super) fn accepts(&self, seq: u64) -> bool {
        matches!(self, Self::Running { seq: current, .. } if *current == seq)
    }

    pub(super) fn current_seq(&self) -> Option<u64> {
        match self {
            Self::Running { seq, .. } => Some(*seq),
            _ => None,
        }
    }

    pub(super) fn cancel(&mut self) {
        if let Self::Running { token, .. } = self {
            token.cancel();
        }
        *self = Self::Idle;
    }
}

#[derive(Debug, Default)]
pub struct DependencyState {
    pub missing: Vec<String>,
    pub results: BTreeMap<String, InstallResult>,
    pub install: JobState,
    pub reload: JobState,
    /// Latest progress per tool: percent and the line that came with it.
    pub progress: BTreeMap<String, (u8, String)>,
    pub pending_auth: Option<String>,
    pub hook_error: Option<String>,
    pub skipped: bool,
}

impl DependencyState {
    pub fn can_continue(&self) -> bool {
        (self.missing.is_empty() || self.skipped) && self.pending_auth.is_none()
    }
}

#[derive(Debug, Default)]
pub struct ConfigurationState {
    pub discovery: JobState,
    pub peers: Vec<TailscalePeer>,
    pub connection_required: bool,
    pub discovery_error: Option<String>,
    pub connect: JobState,
    pub pending_auth: Option<String>,
    pub setup: JobState,
    pub setup_error: Option<String>,
    pub validation: Option<ValidationReport>,
    pub test: JobState,
    pub test_passed: Option<bool>,
    pub tested_at: Option<chrono::DateTime<chrono::Utc>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Progress,
    Success,
    Warning,
    Error,
}

/// Something the operator should be told once, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn new(level: NoticeLevel, text: impl Into<String>) -> Self {
        Self {
            level,
            text: text.into(),
        }
    }
}
