//! Presentation strings. Only what the operator reads is translated; log
//! output, configuration values and backend arguments stay in English.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Language {
    #[default]
    En,
    De,
}

impl Language {
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::En => "en",
            Self::De => "de",
        }
    }

    /// Parse a language code or locale such as `de`, `de_AT.UTF-8` or `en-US`.
    #[must_use]
    pub fn from_locale(value: &str) -> Option<Self> {
        let primary = value
            .split(['_', '-', '.', '@'])
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();
        match primary.as_str() {
            "en" => Some(Self::En),
            "de" => Some(Self::De),
            _ => None,
        }
    }

    /// `--lang` wins, then the usual locale variables in POSIX precedence,
    /// then the saved preference.
    pub fn resolve<F>(flag: Option<&str>, env: F, saved: Option<&str>) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(language) = flag.and_then(Self::from_locale) {
            return language;
        }
        for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
            // The first variable that is set decides, even if it names a
            // language without translations.
            if let Some(value) = env(var).filter(|value| !value.is_empty()) {
                return Self::from_locale(&value).unwrap_or_default();
            }
        }
        saved.and_then(Self::from_locale).unwrap_or_default()
    }

    #[must_use]
    pub fn from_environment(flag: Option<&str>, saved: Option<&str>) -> Self {
        Self::resolve(flag, |var| std::env::var(var).ok(), saved)
    }

    #[must_use]
    pub const fn text(self, key: Text) -> &'static str {
        match self {
            Self::En => english(key),
            Self::De => german(key),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    Title,
    Welcome,
    ChooseBackend,
    ChooseAction,
    DependencyCheck,
    AllToolsPresent,
    MissingTools,
    InstallMissing,
    Installing,
    SkipMissing,
    SkipWarning,
    Reload,
    AuthenticateAt,
    Configuration,
    SearchingPeers,
    ConnectionRequired,
    Connect,
    ChoosePeer,
    NoPeers,
    EnterSettings,
    TestConnection,
    ConnectionOk,
    ConnectionFailed,
    Summary,
    Save,
    Saved,
    Continue,
    Back,
    Cancel,
    Cancelled,
    WaitingForStep,
    Offline,
}

const fn english(key: Text) -> &'static str {
    match key {
        Text::Title => "stowage: backup destination setup",
        Text::Welcome => {
            "This wizard sets up where your backups are stored. Nothing is written until you save at the end."
        }
        Text::ChooseBackend => "Where should backups be stored?",
        Text::ChooseAction => "What next?",
        Text::DependencyCheck => "Required tools",
        Text::AllToolsPresent => "All required tools are installed.",
        Text::MissingTools => "Missing tools",
        Text::InstallMissing => "Install missing tools",
        Text::Installing => "Installing",
        Text::SkipMissing => "Continue without installing",
        Text::SkipWarning => "Continuing with missing tools. The destination may not work.",
        Text::Reload => "I have signed in, check again",
        Text::AuthenticateAt => "Open this URL to sign in to Tailscale:",
        Text::Configuration => "Destination settings",
        Text::SearchingPeers => "Looking for Tailscale peers",
        Text::ConnectionRequired => "This machine is not connected to Tailscale.",
        Text::Connect => "Connect to Tailscale",
        Text::ChoosePeer => "Which peer should store the backups?",
        Text::NoPeers => "No peers found in your tailnet.",
        Text::EnterSettings => "Enter settings",
        Text::TestConnection => "Test connection",
        Text::ConnectionOk => "Connection test succeeded.",
        Text::ConnectionFailed => {
            "Connection test failed. You can still continue, but backups may fail."
        }
        Text::Summary => "Summary",
        Text::Save => "Save configuration",
        Text::Saved => "Configuration saved to",
        Text::Continue => "Continue",
        Text::Back => "Back",
        Text::Cancel => "Cancel",
        Text::Cancelled => "Setup cancelled. Nothing was saved.",
        Text::WaitingForStep => "Waiting for the running step to finish.",
        Text::Offline => "offline",
    }
}

const fn german(key: Text) -> &'static str {
    match key {
        Text::Title => "stowage: Backup-Ziel einrichten",
        Text::Welcome => {
            "Dieser Assistent legt fest, wo Ihre Backups gespeichert werden. Erst am Ende wird etwas gespeichert."
        }
        Text::ChooseBackend => "Wo sollen Backups gespeichert werden?",
        Text::ChooseAction => "Wie weiter?",
        Text::DependencyCheck => "Benötigte Programme",
        Text::AllToolsPresent => "Alle benötigten Programme sind installiert.",
        Text::MissingTools => "Fehlende Programme",
        Text::InstallMissing => "Fehlende Programme installieren",
        Text::Installing => "Installiere",
        Text::SkipMissing => "Ohne Installation fortfahren",
        Text::SkipWarning => {
            "Es fehlen Programme. Das Backup-Ziel funktioniert möglicherweise nicht."
        }
        Text::Reload => "Angemeldet, erneut prüfen",
        Text::AuthenticateAt => "Öffnen Sie diese URL, um sich bei Tailscale anzumelden:",
        Text::Configuration => "Einstellungen des Backup-Ziels",
        Text::SearchingPeers => "Suche Tailscale-Geräte",
        Text::ConnectionRequired => "Dieser Rechner ist nicht mit Tailscale verbunden.",
        Text::Connect => "Mit Tailscale verbinden",
        Text::ChoosePeer => "Welches Gerät soll die Backups speichern?",
        Text::NoPeers => "Keine Geräte im Tailnet gefunden.",
        Text::EnterSettings => "Einstellungen eingeben",
        Text::TestConnection => "Verbindung testen",
        Text::ConnectionOk => "Verbindungstest erfolgreich.",
        Text::ConnectionFailed => {
            "Verbindungstest fehlgeschlagen. Sie können fortfahren, Backups könnten aber scheitern."
        }
        Text::Summary => "Zusammenfassung",
        Text::Save => "Konfiguration speichern",
        Text::Saved => "Konfiguration gespeichert unter",
        Text::Continue => "Weiter",
        Text::Back => "Zurück",
        Text::Cancel => "Abbrechen",
        Text::Cancelled => "Einrichtung abgebrochen. Es wurde nichts gespeichert.",
        Text::WaitingForStep => "Warte, bis der laufende Schritt beendet ist.",
        Text::Offline => "offline",
    }
}
