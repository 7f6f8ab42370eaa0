use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use log::{info, warn};

use stowage_core::{HookOutcome, InstallProgress, PostInstallHook, ProgressSink};
use stowage_platform::{
    CommandOutcome, CommandRunner, CommandSpec, LineControl, StreamOutcome, SystemRunner,
};

const UP_TIMEOUT: Duration = Duration::from_secs(60);
const SET_TIMEOUT: Duration = Duration::from_secs(30);

/// Links `tailscale up` prints in warnings. They never sign anyone in.
const DOC_PREFIXES: [&str; 2] = ["https://tailscale.com/kb/", "https://tailscale.com/s/"];

/// The first login URL in a line of `tailscale up` output, verbatim. Custom
/// control servers (headscale) print their own host, so any https link that
/// is not a documentation link counts.
#[must_use]
pub fn extract_auth_url(line: &str) -> Option<String> {
    line.split_whitespace()
        .find(|word| {
            word.starts_with("https://") && !DOC_PREFIXES.iter().any(|doc| word.starts_with(doc))
        })
        .map(ToString::to_string)
}

/// Brings the mesh network up after Tailscale was installed.
#[derive(Clone)]
pub struct TailscaleConnectHook {
    runner: Arc<dyn CommandRunner>,
    operator: Option<String>,
}

impl Default for TailscaleConnectHook {
    fn default() -> Self {
        Self::new(Arc::new(SystemRunner))
    }
}

impl TailscaleConnectHook {
    #[must_use]
    pub fn new(runner: Arc<dyn CommandRunner>) -> Self {
        let operator = std::env::var("SUDO_USER")
            .or_else(|_| std::env::var("USER"))
            .ok()
            .filter(|user| !user.is_empty() && user != "root");
        Self { runner, operator }
    }

    #[must_use]
    pub fn with_operator(mut self, operator: Option<String>) -> Self {
        self.operator = operator;
        self
    }

    /// Run `tailscale up`, surfacing a login URL as soon as it is printed.
    pub async fn connect(&self, progress: Option<&ProgressSink>) -> HookOutcome {
        let spec = CommandSpec::new("tailscale", UP_TIMEOUT)
            .arg("up")
            .privileged();
        let auth_url: Mutex<Option<String>> = Mutex::new(None);

        let on_line = |line: &str| {
            if let Some(sink) = progress {
                let _ = sink.send(InstallProgress {
                    tool: "tailscale".to_string(),
                    percent: u8::MAX,
                    line: line.to_string(),
                });
            }
            match extract_auth_url(line) {
                Some(url) => {
                    *auth_url.lock().unwrap_or_else(PoisonError::into_inner) = Some(url);
                    LineControl::Detach
                }
                None => LineControl::Continue,
            }
        };

        let outcome = self.runner.stream(&spec, &on_line).await;
        let url = auth_url
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner);

        match (outcome, url) {
            (_, Some(url)) => {
                info!("Tailscale needs authentication at {url}");
                HookOutcome::PendingAuth { url }
            }
            (StreamOutcome::Finished(outcome), None) if outcome.succeeded() => {
                self.assign_operator().await;
                HookOutcome::Ready
            }
            (StreamOutcome::Finished(outcome), None) => {
                warn!("tailscale up failed: {}", outcome.describe());
                HookOutcome::Failed {
                    message: match outcome {
                        CommandOutcome::Completed(output) => output.combined(),
                        other => other.describe(),
                    },
                }
            }
            (StreamOutcome::Detached, None) => HookOutcome::Failed {
                message: "tailscale up stopped reporting without a result".to_string(),
            },
        }
    }

    /// Let the invoking user manage Tailscale without sudo. Best effort.
    async fn assign_operator(&self) {
        let Some(operator) = &self.operator else {
            return;
        };
        let spec = CommandSpec::new("tailscale", SET_TIMEOUT)
            .arg("set")
            .arg(format!("--operator={operator}"))
            .privileged();
        let outcome = self.runner.run(&spec).await;
        if !outcome.succeeded() {
            warn!("Could not set tailscale operator to {operator}: {}", outcome.describe());
        }
    }
}

#[async_trait]
impl PostInstallHook for TailscaleConnectHook {
    async fn run(&self, progress: Option<&ProgressSink>) -> HookOutcome {
        self.connect(progress).await
    }
}
