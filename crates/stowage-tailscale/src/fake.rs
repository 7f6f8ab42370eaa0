use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use stowage_platform::{CommandOutcome, CommandOutput, CommandRunner, CommandSpec};

/// Replies to commands whose `program args...` line starts with a scripted
/// prefix. Unmatched commands fail with exit code 1.
#[derive(Default)]
pub(crate) struct FakeRunner {
    replies: Vec<(String, CommandOutcome)>,
    pub(crate) calls: Mutex<Vec<String>>,
}

impl FakeRunner {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn ok(self, prefix: &str, stdout: &str) -> Self {
        self.reply(prefix, Some(0), stdout, "")
    }

    pub(crate) fn fail(self, prefix: &str, stderr: &str) -> Self {
        self.reply(prefix, Some(1), "", stderr)
    }

    pub(crate) fn time_out(mut self, prefix: &str) -> Self {
        self.replies.push((
            prefix.to_string(),
            CommandOutcome::TimedOut {
                after: Duration::from_secs(5),
            },
        ));
        self
    }

    pub(crate) fn reply(mut self, prefix: &str, code: Option<i32>, stdout: &str, stderr: &str) -> Self {
        self.replies.push((
            prefix.to_string(),
            CommandOutcome::Completed(CommandOutput {
                code,
                stdout: stdout.to_string(),
                stderr: stderr.to_string(),
            }),
        ));
        self
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl CommandRunner for FakeRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        let line = format!("{} {}", spec.program, spec.args.join(" "));
        self.calls.lock().expect("calls lock").push(line.clone());
        self.replies
            .iter()
            .find(|(prefix, _)| line.starts_with(prefix.as_str()))
            .map_or_else(
                || {
                    CommandOutcome::Completed(CommandOutput {
                        code: Some(1),
                        stdout: String::new(),
                        stderr: format!("unexpected: {line}"),
                    })
                },
                |(_, outcome)| outcome.clone(),
            )
    }
}
