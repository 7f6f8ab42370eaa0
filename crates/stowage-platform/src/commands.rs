use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use log::{debug, trace, warn};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub timeout: Duration,
    pub privileged: bool,
}

impl CommandSpec {
    #[must_use]
    pub fn new(program: impl Into<String>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            timeout,
            privileged: false,
        }
    }

    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Run through `sudo -n` unless the process is already root.
    #[must_use]
    pub fn privileged(mut self) -> Self {
        self.privileged = true;
        self
    }

    #[must_use]
    pub fn argv(&self, as_root: bool) -> (String, Vec<String>) {
        if self.privileged && !as_root {
            let mut args = vec!["-n".to_string(), self.program.clone()];
            args.extend(self.args.iter().cloned());
            ("sudo".to_string(), args)
        } else {
            (self.program.clone(), self.args.clone())
        }
    }

    #[must_use]
    pub fn display(&self) -> String {
        let (program, args) = self.argv(is_root());
        if args.is_empty() {
            program
        } else {
            format!("{program} {}", args.join(" "))
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    #[must_use]
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    #[must_use]
    pub fn combined(&self) -> String {
        match (self.stdout.trim(), self.stderr.trim()) {
            ("", err) => err.to_string(),
            (out, "") => out.to_string(),
            (out, err) => format!("{out}\n{err}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandOutcome {
    Completed(CommandOutput),
    TimedOut {
        after: Duration,
    },
    SpawnFailed {
        kind: std::io::ErrorKind,
        message: String,
    },
}

impl CommandOutcome {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        matches!(self, Self::Completed(output) if output.success())
    }

    /// Stdout of a successful run.
    #[must_use]
    pub fn stdout(&self) -> Option<&str> {
        match self {
            Self::Completed(output) if output.success() => Some(&output.stdout),
            _ => None,
        }
    }

    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Completed(output) if output.success() => "completed".to_string(),
            Self::Completed(output) => {
                let code = output
                    .code
                    .map_or_else(|| "signal".to_string(), |c| c.to_string());
                format!("exit status {code}: {}", output.combined())
            }
            Self::TimedOut { after } => format!("timed out after {}s", after.as_secs()),
            Self::SpawnFailed { message, .. } => format!("could not start: {message}"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineControl {
    Continue,
    /// Stop watching; the process keeps running in the background.
    Detach,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    Finished(CommandOutcome),
    Detached,
}

pub type LineHandler<'a> = &'a (dyn Fn(&str) -> LineControl + Send + Sync);

#[async_trait]
pub trait CommandRunner: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> CommandOutcome;

    /// Run `spec` and hand every output line to `on_line` as it arrives.
    ///
    /// The provided implementation replays the captured output after the
    /// command finished, which is enough for scripted runners.
    async fn stream(&self, spec: &CommandSpec, on_line: LineHandler<'_>) -> StreamOutcome {
        let outcome = self.run(spec).await;
        if let CommandOutcome::Completed(output) = &outcome {
            for line in output.stdout.lines().chain(output.stderr.lines()) {
                if on_line(line) == LineControl::Detach {
                    return StreamOutcome::Detached;
                }
            }
        }
        StreamOutcome::Finished(outcome)
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemRunner;

#[async_trait]
impl CommandRunner for SystemRunner {
    async fn run(&self, spec: &CommandSpec) -> CommandOutcome {
        let (program, args) = spec.argv(is_root());
        debug!("Running command: {program} {}", args.join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        match tokio::time::timeout(spec.timeout, cmd.output()).await {
            Err(_) => {
                warn!(
                    "Command timed out after {}s: {program}",
                    spec.timeout.as_secs()
                );
                CommandOutcome::TimedOut {
                    after: spec.timeout,
                }
            }
            Ok(Err(error)) => {
                warn!("Failed to spawn {program}: {error}");
                CommandOutcome::SpawnFailed {
                    kind: error.kind(),
                    message: error.to_string(),
                }
            }
            Ok(Ok(output)) => {
                let output = CommandOutput {
                    code: output.status.code(),
                    stdout: String::from_utf8_lossy(&output.stdout).to_string(),
                    stderr: String::from_utf8_lossy(&output.stderr).to_string(),
                };
                debug!("{program} exited with {:?}", output.code);
                trace!("{program} stdout: {}", output.stdout);
                if !output.stderr.is_empty() {
                    trace!("{program} stderr: {}", output.stderr);
                }
                CommandOutcome::Completed(output)
            }
        }
    }

    async fn stream(&self, spec: &CommandSpec, on_line: LineHandler<'_>) -> StreamOutcome {
        let (program, args) = spec.argv(is_root());
        debug!("Streaming command: {program} {}", args.join(" "));

        let mut cmd = Command::new(&program);
        cmd.args(&args)
            .envs(spec.envs.iter().map(|(k, v)| (k.as_str(), v.as_str())))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = match cmd.spawn() {
            Ok(child) => child,
            Err(error) => {
                warn!("Failed to spawn {program}: {error}");
                return StreamOutcome::Finished(CommandOutcome::SpawnFailed {
                    kind: error.kind(),
                    message: error.to_string(),
                });
            }
        };

        let (tx, mut rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, false, tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, true, tx);
        } else {
            drop(tx);
        }

        let mut stdout = String::new();
        let mut stderr = String::new();
        let deadline = tokio::time::sleep(spec.timeout);
        tokio::pin!(deadline);

        loop {
            tokio::select! {
                line = rx.recv() => {
                    let Some((is_stderr, line)) = line else { break };
                    trace!("{program}: {line}");
                    let buffer = if is_stderr { &mut stderr } else { &mut stdout };
                    buffer.push_str(&line);
                    buffer.push('\n');

                    if on_line(&line) == LineControl::Detach {
                        debug!("Detached from {program}, leaving it running");
                        let until = deadline.deadline();
                        let timeout = spec.timeout;
                        tokio::spawn(async move {
                            let exited = tokio::time::timeout_at(until, async {
                                while let Some((_, line)) = rx.recv().await {
                                    trace!("{program} (detached): {line}");
                                }
                                child.wait().await
                            })
                            .await;
                            if exited.is_err() {
                                warn!(
                                    "Detached {program} still running after {}s, stopping it",
                                    timeout.as_secs()
                                );
                                let _ = child.kill().await;
                            }
                        });
                        return StreamOutcome::Detached;
                    }
                }
                () = &mut deadline => {
                    warn!("Command timed out after {}s: {program}", spec.timeout.as_secs());
                    let _ = child.kill().await;
                    return StreamOutcome::Finished(CommandOutcome::TimedOut { after: spec.timeout });
                }
            }
        }

        tokio::select! {
            status = child.wait() => StreamOutcome::Finished(match status {
                Ok(status) => CommandOutcome::Completed(CommandOutput {
                    code: status.code(),
                    stdout,
                    stderr,
                }),
                Err(error) => CommandOutcome::SpawnFailed {
                    kind: error.kind(),
                    message: error.to_string(),
                },
            }),
            () = &mut deadline => {
                let _ = child.kill().await;
                StreamOutcome::Finished(CommandOutcome::TimedOut { after: spec.timeout })
            }
        }
    }
}

fn forward_lines<R>(reader: R, is_stderr: bool, tx: mpsc::UnboundedSender<(bool, String)>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(reader).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send((is_stderr, line)).is_err() {
                break;
            }
        }
    });
}

/// Hand the terminal over to an interactive program and wait for it to exit.
///
/// # Errors
/// Returns an error if the program cannot be started.
pub async fn run_interactive(program: &str, args: &[&str]) -> std::io::Result<bool> {
    debug!("Launching interactive command: {program} {}", args.join(" "));
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;
    Ok(status.success())
}

#[must_use]
pub fn is_root() -> bool {
    effective_uid() == Some(0)
}

#[must_use]
pub fn effective_uid() -> Option<u32> {
    std::fs::read_to_string("/proc/self/status")
        .ok()
        .and_then(|status| parse_effective_uid(&status))
}

fn parse_effective_uid(status: &str) -> Option<u32> {
    status
        .lines()
        .find_map(|line| line.strip_prefix("Uid:"))
        .and_then(|ids| ids.split_whitespace().nth(1))
        .and_then(|euid| euid.parse().ok())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::{
        CommandOutcome, CommandOutput, CommandRunner, CommandSpec, LineControl, StreamOutcome,
        SystemRunner,
    };
    use super::parse_effective_uid;

    #[test]
    fn privileged_spec_prefixes_noninteractive_sudo() {
        let spec = CommandSpec::new("apt-get", Duration::from_secs(60))
            .args(["install", "-y", "rclone"])
            .privileged();

        let (program, args) = spec.argv(false);
        assert_eq!(program, "sudo");
        assert_eq!(args, vec!["-n", "apt-get", "install", "-y", "rclone"]);

        let (program, args) = spec.argv(true);
        assert_eq!(program, "apt-get");
        assert_eq!(args, vec!["install", "-y", "rclone"]);
    }

    #[test]
    fn parse_effective_uid_reads_second_column() {
        let status = "Name:\tcat\nUid:\t1000\t0\t1000\t1000\nGid:\t1000\t1000\t1000\t1000\n";
        assert_eq!(parse_effective_uid(status), Some(0));
        assert_eq!(parse_effective_uid("Name:\tcat\n"), None);
    }

    #[test]
    fn combined_output_joins_non_empty_streams() {
        let output = CommandOutput {
            code: Some(1),
            stdout: "partial\n".to_string(),
            stderr: "E: broken\n".to_string(),
        };
        assert_eq!(output.combined(), "partial\nE: broken");

        let only_err = CommandOutput {
            code: Some(1),
            stdout: String::new(),
            stderr: "denied".to_string(),
        };
        assert_eq!(only_err.combined(), "denied");
    }

    #[test]
    fn outcome_stdout_only_for_successful_runs() {
        let failed = CommandOutcome::Completed(CommandOutput {
            code: Some(2),
            stdout: "noise".to_string(),
            stderr: String::new(),
        });
        assert!(failed.stdout().is_none());
        assert!(!failed.succeeded());
        assert!(failed.describe().starts_with("exit status 2"));

        let timed_out = CommandOutcome::TimedOut {
            after: Duration::from_secs(5),
        };
        assert_eq!(timed_out.describe(), "timed out after 5s");
    }

    #[tokio::test]
    async fn system_runner_reports_missing_program_as_spawn_failure() {
        let spec = CommandSpec::new("stowage-definitely-missing-binary", Duration::from_secs(5));

        let outcome = SystemRunner.run(&spec).await;

        assert!(matches!(
            outcome,
            CommandOutcome::SpawnFailed { kind, .. } if kind == std::io::ErrorKind::NotFound
        ));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_delivers_lines_and_collects_output() {
        let seen = std::sync::Mutex::new(Vec::new());
        let spec = CommandSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo first; echo second >&2"]);

        let outcome = SystemRunner
            .stream(&spec, &|line: &str| {
                seen.lock().expect("lines lock").push(line.to_string());
                LineControl::Continue
            })
            .await;

        let StreamOutcome::Finished(CommandOutcome::Completed(output)) = outcome else {
            panic!("expected a completed run, got {outcome:?}");
        };
        assert!(output.success());
        assert_eq!(output.stdout, "first\n");
        assert_eq!(output.stderr, "second\n");
        let mut seen = seen.into_inner().expect("lines lock");
        seen.sort();
        assert_eq!(seen, vec!["first", "second"]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn streaming_can_detach_from_long_running_process() {
        let spec = CommandSpec::new("sh", Duration::from_secs(5))
            .args(["-c", "echo https://login.example/a/1; sleep 3"]);

        let started = std::time::Instant::now();
        let outcome = SystemRunner
            .stream(&spec, &|line: &str| {
                if line.starts_with("https://") {
                    LineControl::Detach
                } else {
                    LineControl::Continue
                }
            })
            .await;

        assert_eq!(outcome, StreamOutcome::Detached);
        assert!(started.elapsed() < Duration::from_secs(3));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn detached_process_is_stopped_at_its_timeout() {
        let pid = std::sync::Mutex::new(None::<u32>);
        let spec = CommandSpec::new("sh", Duration::from_secs(1))
            .args(["-c", "echo $$; echo https://login.example/a/1; exec sleep 30"]);

        let outcome = SystemRunner
            .stream(&spec, &|line: &str| {
                if let Ok(id) = line.parse() {
                    *pid.lock().expect("pid lock") = Some(id);
                }
                if line.starts_with("https://") {
                    LineControl::Detach
                } else {
                    LineControl::Continue
                }
            })
            .await;
        assert_eq!(outcome, StreamOutcome::Detached);

        let pid = pid
            .into_inner()
            .expect("pid lock")
            .expect("script prints its pid");
        let proc_entry = std::path::PathBuf::from(format!("/proc/{pid}"));
        assert!(proc_entry.exists());

        tokio::time::sleep(Duration::from_millis(2500)).await;
        assert!(!proc_entry.exists());
    }

    #[tokio::test]
    async fn default_stream_replays_captured_output() {
        struct Canned;

        #[async_trait::async_trait]
        impl CommandRunner for Canned {
            async fn run(&self, _spec: &CommandSpec) -> CommandOutcome {
                CommandOutcome::Completed(CommandOutput {
                    code: Some(0),
                    stdout: "one\ntwo\n".to_string(),
                    stderr: String::new(),
                })
            }
        }

        let spec = CommandSpec::new("anything", Duration::from_secs(1));
        let outcome = Canned
            .stream(&spec, &|line: &str| {
                if line == "two" {
                    LineControl::Detach
                } else {
                    LineControl::Continue
                }
            })
            .await;

        assert_eq!(outcome, StreamOutcome::Detached);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn system_runner_enforces_timeout() {
        let spec = CommandSpec::new("sleep", Duration::from_millis(100)).arg("5");

        let outcome = SystemRunner.run(&spec).await;

        assert!(matches!(outcome, CommandOutcome::TimedOut { .. }));
    }
}
