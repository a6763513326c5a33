//! Process execution with captured output.
//!
//! A non-zero exit status is data, not an error: callers inspect
//! [`CommandResult::exit_code`]. A command that cannot be spawned at all is
//! reported the way a shell would (127 for not found, 126 for permission).

use std::collections::BTreeMap;
use std::io::{ErrorKind, Read};
use std::path::PathBuf;
use std::process::{Command, ExitStatus, Stdio};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use tracing::{debug, error, instrument, warn};
use wait_timeout::ChildExt;

use crate::core::shell::{display_argv, sanitize_shell};
use crate::io::config::StepdeckConfig;

pub const EXIT_NOT_FOUND: i32 = 127;
pub const EXIT_NOT_EXECUTABLE: i32 = 126;
pub const EXIT_TIMED_OUT: i32 = 124;

/// Command to run: argv, working directory and extra environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub argv: Vec<String>,
    pub cwd: PathBuf,
    pub env: BTreeMap<String, String>,
    /// Command line recorded in logs; defaults to the quoted argv.
    pub display: String,
}

impl CommandSpec {
    pub fn new(argv: Vec<String>, cwd: impl Into<PathBuf>) -> Self {
        let display = display_argv(&argv);
        Self {
            argv,
            cwd: cwd.into(),
            env: BTreeMap::new(),
            display,
        }
    }

    /// `sh -c <command>` after comment stripping and continuation joining.
    pub fn shell(command: &str, cwd: impl Into<PathBuf>) -> Self {
        let script = sanitize_shell(command);
        Self {
            argv: vec!["sh".to_string(), "-c".to_string(), script.clone()],
            cwd: cwd.into(),
            env: BTreeMap::new(),
            display: script,
        }
    }

    pub fn with_env(mut self, env: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(env.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }
}

/// Outcome of one finished command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandResult {
    pub command: String,
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandResult {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Render the `command.log` body.
    pub fn render_log(&self) -> String {
        format!(
            "# CMD\n{}\n# EXIT\n{}\n# STDOUT\n{}\n# STDERR\n{}",
            self.command, self.exit_code, self.stdout, self.stderr
        )
    }
}

/// Seam for process execution; tests substitute a scripted runner.
pub trait ProcessRunner {
    /// Run `spec` to completion. Only plumbing failures (pipes, waiting) are
    /// errors; exit codes, including spawn failures, are returned as data.
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult>;
}

/// Runs commands as real child processes.
#[derive(Debug, Clone)]
pub struct SystemProcessRunner {
    timeout: Option<Duration>,
    output_limit_bytes: usize,
}

impl SystemProcessRunner {
    pub fn new(timeout: Option<Duration>, output_limit_bytes: usize) -> Self {
        Self {
            timeout,
            output_limit_bytes,
        }
    }

    pub fn from_config(config: &StepdeckConfig) -> Self {
        Self::new(
            config.command_timeout_secs.map(Duration::from_secs),
            config.output_limit_bytes,
        )
    }
}

impl ProcessRunner for SystemProcessRunner {
    #[instrument(skip_all, fields(command = %spec.display, cwd = %spec.cwd.display()))]
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult> {
        let Some((program, args)) = spec.argv.split_first() else {
            return Err(anyhow!("empty argv"));
        };
        let mut cmd = Command::new(program);
        cmd.args(args).current_dir(&spec.cwd).envs(&spec.env);

        match run_command(cmd, self.timeout, self.output_limit_bytes) {
            Ok(output) => Ok(output.into_result(&spec.display)),
            Err(err) => match spawn_failure_code(&err) {
                Some(code) => {
                    warn!(code, err = %err, "command could not be started");
                    Ok(CommandResult {
                        command: spec.display.clone(),
                        exit_code: code,
                        stdout: String::new(),
                        stderr: format!("{err:#}"),
                    })
                }
                None => Err(err),
            },
        }
    }
}

fn spawn_failure_code(err: &anyhow::Error) -> Option<i32> {
    let io_err = err.downcast_ref::<std::io::Error>()?;
    match io_err.kind() {
        ErrorKind::NotFound => Some(EXIT_NOT_FOUND),
        ErrorKind::PermissionDenied => Some(EXIT_NOT_EXECUTABLE),
        _ => None,
    }
}

/// Captured child process output.
#[derive(Debug)]
struct CommandOutput {
    status: ExitStatus,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    stdout_truncated: usize,
    stderr_truncated: usize,
    timed_out: bool,
}

impl CommandOutput {
    fn into_result(self, command: &str) -> CommandResult {
        let mut stdout = String::from_utf8_lossy(&self.stdout).into_owned();
        let mut stderr = String::from_utf8_lossy(&self.stderr).into_owned();
        if self.stdout_truncated > 0 {
            stdout.push_str(&format!("\n[stdout truncated {} bytes]\n", self.stdout_truncated));
        }
        if self.stderr_truncated > 0 {
            stderr.push_str(&format!("\n[stderr truncated {} bytes]\n", self.stderr_truncated));
        }
        let exit_code = if self.timed_out {
            stderr.push_str("\n[timed out]\n");
            EXIT_TIMED_OUT
        } else {
            self.status.code().unwrap_or(-1)
        };
        CommandResult {
            command: command.to_string(),
            exit_code,
            stdout,
            stderr,
        }
    }
}

/// Run a command and capture stdout/stderr without risking pipe deadlocks.
///
/// Output is read concurrently while the child runs. `output_limit_bytes` bounds the amount of
/// stdout/stderr stored in memory (bytes beyond this are discarded while still draining the pipe).
/// Stdin is closed. With no `timeout` the call waits for the child indefinitely.
#[instrument(skip_all, fields(timeout_secs = timeout.map(|t| t.as_secs()), output_limit_bytes))]
fn run_command(
    mut cmd: Command,
    timeout: Option<Duration>,
    output_limit_bytes: usize,
) -> Result<CommandOutput> {
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    debug!("spawning child process");
    let mut child = match cmd.spawn() {
        Ok(c) => c,
        Err(e) => {
            error!(err = %e, "failed to spawn command");
            return Err(e).context("spawn command");
        }
    };

    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| anyhow!("stdout was not piped"))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| anyhow!("stderr was not piped"))?;

    let stdout_handle = thread::spawn(move || read_stream_limited(stdout, output_limit_bytes));
    let stderr_handle = thread::spawn(move || read_stream_limited(stderr, output_limit_bytes));

    let mut timed_out = false;
    let status = match timeout {
        None => child.wait().context("wait for command")?,
        Some(limit) => match child.wait_timeout(limit).context("wait for command")? {
            Some(status) => status,
            None => {
                warn!(timeout_secs = limit.as_secs(), "command timed out, killing");
                timed_out = true;
                child.kill().context("kill command")?;
                child.wait().context("wait command after kill")?
            }
        },
    };

    let (stdout, stdout_truncated) = join_output(stdout_handle).context("join stdout")?;
    let (stderr, stderr_truncated) = join_output(stderr_handle).context("join stderr")?;

    if stdout_truncated > 0 || stderr_truncated > 0 {
        warn!(stdout_truncated, stderr_truncated, "output truncated");
    }

    debug!(exit_code = ?status.code(), timed_out, "command finished");
    Ok(CommandOutput {
        status,
        stdout,
        stderr,
        stdout_truncated,
        stderr_truncated,
        timed_out,
    })
}

fn join_output(handle: thread::JoinHandle<Result<(Vec<u8>, usize)>>) -> Result<(Vec<u8>, usize)> {
    match handle.join() {
        Ok(result) => result,
        Err(_) => Err(anyhow!("output reader thread panicked")),
    }
}

fn read_stream_limited<R: Read>(mut reader: R, limit: usize) -> Result<(Vec<u8>, usize)> {
    let mut buf = Vec::new();
    let mut truncated = 0usize;
    let mut chunk = [0u8; 8192];

    loop {
        let n = reader.read(&mut chunk).context("read output")?;
        if n == 0 {
            break;
        }
        let remaining = limit.saturating_sub(buf.len());
        if remaining > 0 {
            let keep = n.min(remaining);
            buf.extend_from_slice(&chunk[..keep]);
            truncated += n.saturating_sub(keep);
        } else {
            truncated += n;
        }
    }

    Ok((buf, truncated))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn runner() -> SystemProcessRunner {
        SystemProcessRunner::new(None, 10_000)
    }

    #[test]
    fn captures_stdout_and_exit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = runner()
            .run(&CommandSpec::shell("echo hello", temp.path()))
            .expect("run");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.command, "echo hello");
    }

    #[test]
    fn non_zero_exit_is_data() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = runner()
            .run(&CommandSpec::shell("echo oops >&2; exit 3", temp.path()))
            .expect("run");
        assert_eq!(result.exit_code, 3);
        assert_eq!(result.stderr, "oops\n");
        assert!(!result.success());
    }

    #[test]
    fn missing_program_maps_to_127() {
        let temp = tempfile::tempdir().expect("tempdir");
        let spec = CommandSpec::new(vec!["stepdeck-no-such-binary".to_string()], temp.path());
        let result = runner().run(&spec).expect("run");
        assert_eq!(result.exit_code, EXIT_NOT_FOUND);
        assert!(result.stderr.contains("spawn command"));
    }

    #[test]
    fn timeout_kills_and_reports_124() {
        let temp = tempfile::tempdir().expect("tempdir");
        let runner = SystemProcessRunner::new(Some(Duration::from_millis(200)), 1_000);
        let result = runner
            .run(&CommandSpec::shell("sleep 2", temp.path()))
            .expect("run");
        assert_eq!(result.exit_code, EXIT_TIMED_OUT);
    }

    #[test]
    fn extra_env_reaches_child() {
        let temp = tempfile::tempdir().expect("tempdir");
        let env = BTreeMap::from([("GREETING".to_string(), "hi".to_string())]);
        let spec = CommandSpec::shell("printf %s \"$GREETING\"", temp.path()).with_env(&env);
        let result = runner().run(&spec).expect("run");
        assert_eq!(result.stdout, "hi");
    }

    #[test]
    fn stdin_is_closed_so_readers_see_eof() {
        let temp = tempfile::tempdir().expect("tempdir");
        let result = SystemProcessRunner::new(Some(Duration::from_secs(5)), 10_000)
            .run(&CommandSpec::shell("cat; echo done", temp.path()))
            .expect("run");
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "done\n");
    }

    #[test]
    fn log_layout_is_stable() {
        let result = CommandResult {
            command: "echo hello".to_string(),
            exit_code: 0,
            stdout: "hello\n".to_string(),
            stderr: String::new(),
        };
        assert_eq!(
            result.render_log(),
            "# CMD\necho hello\n# EXIT\n0\n# STDOUT\nhello\n\n# STDERR\n"
        );
    }
}
