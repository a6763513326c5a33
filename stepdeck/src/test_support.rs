//! Test-only helpers: a scripted process runner and git fixtures.

use std::cell::RefCell;
use std::collections::VecDeque;
use std::fs;
use std::path::Path;
use std::process::Command;

use anyhow::{Result, anyhow};

use crate::io::process::{CommandResult, CommandSpec, ProcessRunner};

/// Canned outcome for one scripted command.
#[derive(Debug, Clone, Default)]
pub struct ScriptedResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    /// Fail the call itself instead of returning an exit code.
    pub error: Option<String>,
}

/// Process runner that records every spec and replays queued responses.
///
/// Once the queue is empty each call succeeds with empty output.
#[derive(Debug, Default)]
pub struct ScriptedProcessRunner {
    responses: RefCell<VecDeque<ScriptedResponse>>,
    calls: RefCell<Vec<CommandSpec>>,
}

impl ScriptedProcessRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond(self, exit_code: i32, stdout: &str, stderr: &str) -> Self {
        self.responses.borrow_mut().push_back(ScriptedResponse {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
            error: None,
        });
        self
    }

    /// Queue a runner failure, as when pipes or waiting break.
    pub fn fail(self, message: &str) -> Self {
        self.responses.borrow_mut().push_back(ScriptedResponse {
            error: Some(message.to_string()),
            ..ScriptedResponse::default()
        });
        self
    }

    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.borrow().clone()
    }
}

impl ProcessRunner for ScriptedProcessRunner {
    fn run(&self, spec: &CommandSpec) -> Result<CommandResult> {
        self.calls.borrow_mut().push(spec.clone());
        let response = self.responses.borrow_mut().pop_front().unwrap_or_default();
        if let Some(message) = response.error {
            return Err(anyhow!(message));
        }
        Ok(CommandResult {
            command: spec.display.clone(),
            exit_code: response.exit_code,
            stdout: response.stdout,
            stderr: response.stderr,
        })
    }
}

/// Initialize a git repository with one committed `README.md`.
pub fn init_git_repo(root: &Path) {
    git(root, &["init"]);
    git(root, &["config", "user.email", "test@example.com"]);
    git(root, &["config", "user.name", "test"]);
    fs::write(root.join("README.md"), "hi\n").expect("write");
    git(root, &["add", "README.md"]);
    git(root, &["commit", "-m", "init"]);
}

/// Stage and commit everything in `root`.
pub fn commit_all(root: &Path, message: &str) {
    git(root, &["add", "-A"]);
    git(root, &["commit", "-m", message]);
}

fn git(root: &Path, args: &[&str]) {
    let status = Command::new("git")
        .args(args)
        .current_dir(root)
        .status()
        .unwrap_or_else(|err| panic!("git {}: {err}", args.join(" ")));
    assert!(status.success(), "git {} failed", args.join(" "));
}

/// Collect every file under `root`, relative and `/`-separated, sorted.
pub fn list_files(root: &Path) -> Vec<String> {
    let mut out = Vec::new();
    collect(root, root, &mut out);
    out.sort();
    out
}

fn collect(root: &Path, dir: &Path, out: &mut Vec<String>) {
    let Ok(entries) = fs::read_dir(dir) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() {
            collect(root, &path, out);
        } else if let Ok(rel) = path.strip_prefix(root) {
            out.push(crate::core::path::to_slash(rel));
        }
    }
}
