//! Git adapter for capturing the side effects of actions.
//!
//! Snapshots are sets of paths reported by `git status --porcelain`. When an
//! action changes that set, the executor records a diff and copies of the newly
//! changed files. Paths under excluded prefixes (the artifact store, the
//! engine's own state) never count as changes.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use thiserror::Error;
use tracing::{debug, instrument};

use crate::core::path::to_slash;

#[derive(Debug, Error)]
pub enum GitError {
    #[error("git binary unavailable")]
    GitUnavailable(#[source] std::io::Error),
    #[error("git {args} failed: {stderr}")]
    Failed { args: String, stderr: String },
    #[error("unexpected porcelain line: '{0}'")]
    Parse(String),
}

/// Parsed `git status --porcelain` entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEntry {
    /// 2-letter XY code, or "??" for untracked.
    pub code: String,
    /// Path for the changed file.
    pub path: String,
}

/// Wrapper for executing git commands in a working directory.
#[derive(Debug, Clone)]
pub struct Git {
    workdir: PathBuf,
}

impl Git {
    pub fn new(workdir: impl Into<PathBuf>) -> Self {
        Self {
            workdir: workdir.into(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    /// Get status entries (including untracked) in porcelain format.
    pub fn status_porcelain(&self) -> Result<Vec<StatusEntry>, GitError> {
        let out = self.run_capture(&["status", "--porcelain=v1", "-uall"])?;
        let mut entries = Vec::new();
        for line in out.lines() {
            if line.trim().is_empty() {
                continue;
            }
            entries.push(parse_status_line(line)?);
        }
        Ok(entries)
    }

    /// Unified diff of the worktree against HEAD, or against the index when
    /// the repository has no commits yet.
    pub fn diff_worktree(&self) -> Result<String, GitError> {
        match self.run_capture(&["diff", "--no-color", "HEAD"]) {
            Ok(diff) => Ok(diff),
            Err(GitError::Failed { .. }) => {
                debug!("diff against HEAD failed, falling back to index");
                self.run_capture(&["diff", "--no-color"])
            }
            Err(err) => Err(err),
        }
    }

    fn run_capture(&self, args: &[&str]) -> Result<String, GitError> {
        let output = self.run_checked(args)?;
        Ok(String::from_utf8_lossy(&output.stdout).to_string())
    }

    fn run_checked(&self, args: &[&str]) -> Result<Output, GitError> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(GitError::Failed {
                args: args.join(" "),
                stderr: stderr.trim().to_string(),
            });
        }
        Ok(output)
    }

    fn run(&self, args: &[&str]) -> Result<Output, GitError> {
        Command::new("git")
            .args(args)
            .current_dir(&self.workdir)
            .output()
            .map_err(GitError::GitUnavailable)
    }
}

fn parse_status_line(line: &str) -> Result<StatusEntry, GitError> {
    if let Some(path) = line.strip_prefix("?? ") {
        return Ok(StatusEntry {
            code: "??".to_string(),
            path: unquote(path.trim()),
        });
    }
    if line.len() < 4 || !line.is_char_boundary(3) {
        return Err(GitError::Parse(line.to_string()));
    }
    let code = line[..2].to_string();
    let mut path = line[3..].trim().to_string();
    if let Some((_, new)) = path.split_once("->") {
        path = new.trim().to_string();
    }
    Ok(StatusEntry {
        code,
        path: unquote(&path),
    })
}

/// Porcelain quotes paths with unusual characters; strip the outer quotes.
fn unquote(path: &str) -> String {
    path.strip_prefix('"')
        .and_then(|p| p.strip_suffix('"'))
        .unwrap_or(path)
        .to_string()
}

/// Set of changed paths, relative to the repository workdir.
pub type Snapshot = BTreeSet<String>;

/// Git capture bound to one working tree.
#[derive(Debug, Clone)]
pub struct GitCapturer {
    git: Git,
    excluded_prefixes: Vec<String>,
}

impl GitCapturer {
    /// Return a capturer when `workdir` is the top of a git working tree.
    ///
    /// `excluded` directories that sit inside `workdir` are left out of
    /// every snapshot.
    pub fn detect(workdir: &Path, excluded: &[PathBuf]) -> Option<Self> {
        if !workdir.join(".git").exists() {
            return None;
        }
        let excluded_prefixes = excluded
            .iter()
            .filter_map(|dir| dir.strip_prefix(workdir).ok())
            .map(|rel| format!("{}/", to_slash(rel)))
            .filter(|prefix| prefix != "/")
            .collect();
        Some(Self {
            git: Git::new(workdir),
            excluded_prefixes,
        })
    }

    pub fn workdir(&self) -> &Path {
        self.git.workdir()
    }

    #[instrument(skip_all)]
    pub fn snapshot(&self) -> Result<Snapshot, GitError> {
        let entries = self.git.status_porcelain()?;
        Ok(entries
            .into_iter()
            .map(|entry| entry.path)
            .filter(|path| {
                !self
                    .excluded_prefixes
                    .iter()
                    .any(|prefix| path.starts_with(prefix.as_str()))
            })
            .collect())
    }

    pub fn diff_since(&self) -> Result<String, GitError> {
        self.git.diff_worktree()
    }
}

/// Paths present in `after` but not in `before`.
pub fn newly_changed<'a>(before: &'a Snapshot, after: &'a Snapshot) -> Vec<&'a str> {
    after.difference(before).map(String::as_str).collect()
}
