//! Execution mode and per-step execution context.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};

use crate::core::path::resolve;

/// Environment variable that overrides the configured default mode.
pub const MODE_ENV: &str = "STEPDECK_MODE";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    /// Execute actions and capture artifacts.
    #[default]
    Run,
    /// Print what would run; no processes, no writes.
    Dry,
    /// Announce step content only.
    Present,
}

impl Mode {
    pub fn as_str(self) -> &'static str {
        match self {
            Mode::Run => "run",
            Mode::Dry => "dry",
            Mode::Present => "present",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "run" => Ok(Mode::Run),
            "dry" | "dry-run" => Ok(Mode::Dry),
            "present" => Ok(Mode::Present),
            other => bail!("unknown mode '{other}' (expected run, dry or present)"),
        }
    }
}

/// Pick the effective mode: explicit request, then `STEPDECK_MODE`, then the
/// configured default.
pub fn resolve_mode(requested: Option<Mode>, env_value: Option<&str>, default: Mode) -> Result<Mode> {
    if let Some(mode) = requested {
        return Ok(mode);
    }
    match env_value.map(str::trim).filter(|v| !v.is_empty()) {
        Some(raw) => raw.parse().with_context(|| format!("invalid {MODE_ENV}")),
        None => Ok(default),
    }
}

/// Where and how a step runs. Cheap to clone; `with_cwd` derives child
/// contexts for actions that name their own directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionContext {
    workdir: PathBuf,
    mode: Mode,
    env: BTreeMap<String, String>,
}

impl ExecutionContext {
    /// Create a context rooted at `workdir`, made absolute against the
    /// process working directory when relative.
    pub fn new(workdir: impl AsRef<Path>, mode: Mode) -> Result<Self> {
        let workdir = workdir.as_ref();
        let absolute = std::path::absolute(workdir)
            .with_context(|| format!("resolve workdir {}", workdir.display()))?;
        Ok(Self {
            workdir: crate::core::path::normalize(&absolute),
            mode,
            env: BTreeMap::new(),
        })
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Derive a context whose workdir is `cwd` resolved against this one.
    pub fn with_cwd(&self, cwd: Option<&str>) -> Self {
        match cwd.map(str::trim).filter(|c| !c.is_empty()) {
            Some(cwd) => Self {
                workdir: resolve(&self.workdir, cwd),
                mode: self.mode,
                env: self.env.clone(),
            },
            None => self.clone(),
        }
    }

    pub fn workdir(&self) -> &Path {
        &self.workdir
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn env(&self) -> &BTreeMap<String, String> {
        &self.env
    }

    /// Absolute path for `path` relative to this context's workdir.
    pub fn resolve(&self, path: &str) -> PathBuf {
        resolve(&self.workdir, path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn explicit_mode_beats_env_and_default() {
        let mode = resolve_mode(Some(Mode::Present), Some("dry"), Mode::Run).expect("mode");
        assert_eq!(mode, Mode::Present);
    }

    #[test]
    fn env_beats_default() {
        assert_eq!(resolve_mode(None, Some(" DRY "), Mode::Run).expect("mode"), Mode::Dry);
        assert_eq!(resolve_mode(None, Some(""), Mode::Present).expect("mode"), Mode::Present);
    }

    #[test]
    fn invalid_env_mode_is_rejected() {
        let err = resolve_mode(None, Some("fast"), Mode::Run).expect_err("invalid");
        assert!(format!("{err:#}").contains("unknown mode 'fast'"));
    }

    #[test]
    fn with_cwd_resolves_relative_and_keeps_mode() {
        let ctx = ExecutionContext::new("/srv/app", Mode::Dry).expect("ctx");
        let child = ctx.with_cwd(Some("assets/../public"));
        assert_eq!(child.workdir(), Path::new("/srv/app/public"));
        assert_eq!(child.mode(), Mode::Dry);
        assert_eq!(ctx.with_cwd(None), ctx);
    }
}
