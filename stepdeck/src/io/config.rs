//! Project configuration stored under `.stepdeck/config.toml`.

use std::fs;
use std::path::{Component, Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

use crate::core::key::sanitize;
use crate::model::context::Mode;

/// Env var that supplies the proxy host for `VisitUrl { use_proxy: true }`.
pub const PROXY_HOST_ENV: &str = "STEPDECK_PROXY_HOST";

/// Well-known locations inside a project.
#[derive(Debug, Clone)]
pub struct ProjectPaths {
    pub root: PathBuf,
    pub state_dir: PathBuf,
    pub config_path: PathBuf,
    pub runs_dir: PathBuf,
}

impl ProjectPaths {
    pub fn new(root: &Path) -> Self {
        let state_dir = root.join(".stepdeck");
        Self {
            root: root.to_path_buf(),
            config_path: state_dir.join("config.toml"),
            runs_dir: state_dir.join("runs"),
            state_dir,
        }
    }

    /// Journal file for the deck identified by `code`.
    pub fn journal_path(&self, code: &str) -> PathBuf {
        self.runs_dir.join(format!("{}.jsonl", sanitize(code)))
    }
}

/// Engine configuration (TOML).
///
/// Missing fields fall back to defaults, so an absent or partial file is valid.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct StepdeckConfig {
    /// Artifact root relative to the project directory.
    pub artifact_subpath: String,

    /// Mode used when neither the CLI nor `STEPDECK_MODE` picks one.
    pub default_mode: Mode,

    /// Kill commands that run longer than this. Unset means no limit.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Capture git diffs around actions when the workdir is a repository.
    pub git_capture: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_host: Option<String>,

    pub console: ConsoleConfig,
    pub packages: PackagesConfig,
    pub browser: BrowserConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ConsoleConfig {
    /// Project-local console script, relative to the action's workdir.
    pub entry_point: String,
    /// Interpreter prefix used with the local entry point.
    pub interpreter: Vec<String>,
    /// External launcher used when no local entry point exists.
    pub launcher: Vec<String>,
    /// Append `-n` unless the args already disable interaction.
    pub auto_no_interaction: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PackagesConfig {
    pub composer: Vec<String>,
    /// Console command used for importmap requirements.
    pub importmap_command: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct BrowserConfig {
    /// Screenshot command; `{url}` and `{output}` are substituted. Empty disables screenshots.
    pub screenshot_command: Vec<String>,
}

impl Default for ConsoleConfig {
    fn default() -> Self {
        Self {
            entry_point: "bin/console".to_string(),
            interpreter: vec!["php".to_string()],
            launcher: vec!["symfony".to_string(), "console".to_string()],
            auto_no_interaction: true,
        }
    }
}

impl Default for PackagesConfig {
    fn default() -> Self {
        Self {
            composer: vec!["composer".to_string()],
            importmap_command: "importmap:require".to_string(),
        }
    }
}

impl Default for BrowserConfig {
    fn default() -> Self {
        Self {
            screenshot_command: [
                "chromium",
                "--headless",
                "--disable-gpu",
                "--window-size=1280,800",
                "--screenshot={output}",
                "{url}",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
        }
    }
}

impl Default for StepdeckConfig {
    fn default() -> Self {
        Self {
            artifact_subpath: "public/artifacts".to_string(),
            default_mode: Mode::Run,
            command_timeout_secs: None,
            output_limit_bytes: 1_000_000,
            git_capture: true,
            proxy_host: None,
            console: ConsoleConfig::default(),
            packages: PackagesConfig::default(),
            browser: BrowserConfig::default(),
        }
    }
}

impl StepdeckConfig {
    pub fn validate(&self) -> Result<()> {
        let subpath = Path::new(&self.artifact_subpath);
        if self.artifact_subpath.trim().is_empty() || subpath.is_absolute() {
            return Err(anyhow!("artifact_subpath must be a non-empty relative path"));
        }
        if subpath
            .components()
            .any(|c| matches!(c, Component::ParentDir))
        {
            return Err(anyhow!("artifact_subpath must not contain '..'"));
        }
        if self.command_timeout_secs == Some(0) {
            return Err(anyhow!("command_timeout_secs must be > 0 when set"));
        }
        if self.output_limit_bytes == 0 {
            return Err(anyhow!("output_limit_bytes must be > 0"));
        }
        if self.console.entry_point.trim().is_empty() {
            return Err(anyhow!("console.entry_point must not be empty"));
        }
        if !non_empty_argv(&self.console.interpreter) {
            return Err(anyhow!("console.interpreter must be a non-empty array"));
        }
        if !non_empty_argv(&self.console.launcher) {
            return Err(anyhow!("console.launcher must be a non-empty array"));
        }
        if !non_empty_argv(&self.packages.composer) {
            return Err(anyhow!("packages.composer must be a non-empty array"));
        }
        Ok(())
    }

    /// Absolute artifact root for a project directory.
    pub fn artifact_root(&self, project_dir: &Path) -> PathBuf {
        project_dir.join(&self.artifact_subpath)
    }
}

fn non_empty_argv(argv: &[String]) -> bool {
    argv.first().is_some_and(|program| !program.trim().is_empty())
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `StepdeckConfig::default()`.
pub fn load_config(path: &Path) -> Result<StepdeckConfig> {
    if !path.exists() {
        let cfg = StepdeckConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: StepdeckConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()
        .with_context(|| format!("invalid config {}", path.display()))?;
    Ok(cfg)
}

/// Atomically write config to disk (temp file + rename).
pub fn write_config(path: &Path, cfg: &StepdeckConfig) -> Result<()> {
    cfg.validate()?;
    let mut buf = toml::to_string_pretty(cfg).context("serialize config toml")?;
    buf.push('\n');
    write_atomic(path, &buf)
}

fn write_atomic(path: &Path, contents: &str) -> Result<()> {
    let parent = path
        .parent()
        .with_context(|| format!("config path missing parent {}", path.display()))?;
    fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    let tmp_path = path.with_extension("toml.tmp");
    fs::write(&tmp_path, contents)
        .with_context(|| format!("write temp config {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path).with_context(|| format!("replace config {}", path.display()))?;
    Ok(())
}
