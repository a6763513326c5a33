//! Action variants and their self-descriptions.
//!
//! Actions are plain data. Deck files describe them with a `type` tag plus the
//! variant's fields; the common `note`, `cwd` and `id` fields sit alongside.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use anyhow::Result;
use serde::{Deserialize, Serialize, Serializer};

use crate::core::shell::display_argv;

/// One unit of work inside a step.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Action {
    /// Human-readable description; replaces the derived summary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    /// Working directory relative to the context's workdir.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cwd: Option<String>,
    /// Explicit artifact id; makes the action key independent of position.
    #[serde(default, alias = "artifact_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ActionKind {
    RunShell {
        command: String,
    },
    RunConsoleCommand {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        prefer: ConsolePreference,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        env: BTreeMap<String, String>,
    },
    RequirePackages {
        packages: Vec<String>,
        #[serde(default)]
        dev: bool,
        #[serde(default)]
        manager: PackageManager,
    },
    WriteFile {
        path: String,
        content: String,
    },
    CopyFile {
        from: String,
        to: String,
    },
    WriteStructuredConfig {
        path: String,
        data: serde_yaml::Value,
        #[serde(default)]
        merge_mode: MergeMode,
    },
    DisplaySource {
        target: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        method: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        lines: Option<LineRange>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        markers: Option<MarkerRange>,
    },
    OpenUrl {
        url_or_route: String,
        #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
        params: BTreeMap<String, String>,
    },
    VisitUrl {
        url_or_path: String,
        #[serde(default)]
        use_proxy: bool,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        host: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        screenshot_id: Option<String>,
    },
    SetEnv {
        key: String,
        value: String,
        #[serde(default = "default_env_file")]
        file: String,
    },
    ReplaceInFile {
        path: String,
        pattern: String,
        replacement: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        limit: Option<usize>,
    },
    /// Host-language callback; only constructible in code.
    #[serde(skip_deserializing)]
    RunInlineCode {
        #[serde(rename = "fn")]
        code: InlineCode,
    },
    SectionMarker {
        title: String,
    },
    SlideBreakMarker,
    Guarded {
        action: Box<Action>,
        path: String,
        predicate: GuardPredicate,
    },
    /// Any `type` tag this build does not recognize.
    #[serde(other)]
    Unknown,
}

fn default_env_file() -> String {
    ".env.local".to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ConsolePreference {
    #[default]
    #[serde(rename = "auto")]
    Auto,
    /// The external launcher (`symfony console`).
    #[serde(rename = "symfony")]
    Launcher,
    /// The project-local entry point run through the interpreter.
    #[serde(rename = "php")]
    Local,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PackageManager {
    #[default]
    Composer,
    Importmap,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeMode {
    #[default]
    Merge,
    Replace,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum GuardPredicate {
    Exists,
    Missing,
    DirEmpty,
    DirNotEmpty,
}

impl GuardPredicate {
    pub fn as_str(self) -> &'static str {
        match self {
            GuardPredicate::Exists => "exists",
            GuardPredicate::Missing => "missing",
            GuardPredicate::DirEmpty => "dir-empty",
            GuardPredicate::DirNotEmpty => "dir-not-empty",
        }
    }
}

/// 1-indexed, inclusive line range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkerRange {
    pub start: String,
    pub end: String,
}

type InlineFn = dyn Fn() -> Result<()> + Send + Sync;

/// Opaque callback carried by `RunInlineCode`. Serializes as `"[closure]"`.
#[derive(Clone)]
pub struct InlineCode(Arc<InlineFn>);

impl InlineCode {
    pub fn new(f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self(Arc::new(f))
    }

    pub fn call(&self) -> Result<()> {
        (self.0)()
    }
}

impl fmt::Debug for InlineCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("InlineCode([closure])")
    }
}

impl Serialize for InlineCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("[closure]")
    }
}

impl ActionKind {
    /// Variant name, as used in action keys (lowercased there).
    pub fn type_name(&self) -> &'static str {
        match self {
            ActionKind::RunShell { .. } => "RunShell",
            ActionKind::RunConsoleCommand { .. } => "RunConsoleCommand",
            ActionKind::RequirePackages { .. } => "RequirePackages",
            ActionKind::WriteFile { .. } => "WriteFile",
            ActionKind::CopyFile { .. } => "CopyFile",
            ActionKind::WriteStructuredConfig { .. } => "WriteStructuredConfig",
            ActionKind::DisplaySource { .. } => "DisplaySource",
            ActionKind::OpenUrl { .. } => "OpenUrl",
            ActionKind::VisitUrl { .. } => "VisitUrl",
            ActionKind::SetEnv { .. } => "SetEnv",
            ActionKind::ReplaceInFile { .. } => "ReplaceInFile",
            ActionKind::RunInlineCode { .. } => "RunInlineCode",
            ActionKind::SectionMarker { .. } => "SectionMarker",
            ActionKind::SlideBreakMarker => "SlideBreakMarker",
            ActionKind::Guarded { .. } => "Guarded",
            ActionKind::Unknown => "Unknown",
        }
    }

    pub fn is_marker(&self) -> bool {
        matches!(
            self,
            ActionKind::SectionMarker { .. } | ActionKind::SlideBreakMarker
        )
    }
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            note: None,
            cwd: None,
            id: None,
            kind,
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self::new(ActionKind::RunShell {
            command: command.into(),
        })
    }

    pub fn console<I, S>(command: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ActionKind::RunConsoleCommand {
            command: command.into(),
            args: args.into_iter().map(Into::into).collect(),
            prefer: ConsolePreference::Auto,
            env: BTreeMap::new(),
        })
    }

    pub fn require<I, S>(packages: I, dev: bool) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(ActionKind::RequirePackages {
            packages: packages.into_iter().map(Into::into).collect(),
            dev,
            manager: PackageManager::Composer,
        })
    }

    pub fn write_file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::new(ActionKind::WriteFile {
            path: path.into(),
            content: content.into(),
        })
    }

    pub fn copy_file(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self::new(ActionKind::CopyFile {
            from: from.into(),
            to: to.into(),
        })
    }

    pub fn structured_config(
        path: impl Into<String>,
        data: serde_yaml::Value,
        merge_mode: MergeMode,
    ) -> Self {
        Self::new(ActionKind::WriteStructuredConfig {
            path: path.into(),
            data,
            merge_mode,
        })
    }

    pub fn display(target: impl Into<String>) -> Self {
        Self::new(ActionKind::DisplaySource {
            target: target.into(),
            method: None,
            lines: None,
            markers: None,
        })
    }

    pub fn open_url(url_or_route: impl Into<String>) -> Self {
        Self::new(ActionKind::OpenUrl {
            url_or_route: url_or_route.into(),
            params: BTreeMap::new(),
        })
    }

    pub fn visit_url(url_or_path: impl Into<String>) -> Self {
        Self::new(ActionKind::VisitUrl {
            url_or_path: url_or_path.into(),
            use_proxy: false,
            host: None,
            screenshot_id: None,
        })
    }

    pub fn set_env(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(ActionKind::SetEnv {
            key: key.into(),
            value: value.into(),
            file: default_env_file(),
        })
    }

    pub fn replace_in_file(
        path: impl Into<String>,
        pattern: impl Into<String>,
        replacement: impl Into<String>,
    ) -> Self {
        Self::new(ActionKind::ReplaceInFile {
            path: path.into(),
            pattern: pattern.into(),
            replacement: replacement.into(),
            limit: None,
        })
    }

    pub fn inline(f: impl Fn() -> Result<()> + Send + Sync + 'static) -> Self {
        Self::new(ActionKind::RunInlineCode {
            code: InlineCode::new(f),
        })
    }

    pub fn section(title: impl Into<String>) -> Self {
        Self::new(ActionKind::SectionMarker {
            title: title.into(),
        })
    }

    pub fn slide_break() -> Self {
        Self::new(ActionKind::SlideBreakMarker)
    }

    /// Wrap `self` so it only runs when `predicate` holds for `path`.
    pub fn when(self, predicate: GuardPredicate, path: impl Into<String>) -> Self {
        Self::new(ActionKind::Guarded {
            action: Box::new(self),
            path: path.into(),
            predicate,
        })
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_cwd(mut self, cwd: impl Into<String>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// The action at the bottom of any guard chain.
    pub fn innermost(&self) -> &Action {
        let mut current = self;
        while let ActionKind::Guarded { action, .. } = &current.kind {
            current = action;
        }
        current
    }

    /// First non-blank explicit id, searching from the outermost wrapper in.
    pub fn explicit_id(&self) -> Option<&str> {
        let mut current = self;
        loop {
            if let Some(id) = current.id.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
                return Some(id);
            }
            match &current.kind {
                ActionKind::Guarded { action, .. } => current = action,
                _ => return None,
            }
        }
    }

    /// One-line description: the note when set, otherwise derived from the
    /// variant's fields.
    pub fn summary(&self) -> String {
        if let Some(note) = self.note.as_deref().filter(|n| !n.trim().is_empty()) {
            return note.to_string();
        }
        match &self.kind {
            ActionKind::RunShell { command } => {
                format!("$ {}", command.lines().next().unwrap_or_default().trim())
            }
            ActionKind::RunConsoleCommand { command, args, .. } => {
                let mut argv = vec![command.clone()];
                argv.extend(args.iter().cloned());
                format!("console {}", display_argv(&argv))
            }
            ActionKind::RequirePackages {
                packages,
                dev,
                manager,
            } => {
                let dev = if *dev { " --dev" } else { "" };
                match manager {
                    PackageManager::Composer => {
                        format!("composer require{dev} {}", packages.join(" "))
                    }
                    PackageManager::Importmap => {
                        format!("importmap:require {}", packages.join(" "))
                    }
                }
            }
            ActionKind::WriteFile { path, .. } => format!("write {path}"),
            ActionKind::CopyFile { from, to } => format!("copy {from} -> {to}"),
            ActionKind::WriteStructuredConfig {
                path, merge_mode, ..
            } => {
                let mode = match merge_mode {
                    MergeMode::Merge => "merge",
                    MergeMode::Replace => "replace",
                };
                format!("write config {path} ({mode})")
            }
            ActionKind::DisplaySource { target, method, .. } => match method {
                Some(method) => format!("display {target}::{method}"),
                None => format!("display {target}"),
            },
            ActionKind::OpenUrl { url_or_route, .. } => format!("open {url_or_route}"),
            ActionKind::VisitUrl { url_or_path, .. } => format!("visit {url_or_path}"),
            ActionKind::SetEnv { key, file, .. } => format!("set {key} in {file}"),
            ActionKind::ReplaceInFile { path, pattern, .. } => {
                format!("replace /{pattern}/ in {path}")
            }
            ActionKind::RunInlineCode { .. } => "run inline code".to_string(),
            ActionKind::SectionMarker { title } => format!("== {title} =="),
            ActionKind::SlideBreakMarker => "---".to_string(),
            ActionKind::Guarded {
                action,
                path,
                predicate,
            } => format!("[if {} {path}] {}", predicate.as_str(), action.summary()),
            ActionKind::Unknown => "unhandled action".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deserializes_tagged_action_with_common_fields() {
        let src = r#"
type = "run_console_command"
command = "make:controller"
args = ["Home"]
id = "home"
cwd = "app"
"#;
        let action: Action = toml::from_str(src).expect("parse");
        assert_eq!(action.id.as_deref(), Some("home"));
        assert_eq!(action.cwd.as_deref(), Some("app"));
        match action.kind {
            ActionKind::RunConsoleCommand {
                command,
                args,
                prefer,
                ..
            } => {
                assert_eq!(command, "make:controller");
                assert_eq!(args, vec!["Home".to_string()]);
                assert_eq!(prefer, ConsolePreference::Auto);
            }
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn unknown_type_tag_maps_to_unknown() {
        let action: Action = serde_json::from_str(r#"{"type":"teleport","to":"mars"}"#)
            .expect("parse");
        assert!(matches!(action.kind, ActionKind::Unknown));
    }

    #[test]
    fn nested_guard_deserializes_from_yaml() {
        let src = "type: guarded\npath: vendor\npredicate: dir-empty\naction:\n  type: run_shell\n  command: composer install\n";
        let action: Action = serde_yaml::from_str(src).expect("parse");
        assert_eq!(action.innermost().kind.type_name(), "RunShell");
    }

    #[test]
    fn inline_code_serializes_as_placeholder() {
        let action = Action::inline(|| Ok(()));
        let json = serde_json::to_value(&action).expect("serialize");
        assert_eq!(json["type"], "run_inline_code");
        assert_eq!(json["fn"], "[closure]");
    }

    #[test]
    fn summary_prefers_note() {
        let action = Action::shell("composer install\ncomposer dump").with_note("Install deps");
        assert_eq!(action.summary(), "Install deps");
        assert_eq!(Action::shell("composer install\nx").summary(), "$ composer install");
    }

    #[test]
    fn guarded_summary_describes_condition() {
        let action = Action::write_file(".env", "APP_ENV=dev").when(GuardPredicate::Missing, ".env");
        assert_eq!(action.summary(), "[if missing .env] write .env");
    }
}
