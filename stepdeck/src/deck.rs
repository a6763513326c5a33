//! Deck files: loading, discovery and task ordering.
//!
//! A deck file is TOML, YAML or JSON (picked by extension) holding an
//! optional `code` and a list of tasks. Without an explicit code, the deck is
//! identified by a slug of its file name.

use std::cmp::Ordering;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::debug;

use crate::model::step::{Deck, Task};

/// File name suffixes recognized by deck discovery.
pub const DECK_SUFFIXES: [&str; 4] = [".deck.toml", ".deck.yaml", ".deck.yml", ".deck.json"];

/// A parsed deck plus where it came from.
#[derive(Debug, Clone)]
pub struct LoadedDeck {
    pub code: String,
    pub path: PathBuf,
    pub deck: Deck,
}

/// Parse the deck at `path` and sort its tasks.
pub fn load_deck(path: &Path) -> Result<LoadedDeck> {
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let ext = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default()
        .to_ascii_lowercase();
    let mut deck: Deck = match ext.as_str() {
        "toml" => toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?,
        "yaml" | "yml" => {
            serde_yaml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
        }
        "json" => {
            serde_json::from_str(&contents).with_context(|| format!("parse {}", path.display()))?
        }
        other => bail!("unsupported deck format '{other}' for {}", path.display()),
    };
    sort_tasks(&mut deck.tasks);

    let code = deck
        .code
        .as_deref()
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| slug_from_path(path));
    debug!(code, tasks = deck.tasks.len(), "deck loaded");
    Ok(LoadedDeck {
        code,
        path: path.to_path_buf(),
        deck,
    })
}

/// URL-safe slug from a deck file name: `basic.demo.deck.toml` → `basic-demo`.
pub fn slug_from_path(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    let base = DECK_SUFFIXES
        .iter()
        .find_map(|suffix| name.strip_suffix(suffix))
        .map(str::to_string)
        .unwrap_or_else(|| match name.rsplit_once('.') {
            Some((stem, _)) => stem.to_string(),
            None => name.clone(),
        });

    let mut slug = String::with_capacity(base.len());
    for ch in base.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}

/// Tasks whose names start with digits come first, by that number; the rest
/// follow in name order.
pub fn sort_tasks(tasks: &mut [Task]) {
    tasks.sort_by(|a, b| compare_task_names(&a.name, &b.name));
}

fn compare_task_names(a: &str, b: &str) -> Ordering {
    match (numeric_prefix(a), numeric_prefix(b)) {
        (Some(x), Some(y)) => x.cmp(&y).then_with(|| a.cmp(b)),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => a.cmp(b),
    }
}

fn numeric_prefix(name: &str) -> Option<u64> {
    let digits: String = name.chars().take_while(char::is_ascii_digit).collect();
    digits.parse().ok()
}

/// Deck files directly inside `dir`, sorted by file name.
pub fn discover_decks(dir: &Path) -> Result<Vec<PathBuf>> {
    let entries = fs::read_dir(dir).with_context(|| format!("read directory {}", dir.display()))?;
    let mut decks = Vec::new();
    for entry in entries {
        let entry = entry.with_context(|| format!("read entry in {}", dir.display()))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().into_owned();
        if path.is_file() && DECK_SUFFIXES.iter().any(|suffix| name.ends_with(suffix)) {
            decks.push(path);
        }
    }
    decks.sort();
    Ok(decks)
}

/// Load a deck given either a file path or a deck code found in `dir`.
pub fn resolve_deck(dir: &Path, path_or_code: &str) -> Result<LoadedDeck> {
    let as_path = Path::new(path_or_code);
    if as_path.is_file() {
        return load_deck(as_path);
    }
    for candidate in discover_decks(dir)? {
        let loaded = load_deck(&candidate)?;
        if loaded.code == path_or_code {
            return Ok(loaded);
        }
    }
    bail!("no deck file or code '{path_or_code}' in {}", dir.display())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::action::ActionKind;

    fn task(name: &str) -> Task {
        Task {
            name: name.to_string(),
            description: None,
            steps: Vec::new(),
        }
    }

    #[test]
    fn slug_strips_deck_suffix_and_dots() {
        assert_eq!(slug_from_path(Path::new("decks/basic.demo.deck.toml")), "basic-demo");
        assert_eq!(slug_from_path(Path::new("Intro Talk.yaml")), "intro-talk");
    }

    #[test]
    fn numeric_prefixed_tasks_sort_first() {
        let mut tasks = vec![task("setup"), task("10-deploy"), task("2-install"), task("about")];
        sort_tasks(&mut tasks);
        let names: Vec<&str> = tasks.iter().map(|t| t.name.as_str()).collect();
        assert_eq!(names, vec!["2-install", "10-deploy", "about", "setup"]);
    }

    #[test]
    fn loads_toml_deck_with_slug_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("intro.deck.toml");
        fs::write(
            &path,
            r#"
[[tasks]]
name = "setup"

[[tasks.steps]]
title = "Install"
bullets = ["composer"]

[[tasks.steps.actions]]
type = "run_shell"
command = "echo hello"

[[tasks.steps.actions]]
type = "slide_break_marker"
"#,
        )
        .expect("write");

        let loaded = load_deck(&path).expect("load");
        assert_eq!(loaded.code, "intro");
        let task = loaded.deck.task("setup").expect("task");
        assert_eq!(task.steps[0].actions.len(), 2);
        assert!(matches!(
            task.steps[0].actions[1].kind,
            ActionKind::SlideBreakMarker
        ));
    }

    #[test]
    fn loads_yaml_deck_and_keeps_explicit_code() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("other.deck.yaml");
        fs::write(
            &path,
            "code: symfony-basics\ntasks:\n  - name: setup\n    steps:\n      - title: Env\n        actions:\n          - type: set_env\n            key: APP_ENV\n            value: dev\n",
        )
        .expect("write");

        let loaded = resolve_deck(temp.path(), "symfony-basics").expect("resolve");
        assert_eq!(loaded.path, path);
        match &loaded.deck.tasks[0].steps[0].actions[0].kind {
            ActionKind::SetEnv { file, .. } => assert_eq!(file, ".env.local"),
            other => panic!("unexpected kind {other:?}"),
        }
    }

    #[test]
    fn unknown_code_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = resolve_deck(temp.path(), "missing").expect_err("missing");
        assert!(err.to_string().contains("no deck file or code 'missing'"));
    }
}
