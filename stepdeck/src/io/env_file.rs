//! Reading and merging dotenv-style `KEY=VALUE` files.

use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::Regex;

static ENV_LINE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*([A-Z0-9_]+)\s*=\s*(.*?)\s*$").expect("env line pattern is valid")
});

/// Normalize a key the way dotenv readers expect: upper case, `_` separators.
pub fn normalize_key(key: &str) -> String {
    key.trim()
        .chars()
        .map(|c| match c {
            ' ' | '-' | '.' => '_',
            other => other.to_ascii_uppercase(),
        })
        .collect()
}

/// Ordered key/value pairs from an env file. Missing files read as empty.
pub fn read_env_file(path: &Path) -> Result<Vec<(String, String)>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(contents
        .lines()
        .filter_map(|line| {
            let caps = ENV_LINE.captures(line)?;
            Some((caps[1].to_string(), unquote(&caps[2])))
        })
        .collect())
}

/// Set `pairs` in the env file at `path`, keeping existing order and
/// appending new keys. Values containing whitespace are double-quoted.
/// Comments and lines that are not assignments are dropped on rewrite.
pub fn merge_env_file(path: &Path, pairs: &[(String, String)]) -> Result<()> {
    let mut entries = read_env_file(path)?;
    for (key, value) in pairs {
        let key = normalize_key(key);
        match entries.iter_mut().find(|(existing, _)| *existing == key) {
            Some(entry) => entry.1 = value.clone(),
            None => entries.push((key, value.clone())),
        }
    }

    let mut buf = String::new();
    for (key, value) in &entries {
        buf.push_str(key);
        buf.push('=');
        buf.push_str(&quote(value));
        buf.push('\n');
    }

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, buf).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

fn quote(value: &str) -> String {
    if value.chars().any(char::is_whitespace) {
        format!("\"{}\"", value.replace('"', "\\\""))
    } else {
        value.to_string()
    }
}

fn unquote(raw: &str) -> String {
    let stripped = raw
        .strip_prefix('"')
        .and_then(|v| v.strip_suffix('"'))
        .or_else(|| raw.strip_prefix('\'').and_then(|v| v.strip_suffix('\'')));
    match stripped {
        Some(inner) => inner.replace("\\\"", "\""),
        None => raw.to_string(),
    }
}
