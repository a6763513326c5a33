//! Filesystem writers used by file-producing actions.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use regex::Regex;
use serde_yaml::{Mapping, Value};

use crate::core::merge::deep_merge;
use crate::model::action::MergeMode;

/// Write `contents` to `path`, creating parent directories.
pub fn write_file(path: &Path, contents: &[u8]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::write(path, contents).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

/// Copy `from` to `to`, creating parent directories of `to`.
pub fn copy_file(from: &Path, to: &Path) -> Result<()> {
    if !from.is_file() {
        bail!("source file does not exist: {}", from.display());
    }
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent).with_context(|| format!("create directory {}", parent.display()))?;
    }
    fs::copy(from, to).with_context(|| format!("copy {} to {}", from.display(), to.display()))?;
    Ok(())
}

/// Render the YAML document that a structured-config write should produce.
///
/// With [`MergeMode::Merge`] an existing file is parsed and `data` is merged
/// over it; a file that does not hold a mapping is treated as empty.
pub fn render_structured_config(path: &Path, data: &Value, mode: MergeMode) -> Result<String> {
    let document = match mode {
        MergeMode::Replace => data.clone(),
        MergeMode::Merge => deep_merge(read_yaml_mapping(path)?, data.clone()),
    };
    serde_yaml::to_string(&document).with_context(|| format!("serialize yaml for {}", path.display()))
}

fn read_yaml_mapping(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Mapping(Mapping::new()));
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let parsed: Value =
        serde_yaml::from_str(&contents).with_context(|| format!("parse yaml {}", path.display()))?;
    Ok(match parsed {
        Value::Mapping(_) => parsed,
        _ => Value::Mapping(Mapping::new()),
    })
}

/// Regex replace inside a file. Returns the number of replacements made.
///
/// `limit` caps the replacements; `None` or `Some(0)` replaces every match.
/// The file is only rewritten when something matched.
pub fn replace_in_file(
    path: &Path,
    pattern: &str,
    replacement: &str,
    limit: Option<usize>,
) -> Result<usize> {
    if !path.is_file() {
        bail!("file does not exist: {}", path.display());
    }
    let re = Regex::new(pattern).with_context(|| format!("invalid pattern /{pattern}/"))?;
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;

    let cap = limit.unwrap_or(0);
    let matches = re.find_iter(&contents).count();
    let count = if cap == 0 { matches } else { matches.min(cap) };
    if count == 0 {
        return Ok(0);
    }

    let replaced = re.replacen(&contents, cap, replacement);
    fs::write(path, replaced.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn write_file_creates_parents() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("config/packages/app.yaml");
        write_file(&path, b"app: true\n").expect("write");
        assert_eq!(fs::read_to_string(&path).expect("read"), "app: true\n");
    }

    #[test]
    fn copy_missing_source_is_an_error() {
        let temp = tempfile::tempdir().expect("tempdir");
        let err = copy_file(&temp.path().join("nope"), &temp.path().join("out")).expect_err("missing");
        assert!(err.to_string().contains("source file does not exist"));
    }

    #[test]
    fn merge_mode_keeps_existing_keys() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("twig.yaml");
        fs::write(&path, "twig:\n  default_path: templates\n").expect("write");
        let data: Value = serde_yaml::from_str("twig:\n  strict_variables: true\n").expect("yaml");

        let rendered = render_structured_config(&path, &data, MergeMode::Merge).expect("render");
        assert_eq!(rendered, "twig:\n  default_path: templates\n  strict_variables: true\n");

        let replaced = render_structured_config(&path, &data, MergeMode::Replace).expect("render");
        assert_eq!(replaced, "twig:\n  strict_variables: true\n");
    }

    #[test]
    fn merge_into_missing_file_is_plain_data() {
        let temp = tempfile::tempdir().expect("tempdir");
        let data: Value = serde_yaml::from_str("a: 1\n").expect("yaml");
        let rendered =
            render_structured_config(&temp.path().join("new.yaml"), &data, MergeMode::Merge)
                .expect("render");
        assert_eq!(rendered, "a: 1\n");
    }

    #[test]
    fn replace_honors_limit_and_groups() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("routes.php");
        fs::write(&path, "v1 v2 v3\n").expect("write");

        let count = replace_in_file(&path, r"v(\d)", "version-$1", Some(2)).expect("replace");
        assert_eq!(count, 2);
        assert_eq!(fs::read_to_string(&path).expect("read"), "version-1 version-2 v3\n");

        let count = replace_in_file(&path, "absent", "x", None).expect("replace");
        assert_eq!(count, 0);
    }
}
