//! Source snippet extraction for `DisplaySource` actions.

use crate::model::action::{LineRange, MarkerRange};

const ARTIFACT_PREFIX: &str = "artifact:";

/// Reference to a file captured by an earlier action of the same task.
///
/// Written as `artifact:<step title>::<action key>::<file name>`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArtifactRef {
    pub step: String,
    pub key: String,
    pub file: String,
}

impl ArtifactRef {
    pub fn parse(target: &str) -> Option<Self> {
        let rest = target.strip_prefix(ARTIFACT_PREFIX)?;
        let mut parts = rest.splitn(3, "::");
        let step = parts.next()?.trim();
        let key = parts.next()?.trim();
        let file = parts.next()?.trim();
        if step.is_empty() || key.is_empty() || file.is_empty() {
            return None;
        }
        Some(Self {
            step: step.to_string(),
            key: key.to_string(),
            file: file.to_string(),
        })
    }
}

/// Narrow `text` to the requested region.
///
/// A marker range takes precedence over a line range. When the markers cannot
/// be found the whole text is returned.
pub fn extract(text: &str, lines: Option<&LineRange>, markers: Option<&MarkerRange>) -> String {
    if let Some(markers) = markers {
        return extract_between_markers(text, markers).unwrap_or_else(|| text.to_string());
    }
    match lines {
        Some(range) => extract_lines(text, range),
        None => text.to_string(),
    }
}

/// Lines `start..=end`, 1-indexed. Out-of-range bounds are clamped.
pub fn extract_lines(text: &str, range: &LineRange) -> String {
    let start = range.start.max(1);
    let end = range.end.max(start);
    text.lines()
        .skip(start - 1)
        .take(end - start + 1)
        .collect::<Vec<_>>()
        .join("\n")
}

/// Lines strictly between the first line containing `start` and the next
/// line containing `end`.
pub fn extract_between_markers(text: &str, markers: &MarkerRange) -> Option<String> {
    let lines: Vec<&str> = text.lines().collect();
    let open = lines.iter().position(|line| line.contains(&markers.start))?;
    let close = lines[open + 1..]
        .iter()
        .position(|line| line.contains(&markers.end))?
        + open
        + 1;
    Some(lines[open + 1..close].join("\n"))
}

/// Fence language for a file path, by extension.
pub fn guess_lang(path: &str) -> &'static str {
    let ext = path
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default();
    match ext.as_str() {
        "php" => "php",
        "twig" => "twig",
        "yaml" | "yml" => "yaml",
        "json" => "json",
        "js" | "mjs" => "javascript",
        "ts" => "typescript",
        "css" => "css",
        "html" => "html",
        "xml" => "xml",
        "md" => "markdown",
        "sh" => "bash",
        "toml" => "toml",
        "rs" => "rust",
        "env" | "local" => "dotenv",
        _ => "text",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SOURCE: &str = "<?php\n// demo:start\nclass A {}\n// demo:end\nreturn 1;\n";

    #[test]
    fn line_range_is_one_indexed_and_inclusive() {
        let range = LineRange { start: 2, end: 3 };
        assert_eq!(extract_lines(SOURCE, &range), "// demo:start\nclass A {}");
    }

    #[test]
    fn line_range_past_end_is_clamped() {
        let range = LineRange { start: 5, end: 40 };
        assert_eq!(extract_lines(SOURCE, &range), "return 1;");
    }

    #[test]
    fn markers_select_lines_strictly_between() {
        let markers = MarkerRange {
            start: "demo:start".to_string(),
            end: "demo:end".to_string(),
        };
        assert_eq!(extract(SOURCE, None, Some(&markers)), "class A {}");
    }

    #[test]
    fn missing_marker_returns_whole_text() {
        let markers = MarkerRange {
            start: "nope".to_string(),
            end: "demo:end".to_string(),
        };
        assert_eq!(extract(SOURCE, None, Some(&markers)), SOURCE);
    }

    #[test]
    fn artifact_ref_parses_three_parts() {
        let parsed = ArtifactRef::parse("artifact:Create entity::runconsolecommand-entity::Product.php");
        assert_eq!(
            parsed,
            Some(ArtifactRef {
                step: "Create entity".to_string(),
                key: "runconsolecommand-entity".to_string(),
                file: "Product.php".to_string(),
            })
        );
        assert_eq!(ArtifactRef::parse("src/Entity/Product.php"), None);
        assert_eq!(ArtifactRef::parse("artifact:only::two"), None);
    }

    #[test]
    fn guesses_language_from_extension() {
        assert_eq!(guess_lang("config/packages/twig.yaml"), "yaml");
        assert_eq!(guess_lang("templates/base.html.twig"), "twig");
        assert_eq!(guess_lang("Makefile"), "text");
    }
}
