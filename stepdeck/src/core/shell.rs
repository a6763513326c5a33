//! Shell command normalization and argv display helpers.

/// Normalize a multi-line shell command before handing it to `sh -c`.
///
/// - `#` comments are removed when they are outside quotes and start a line
///   or follow whitespace.
/// - A line ending in `\` is joined to the next one with a single space.
/// - Other line breaks are kept, so multi-line scripts still run line by line.
/// - Lines that are empty after comment removal are dropped.
pub fn sanitize_shell(command: &str) -> String {
    let mut out = String::new();
    let mut quote = None;
    let mut joining = false;

    for raw in command.lines() {
        let quoted_at_start = quote.is_some();
        let stripped = strip_comment(raw, &mut quote);
        let mut line = stripped.trim_end();
        let continues = match line.strip_suffix('\\') {
            Some(rest) => {
                line = rest.trim_end();
                true
            }
            None => false,
        };
        if !quoted_at_start {
            line = line.trim_start();
        }

        if line.is_empty() && !quoted_at_start {
            if !continues {
                joining = false;
            }
            continue;
        }

        if !out.is_empty() {
            out.push(if joining { ' ' } else { '\n' });
        }
        out.push_str(line);
        joining = continues;
    }

    out
}

/// Remove a trailing `#` comment, tracking quote state across lines.
fn strip_comment(line: &str, quote: &mut Option<char>) -> String {
    let mut out = String::with_capacity(line.len());
    let mut prev: Option<char> = None;

    for ch in line.chars() {
        match *quote {
            Some(open) => {
                let escaped = open == '"' && prev == Some('\\');
                if ch == open && !escaped {
                    *quote = None;
                }
            }
            None => {
                if ch == '#' && prev.is_none_or(char::is_whitespace) {
                    return out;
                }
                if matches!(ch, '\'' | '"') && prev != Some('\\') {
                    *quote = Some(ch);
                }
            }
        }
        out.push(ch);
        prev = Some(ch);
    }

    out
}

/// Quote a single argument for display when it contains shell metacharacters.
pub fn quote_arg(arg: &str) -> String {
    let plain = !arg.is_empty()
        && arg
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "._:/=@^~+-,%".contains(c));
    if plain {
        arg.to_string()
    } else {
        format!("'{}'", arg.replace('\'', r"'\''"))
    }
}

/// Render an argv as a copy-pasteable command line.
pub fn display_argv(argv: &[String]) -> String {
    argv.iter()
        .map(|arg| quote_arg(arg))
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_trailing_and_full_line_comments() {
        let cmd = "# install deps\ncomposer install # quietly\n";
        assert_eq!(sanitize_shell(cmd), "composer install");
    }

    #[test]
    fn keeps_hash_inside_quotes_and_words() {
        assert_eq!(sanitize_shell(r#"echo "a # b""#), r#"echo "a # b""#);
        assert_eq!(sanitize_shell("echo issue#42"), "echo issue#42");
        assert_eq!(sanitize_shell("echo 'x #y' # z"), "echo 'x #y'");
    }

    #[test]
    fn joins_backslash_continuations_with_space() {
        let cmd = "composer require \\\n    symfony/orm-pack \\ # orm\n    symfony/maker-bundle";
        assert_eq!(
            sanitize_shell(cmd),
            "composer require symfony/orm-pack symfony/maker-bundle"
        );
    }

    #[test]
    fn keeps_newlines_between_independent_lines() {
        let cmd = "mkdir -p var\n\n  touch var/ready\n";
        assert_eq!(sanitize_shell(cmd), "mkdir -p var\ntouch var/ready");
    }

    #[test]
    fn quoted_string_spanning_lines_is_preserved() {
        let cmd = "echo 'first\n  # not a comment\nlast'";
        assert_eq!(sanitize_shell(cmd), "echo 'first\n  # not a comment\nlast'");
    }

    #[test]
    fn quote_arg_wraps_only_when_needed() {
        assert_eq!(quote_arg("make:entity"), "make:entity");
        assert_eq!(quote_arg("two words"), "'two words'");
        assert_eq!(quote_arg("it's"), r"'it'\''s'");
        assert_eq!(quote_arg(""), "''");
    }
}
