//! CLI tests for `stepdeck run`, `tasks` and `export`.

use std::fs;
use std::path::Path;
use std::process::Command;

use stepdeck::exit_codes;

const DECK: &str = r#"
code = "intro"

[[tasks]]
name = "setup"

[[tasks.steps]]
title = "Install"

[[tasks.steps.actions]]
type = "run_shell"
command = "echo hello > out.txt"
"#;

fn write_deck(root: &Path) {
    fs::write(root.join("intro.deck.toml"), DECK).expect("write deck");
}

fn stepdeck(root: &Path) -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_stepdeck"));
    cmd.current_dir(root).env_remove("STEPDECK_MODE");
    cmd
}

#[test]
fn dry_run_writes_nothing() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_deck(temp.path());

    let output = stepdeck(temp.path())
        .args(["run", "intro", "setup", "--mode", "dry"])
        .output()
        .expect("stepdeck run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("DRY [runshell-00]"), "stdout: {stdout}");
    assert!(!temp.path().join("out.txt").exists());
    assert!(!temp.path().join("public").exists());
    assert!(!temp.path().join(".stepdeck/runs").exists());
}

#[test]
fn mode_env_var_selects_present() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_deck(temp.path());

    let output = stepdeck(temp.path())
        .env("STEPDECK_MODE", "present")
        .args(["run", "intro"])
        .output()
        .expect("stepdeck run");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    assert!(String::from_utf8_lossy(&output.stdout).contains("# Install"));
    assert!(!temp.path().join("out.txt").exists());
}

#[test]
fn run_mode_executes_and_journals() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_deck(temp.path());

    let status = stepdeck(temp.path())
        .args(["run", "intro.deck.toml", "setup"])
        .status()
        .expect("stepdeck run");

    assert_eq!(status.code(), Some(exit_codes::OK));
    assert_eq!(
        fs::read_to_string(temp.path().join("out.txt")).expect("read"),
        "hello\n"
    );
    let journal = fs::read_to_string(temp.path().join(".stepdeck/runs/intro.jsonl"))
        .expect("read journal");
    assert_eq!(journal.lines().count(), 3);
    assert!(journal.contains("\"type\":\"process_finished\""));
}

#[test]
fn unknown_task_is_invalid() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_deck(temp.path());

    let output = stepdeck(temp.path())
        .args(["run", "intro", "teardown"])
        .output()
        .expect("stepdeck run");

    assert_eq!(output.status.code(), Some(exit_codes::INVALID));
    assert!(String::from_utf8_lossy(&output.stderr).contains("no task 'teardown'"));
}

#[test]
fn export_includes_derived_keys() {
    let temp = tempfile::tempdir().expect("tempdir");
    write_deck(temp.path());

    let output = stepdeck(temp.path())
        .args(["export", "intro"])
        .output()
        .expect("stepdeck export");

    assert_eq!(output.status.code(), Some(exit_codes::OK));
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    let action = &json["tasks"][0]["steps"][0]["actions"][0];
    assert_eq!(action["key"], "runshell-00");
    assert_eq!(action["type"], "run_shell");
}
