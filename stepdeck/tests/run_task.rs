//! End-to-end step execution against the real process runner.

use std::fs;
use std::path::Path;

use stepdeck::execute::{ActionStatus, StepExecutor};
use stepdeck::io::config::StepdeckConfig;
use stepdeck::io::process::SystemProcessRunner;
use stepdeck::model::action::Action;
use stepdeck::model::context::{ExecutionContext, Mode};
use stepdeck::model::step::{Step, Task};

fn install_task(actions: Vec<Action>) -> Task {
    let mut step = Step::builder("Install");
    for action in actions {
        step = step.action(action);
    }
    Task {
        name: "demo".to_string(),
        description: None,
        steps: vec![step.build()],
    }
}

fn run(root: &Path, task: &Task) -> Vec<stepdeck::execute::StepReport> {
    let config = StepdeckConfig::default();
    let runner = SystemProcessRunner::from_config(&config);
    let ctx = ExecutionContext::new(root, Mode::Run).expect("context");
    let mut executor = StepExecutor::new(&runner, &config, Vec::new());
    executor.run_task(task, &ctx).expect("run task")
}

#[test]
fn echo_hello_lands_in_command_log() {
    let temp = tempfile::tempdir().expect("tempdir");
    let task = install_task(vec![Action::shell("echo hello")]);

    let reports = run(temp.path(), &task);

    let log = temp
        .path()
        .join("public/artifacts/demo/Install/logs/runshell-00/command.log");
    let contents = fs::read_to_string(&log).expect("read command log");
    assert!(contents.contains("hello"), "log was: {contents}");
    assert!(reports[0].succeeded());
    assert_eq!(
        reports[0].actions[0].status,
        ActionStatus::Executed { exit_code: Some(0) }
    );
}

#[test]
fn ordinal_keys_and_paths_are_stable_across_runs() {
    let temp = tempfile::tempdir().expect("tempdir");
    let task = install_task(vec![Action::shell("echo one"), Action::shell("echo two")]);

    let first = run(temp.path(), &task);
    let second = run(temp.path(), &task);

    let keys: Vec<&str> = first[0].actions.iter().map(|a| a.key.as_str()).collect();
    assert_eq!(keys, vec!["runshell-00", "runshell-01"]);
    assert_eq!(first[0].artifacts, second[0].artifacts);
    let second_log = temp
        .path()
        .join("public/artifacts/demo/Install/logs/runshell-01/command.log");
    assert!(fs::read_to_string(second_log).expect("read").contains("two"));
}

#[test]
fn failing_command_is_recorded_and_the_step_continues() {
    let temp = tempfile::tempdir().expect("tempdir");
    let task = install_task(vec![
        Action::shell("exit 3"),
        Action::write_file("after.txt", "still here\n"),
    ]);

    let reports = run(temp.path(), &task);

    let failed: Vec<&str> = reports[0]
        .failed_commands()
        .map(|record| record.key.as_str())
        .collect();
    assert_eq!(failed, vec!["runshell-00"]);
    assert_eq!(
        fs::read_to_string(temp.path().join("after.txt")).expect("read"),
        "still here\n"
    );
}
