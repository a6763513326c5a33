//! Orchestration for executing, previewing, or announcing steps.
//!
//! A step moves through an explicit state machine:
//!
//! ```text
//! Idle -> Announcing -> PresentOnly                      (present mode)
//! Idle -> Announcing -> Iterating(0..n) -> Succeeded     (run / dry mode)
//! ```
//!
//! Non-zero exit codes are recorded and iteration continues. Any other error
//! while iterating aborts the step and propagates to the caller; actions that
//! already ran are not rolled back.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use tracing::{debug, instrument, warn};

use crate::core::commands::{console_argv, package_argv};
use crate::core::key::{ActionKey, derive_key, sanitize};
use crate::core::links::{resolve_visit_url, with_query};
use crate::core::shell::{display_argv, sanitize_shell};
use crate::core::snippet::{ArtifactRef, extract};
use crate::io::artifacts::{ActionArtifactPaths, ArtifactStore, basename};
use crate::io::config::{PROXY_HOST_ENV, ProjectPaths, StepdeckConfig};
use crate::io::env_file::merge_env_file;
use crate::io::files::{copy_file, render_structured_config, replace_in_file, write_file};
use crate::io::git::{GitCapturer, GitError, Snapshot, newly_changed};
use crate::io::guards::predicate_holds;
use crate::io::journal::{RunJournal, generate_run_id};
use crate::io::process::{CommandSpec, ProcessRunner};
use crate::model::action::{Action, ActionKind, LineRange, MarkerRange};
use crate::model::context::{ExecutionContext, Mode};
use crate::model::step::{Step, Task};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    Idle,
    Announcing,
    /// Working on the action at this index.
    Iterating(usize),
    Succeeded,
    PresentOnly,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionStatus {
    /// Dispatched in run mode. Process-backed actions carry their exit code.
    Executed { exit_code: Option<i32> },
    /// A guard predicate did not hold; nothing ran.
    SkippedByGuard,
    /// Dry mode: described, not run.
    Previewed,
    /// Section or slide-break marker; display only.
    Marker,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionRecord {
    pub index: usize,
    pub key: ActionKey,
    pub summary: String,
    pub status: ActionStatus,
}

/// What happened during one step.
#[derive(Debug, Clone)]
pub struct StepReport {
    pub title: String,
    pub mode: Mode,
    pub state: StepState,
    pub actions: Vec<ActionRecord>,
    /// Every artifact written, in write order.
    pub artifacts: Vec<PathBuf>,
    /// Web paths (`/artifacts/...`) of the artifacts that live under `public/`.
    pub published: Vec<String>,
}

impl StepReport {
    pub fn succeeded(&self) -> bool {
        matches!(self.state, StepState::Succeeded | StepState::PresentOnly)
    }

    /// Actions whose process exited non-zero.
    pub fn failed_commands(&self) -> impl Iterator<Item = &ActionRecord> {
        self.actions.iter().filter(|record| {
            matches!(record.status, ActionStatus::Executed { exit_code: Some(code) } if code != 0)
        })
    }
}

/// Per-action bundle handed to the dispatch helpers.
struct ActionScope<'s> {
    key: &'s ActionKey,
    step: &'s str,
    ctx: ExecutionContext,
    store: &'s ArtifactStore,
    paths: ActionArtifactPaths,
}

/// Drives steps against a process runner, writing progress to `out`.
pub struct StepExecutor<'a, P: ProcessRunner, W: Write> {
    runner: &'a P,
    config: &'a StepdeckConfig,
    out: W,
    journal: Option<&'a mut RunJournal>,
    run_id: Option<String>,
    artifacts: Vec<PathBuf>,
}

impl<'a, P: ProcessRunner, W: Write> StepExecutor<'a, P, W> {
    pub fn new(runner: &'a P, config: &'a StepdeckConfig, out: W) -> Self {
        Self {
            runner,
            config,
            out,
            journal: None,
            run_id: None,
            artifacts: Vec::new(),
        }
    }

    /// Record task runs and finished processes in `journal` (run mode only).
    pub fn with_journal(mut self, journal: &'a mut RunJournal) -> Self {
        self.journal = Some(journal);
        self
    }

    pub fn into_output(self) -> W {
        self.out
    }

    /// Run every step of `task` in order, stopping at the first error.
    #[instrument(skip_all, fields(task = %task.name, mode = %ctx.mode()))]
    pub fn run_task(&mut self, task: &Task, ctx: &ExecutionContext) -> Result<Vec<StepReport>> {
        let run_id = (ctx.mode() == Mode::Run && self.journal.is_some()).then(generate_run_id);
        if let (Some(journal), Some(run_id)) = (self.journal.as_deref_mut(), run_id.as_deref()) {
            journal.task_started(run_id, &task.name, ctx.workdir());
        }
        self.run_id = run_id;

        let mut reports = Vec::with_capacity(task.steps.len());
        let mut outcome = Ok(());
        for step in &task.steps {
            match self.run_step(&task.name, step, ctx) {
                Ok(report) => reports.push(report),
                Err(err) => {
                    outcome = Err(err);
                    break;
                }
            }
        }

        if let (Some(journal), Some(run_id)) = (self.journal.as_deref_mut(), self.run_id.as_deref()) {
            let exit_code = if outcome.is_ok() { 0 } else { 1 };
            journal.task_finished(run_id, &task.name, exit_code);
        }
        self.run_id = None;
        outcome.with_context(|| format!("task \"{}\"", task.name))?;
        Ok(reports)
    }

    /// Announce `step`, then execute or preview its actions per `ctx.mode()`.
    #[instrument(skip_all, fields(task = task_name, step = %step.title, mode = %ctx.mode()))]
    pub fn run_step(
        &mut self,
        task_name: &str,
        step: &Step,
        ctx: &ExecutionContext,
    ) -> Result<StepReport> {
        let mut state = StepState::Idle;
        self.artifacts.clear();

        advance(&mut state, StepState::Announcing);
        self.announce(step)?;

        let mut report = StepReport {
            title: step.title.clone(),
            mode: ctx.mode(),
            state,
            actions: Vec::with_capacity(step.actions.len()),
            artifacts: Vec::new(),
            published: Vec::new(),
        };

        if ctx.mode() == Mode::Present {
            advance(&mut state, StepState::PresentOnly);
            report.state = state;
            return Ok(report);
        }

        let store = ArtifactStore::new(
            ctx.workdir(),
            &self.config.artifact_root(ctx.workdir()),
            task_name,
            &step.title,
        );

        for (index, action) in step.actions.iter().enumerate() {
            advance(&mut state, StepState::Iterating(index));
            let key = derive_key(action, index);
            let summary = action.summary();

            let status = if action.kind.is_marker() {
                writeln!(self.out, "{summary}")?;
                ActionStatus::Marker
            } else if ctx.mode() == Mode::Dry {
                self.preview(action, &key, ctx)?;
                ActionStatus::Previewed
            } else {
                writeln!(self.out, "[{key}] {summary}")?;
                self.execute(action, &key, &step.title, ctx, &store)
                    .with_context(|| format!("action {key} in step \"{}\"", step.title))?
            };

            report.actions.push(ActionRecord {
                index,
                key,
                summary,
                status,
            });
        }

        advance(&mut state, StepState::Succeeded);
        report.state = state;
        report.artifacts = std::mem::take(&mut self.artifacts);
        report.published = report
            .artifacts
            .iter()
            .filter_map(|abs| store.publish_path(abs))
            .collect();
        writeln!(
            self.out,
            "Step \"{}\" done ({} action(s), {} artifact(s))",
            step.title,
            report.actions.len(),
            report.artifacts.len()
        )?;
        Ok(report)
    }

    fn announce(&mut self, step: &Step) -> Result<()> {
        writeln!(self.out, "# {}", step.title)?;
        let description = step.description.trim();
        if !description.is_empty() {
            writeln!(self.out, "{description}")?;
        }
        for bullet in &step.bullets {
            writeln!(self.out, "  - {bullet}")?;
        }
        for note in &step.notes {
            writeln!(self.out, "  note: {note}")?;
        }
        Ok(())
    }

    /// Describe what run mode would do. Reads the filesystem at most; never
    /// spawns or writes.
    fn preview(&mut self, action: &Action, key: &ActionKey, ctx: &ExecutionContext) -> Result<()> {
        let outer = ctx.with_cwd(action.cwd.as_deref());
        writeln!(
            self.out,
            "DRY [{key}] {} (in {})",
            action.summary(),
            outer.workdir().display()
        )?;

        let mut target = action;
        let mut target_ctx = outer;
        while let ActionKind::Guarded { action: inner, .. } = &target.kind {
            target_ctx = target_ctx.with_cwd(inner.cwd.as_deref());
            target = inner;
        }
        if let Some(command) = self.planned_command(target, &target_ctx) {
            writeln!(self.out, "    $ {command}")?;
        }
        Ok(())
    }

    fn planned_command(&self, action: &Action, ctx: &ExecutionContext) -> Option<String> {
        match &action.kind {
            ActionKind::RunShell { command } => Some(sanitize_shell(command)),
            ActionKind::RunConsoleCommand {
                command,
                args,
                prefer,
                ..
            } => Some(display_argv(&console_argv(
                &self.config.console,
                self.has_local_console(ctx),
                *prefer,
                command,
                args,
            ))),
            ActionKind::RequirePackages {
                packages,
                dev,
                manager,
            } => Some(display_argv(&package_argv(
                &self.config.packages,
                &self.config.console,
                self.has_local_console(ctx),
                *manager,
                packages,
                *dev,
            ))),
            _ => None,
        }
    }

    fn has_local_console(&self, ctx: &ExecutionContext) -> bool {
        ctx.workdir().join(&self.config.console.entry_point).is_file()
    }

    fn execute(
        &mut self,
        action: &Action,
        key: &ActionKey,
        step_title: &str,
        ctx: &ExecutionContext,
        store: &ArtifactStore,
    ) -> Result<ActionStatus> {
        let Some((target, target_ctx)) = resolve_guards(action, ctx) else {
            writeln!(self.out, "  skipped: guard not satisfied")?;
            return Ok(ActionStatus::SkippedByGuard);
        };

        let scope = ActionScope {
            key,
            step: step_title,
            ctx: target_ctx,
            store,
            paths: ActionArtifactPaths::new(key),
        };

        let capturer = self.git_capturer(&scope, ctx);
        let before = capturer.as_ref().and_then(|c| soft(c.snapshot()));

        let status = self.dispatch(target, &scope)?;

        if let (Some(capturer), Some(before)) = (&capturer, &before) {
            self.capture_git(capturer, before, &scope)?;
        }
        Ok(status)
    }

    fn git_capturer(&self, scope: &ActionScope<'_>, ctx: &ExecutionContext) -> Option<GitCapturer> {
        if !self.config.git_capture {
            return None;
        }
        let excluded = [
            scope.store.root().to_path_buf(),
            ProjectPaths::new(ctx.workdir()).state_dir,
        ];
        GitCapturer::detect(scope.ctx.workdir(), &excluded)
    }

    fn capture_git(
        &mut self,
        capturer: &GitCapturer,
        before: &Snapshot,
        scope: &ActionScope<'_>,
    ) -> Result<()> {
        let Some(after) = soft(capturer.snapshot()) else {
            return Ok(());
        };
        if &after == before {
            return Ok(());
        }
        debug!(key = %scope.key, changed = after.len(), "git state changed");

        if let Some(diff) = soft(capturer.diff_since())
            && !diff.trim().is_empty()
        {
            self.artifacts
                .push(scope.store.save(&scope.paths.git_diff, diff)?);
        }
        for rel in newly_changed(before, &after) {
            let abs = capturer.workdir().join(rel);
            if abs.is_file() {
                let snapshot = scope.paths.changed_snapshot(&basename(&abs));
                self.artifacts.push(scope.store.save_file(&snapshot, &abs)?);
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, action: &Action, scope: &ActionScope<'_>) -> Result<ActionStatus> {
        let ctx = &scope.ctx;
        match &action.kind {
            ActionKind::RunShell { command } => {
                let spec = CommandSpec::shell(command, ctx.workdir()).with_env(ctx.env());
                self.run_process(&spec, scope)
            }
            ActionKind::RunConsoleCommand {
                command,
                args,
                prefer,
                env,
            } => {
                let argv = console_argv(
                    &self.config.console,
                    self.has_local_console(ctx),
                    *prefer,
                    command,
                    args,
                );
                let spec = CommandSpec::new(argv, ctx.workdir())
                    .with_env(ctx.env())
                    .with_env(env);
                self.run_process(&spec, scope)
            }
            ActionKind::RequirePackages {
                packages,
                dev,
                manager,
            } => {
                let argv = package_argv(
                    &self.config.packages,
                    &self.config.console,
                    self.has_local_console(ctx),
                    *manager,
                    packages,
                    *dev,
                );
                let spec = CommandSpec::new(argv, ctx.workdir()).with_env(ctx.env());
                self.run_process(&spec, scope)
            }
            ActionKind::WriteFile { path, content } => {
                let target = ctx.resolve(path);
                write_file(&target, content.as_bytes())?;
                self.snapshot_file(&target, scope)
            }
            ActionKind::CopyFile { from, to } => {
                let target = ctx.resolve(to);
                copy_file(&ctx.resolve(from), &target)?;
                self.snapshot_file(&target, scope)
            }
            ActionKind::WriteStructuredConfig {
                path,
                data,
                merge_mode,
            } => {
                let target = ctx.resolve(path);
                let rendered = render_structured_config(&target, data, *merge_mode)?;
                write_file(&target, rendered.as_bytes())?;
                self.snapshot_file(&target, scope)
            }
            ActionKind::DisplaySource {
                target,
                method,
                lines,
                markers,
            } => self.display_source(
                target,
                method.as_deref(),
                lines.as_ref(),
                markers.as_ref(),
                scope,
            ),
            ActionKind::OpenUrl {
                url_or_route,
                params,
            } => {
                let url = with_query(url_or_route, params);
                self.breadcrumb(&format!("open {url}"), scope)
            }
            ActionKind::VisitUrl {
                url_or_path,
                use_proxy,
                host,
                screenshot_id,
            } => {
                let proxy = ctx
                    .env()
                    .get(PROXY_HOST_ENV)
                    .cloned()
                    .or_else(|| std::env::var(PROXY_HOST_ENV).ok())
                    .or_else(|| self.config.proxy_host.clone());
                let url =
                    resolve_visit_url(url_or_path, *use_proxy, host.as_deref(), proxy.as_deref());
                let status = self.breadcrumb(&format!("visit {url}"), scope)?;
                if let Some(id) = screenshot_id {
                    self.screenshot(&url, id, scope)?;
                }
                Ok(status)
            }
            ActionKind::SetEnv { key, value, file } => {
                let target = ctx.resolve(file);
                merge_env_file(&target, &[(key.clone(), value.clone())])?;
                self.snapshot_file(&target, scope)
            }
            ActionKind::ReplaceInFile {
                path,
                pattern,
                replacement,
                limit,
            } => {
                let target = ctx.resolve(path);
                let count = replace_in_file(&target, pattern, replacement, *limit)?;
                writeln!(self.out, "  {count} replacement(s)")?;
                self.breadcrumb(&format!("replaced {count} match(es) of /{pattern}/ in {path}"), scope)?;
                self.snapshot_file(&target, scope)
            }
            ActionKind::RunInlineCode { code } => {
                code.call().context("inline code failed")?;
                Ok(ActionStatus::Executed { exit_code: None })
            }
            ActionKind::SectionMarker { .. } | ActionKind::SlideBreakMarker => {
                Ok(ActionStatus::Marker)
            }
            ActionKind::Guarded { .. } => bail!("guard wrappers are resolved before dispatch"),
            ActionKind::Unknown => {
                warn!(key = %scope.key, "unhandled action type");
                self.breadcrumb("unhandled action type", scope)
            }
        }
    }

    fn run_process(&mut self, spec: &CommandSpec, scope: &ActionScope<'_>) -> Result<ActionStatus> {
        let result = self.runner.run(spec)?;
        self.artifacts
            .push(scope.store.save(&scope.paths.command_log, result.render_log())?);

        if let (Some(journal), Some(run_id)) = (self.journal.as_deref_mut(), self.run_id.as_deref()) {
            journal.process_finished(run_id, scope.step, &result);
        }

        if !result.stdout.is_empty() {
            write!(self.out, "{}", result.stdout)?;
            if !result.stdout.ends_with('\n') {
                writeln!(self.out)?;
            }
        }
        if !result.success() {
            warn!(key = %scope.key, exit_code = result.exit_code, "command exited non-zero");
            writeln!(self.out, "  exit {} (continuing)", result.exit_code)?;
        }
        Ok(ActionStatus::Executed {
            exit_code: Some(result.exit_code),
        })
    }

    fn snapshot_file(&mut self, target: &Path, scope: &ActionScope<'_>) -> Result<ActionStatus> {
        let rel = scope.paths.file_snapshot(&basename(target));
        self.artifacts.push(scope.store.save_file(&rel, target)?);
        Ok(ActionStatus::Executed { exit_code: None })
    }

    fn breadcrumb(&mut self, text: &str, scope: &ActionScope<'_>) -> Result<ActionStatus> {
        self.artifacts
            .push(scope.store.save(&scope.paths.display, format!("{text}\n"))?);
        Ok(ActionStatus::Executed { exit_code: None })
    }

    fn display_source(
        &mut self,
        target: &str,
        method: Option<&str>,
        lines: Option<&LineRange>,
        markers: Option<&MarkerRange>,
        scope: &ActionScope<'_>,
    ) -> Result<ActionStatus> {
        let crumb = match method {
            Some(method) => format!("display {target}::{method}"),
            None => format!("display {target}"),
        };
        let status = self.breadcrumb(&crumb, scope)?;

        let source = match ArtifactRef::parse(target) {
            Some(reference) => scope
                .store
                .for_step(&reference.step)
                .path_for(&format!("files/{}/{}", reference.key, reference.file))?,
            None => scope.ctx.resolve(target),
        };
        if !source.is_file() {
            debug!(display_target = target, "display target is not a readable file");
            return Ok(status);
        }
        match fs::read_to_string(&source) {
            Ok(text) => {
                let snippet = extract(&text, lines, markers);
                let rel = scope.paths.file_snapshot(&basename(&source));
                self.artifacts.push(scope.store.save(&rel, snippet)?);
            }
            Err(err) => debug!(err = %err, display_target = target, "display target is not text"),
        }
        Ok(status)
    }

    fn screenshot(&mut self, url: &str, id: &str, scope: &ActionScope<'_>) -> Result<()> {
        let template = &self.config.browser.screenshot_command;
        if template.is_empty() {
            debug!("screenshots disabled");
            return Ok(());
        }
        let output = scope
            .store
            .prepare(&scope.paths.file_snapshot(&format!("{}.png", sanitize(id))))?;
        let output_str = output.display().to_string();
        let argv = template
            .iter()
            .map(|arg| arg.replace("{url}", url).replace("{output}", &output_str))
            .collect();

        let result = match self.runner.run(&CommandSpec::new(argv, scope.ctx.workdir())) {
            Ok(result) => result,
            Err(err) => {
                warn!(err = %err, url, "screenshot skipped");
                return Ok(());
            }
        };
        self.artifacts
            .push(scope.store.save(&scope.paths.command_log, result.render_log())?);
        if !result.success() {
            warn!(exit_code = result.exit_code, url, "screenshot command failed");
        } else if output.is_file() {
            self.artifacts.push(output);
        }
        Ok(())
    }
}

fn advance(state: &mut StepState, next: StepState) {
    debug!(from = ?*state, to = ?next, "step state");
    *state = next;
}

/// Unwrap guard layers, returning the action to dispatch with its context,
/// or `None` when any guard predicate fails. Each layer's `cwd` resolves
/// against its parent's.
fn resolve_guards<'b>(
    action: &'b Action,
    ctx: &ExecutionContext,
) -> Option<(&'b Action, ExecutionContext)> {
    let mut current = action;
    let mut current_ctx = ctx.with_cwd(action.cwd.as_deref());
    while let ActionKind::Guarded {
        action: inner,
        path,
        predicate,
    } = &current.kind
    {
        if !predicate_holds(*predicate, &current_ctx.resolve(path)) {
            return None;
        }
        current_ctx = current_ctx.with_cwd(inner.cwd.as_deref());
        current = inner;
    }
    Some((current, current_ctx))
}

/// Git problems never fail an action; capture is skipped instead.
fn soft<T>(result: Result<T, GitError>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(err) => {
            warn!(err = %err, "git capture skipped");
            None
        }
    }
}
