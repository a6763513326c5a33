//! Markdown rendering of a task: step narrative plus one fenced block per
//! action.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use minijinja::{Environment, context};
use serde::Serialize;

use crate::core::links::with_query;
use crate::core::shell::{display_argv, sanitize_shell};
use crate::core::snippet::{extract, guess_lang};
use crate::io::env_file::normalize_key;
use crate::model::action::{Action, ActionKind, PackageManager};
use crate::model::step::{Step, Task};

const STEP_TEMPLATE: &str = include_str!("templates/step.md.j2");

#[derive(Debug, Clone, Serialize)]
struct RenderedStep {
    title: String,
    description: String,
    bullets: Vec<String>,
    blocks: Vec<Block>,
}

#[derive(Debug, Clone, Serialize)]
struct Block {
    kind: &'static str,
    title: Option<String>,
    lang: &'static str,
    code: String,
}

impl Block {
    fn code(lang: &'static str, title: Option<String>, code: impl Into<String>) -> Self {
        Self {
            kind: "code",
            title,
            lang,
            code: code.into(),
        }
    }

    fn marker(kind: &'static str, title: Option<String>) -> Self {
        Self {
            kind,
            title,
            lang: "",
            code: String::new(),
        }
    }
}

/// Template engine wrapper around minijinja.
pub struct MarkdownRenderer {
    env: Environment<'static>,
    project_dir: Option<PathBuf>,
}

impl MarkdownRenderer {
    pub fn new() -> Result<Self> {
        let mut env = Environment::new();
        env.add_template("step", STEP_TEMPLATE)
            .context("load step template")?;
        Ok(Self {
            env,
            project_dir: None,
        })
    }

    /// Resolve `DisplaySource` targets against `dir` and inline their snippets.
    pub fn with_project_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.project_dir = Some(dir.into());
        self
    }

    pub fn render_task(&self, task: &Task) -> Result<String> {
        let steps = task
            .steps
            .iter()
            .map(|step| self.render_step(step))
            .collect::<Result<Vec<_>>>()?;
        let template = self.env.get_template("step")?;
        let rendered = template
            .render(context! { task => &task.name, steps => steps })
            .with_context(|| format!("render task {}", task.name))?;
        Ok(rendered)
    }

    fn render_step(&self, step: &Step) -> Result<RenderedStep> {
        let mut blocks = Vec::new();
        for action in &step.actions {
            self.push_blocks(action, &mut blocks)?;
        }
        Ok(RenderedStep {
            title: step.title.clone(),
            description: step.description.trim().to_string(),
            bullets: step.bullets.clone(),
            blocks,
        })
    }

    fn push_blocks(&self, action: &Action, blocks: &mut Vec<Block>) -> Result<()> {
        let note = action.note.clone();
        let block = match &action.kind {
            ActionKind::SectionMarker { title } => Block::marker("section", Some(title.clone())),
            ActionKind::SlideBreakMarker => Block::marker("break", None),
            ActionKind::RunShell { command } => Block::code("bash", note, sanitize_shell(command)),
            ActionKind::RunConsoleCommand { command, args, .. } => {
                let mut argv = vec!["bin/console".to_string(), command.clone()];
                argv.extend(args.iter().cloned());
                Block::code("bash", note, display_argv(&argv))
            }
            ActionKind::RequirePackages {
                packages,
                dev,
                manager,
            } => {
                let code = match manager {
                    PackageManager::Composer if *dev => {
                        format!("composer require --dev {}", packages.join(" "))
                    }
                    PackageManager::Composer => format!("composer require {}", packages.join(" ")),
                    PackageManager::Importmap => {
                        format!("bin/console importmap:require {}", packages.join(" "))
                    }
                };
                Block::code("bash", note, code)
            }
            ActionKind::WriteFile { path, content } => {
                Block::code(guess_lang(path), note.or_else(|| Some(path.clone())), content.clone())
            }
            ActionKind::WriteStructuredConfig { path, data, .. } => {
                let yaml = serde_yaml::to_string(data)
                    .with_context(|| format!("serialize yaml for {path}"))?;
                Block::code("yaml", note.or_else(|| Some(path.clone())), yaml.trim_end())
            }
            ActionKind::CopyFile { from, to } => {
                Block::code("bash", note, format!("cp {from} {to}"))
            }
            ActionKind::DisplaySource {
                target,
                lines,
                markers,
                ..
            } => match self.read_target(target) {
                Some(text) => Block::code(
                    guess_lang(target),
                    note.or_else(|| Some(target.clone())),
                    extract(&text, lines.as_ref(), markers.as_ref()),
                ),
                None => Block::code("text", note, target.clone()),
            },
            ActionKind::OpenUrl {
                url_or_route,
                params,
            } => Block::code("text", note, with_query(url_or_route, params)),
            ActionKind::VisitUrl { url_or_path, .. } => {
                Block::code("text", note, url_or_path.clone())
            }
            ActionKind::SetEnv { key, value, file } => Block::code(
                "dotenv",
                note.or_else(|| Some(file.clone())),
                format!("{}={value}", normalize_key(key)),
            ),
            ActionKind::ReplaceInFile {
                path,
                pattern,
                replacement,
                ..
            } => Block::code(
                "text",
                note.or_else(|| Some(path.clone())),
                format!("s/{pattern}/{replacement}/"),
            ),
            ActionKind::RunInlineCode { .. } => Block::code("text", note, "[closure]"),
            ActionKind::Guarded {
                action: inner,
                path,
                predicate,
            } => {
                let start = blocks.len();
                self.push_blocks(inner, blocks)?;
                let condition = format!("if {} {path}", predicate.as_str());
                for block in &mut blocks[start..] {
                    block.title = Some(match block.title.take() {
                        Some(title) => format!("{title} ({condition})"),
                        None => condition.clone(),
                    });
                }
                return Ok(());
            }
            ActionKind::Unknown => return Ok(()),
        };
        blocks.push(block);
        Ok(())
    }

    fn read_target(&self, target: &str) -> Option<String> {
        let dir = self.project_dir.as_deref()?;
        let path = crate::core::path::resolve(dir, target);
        if !path.is_file() {
            return None;
        }
        fs::read_to_string(path).ok()
    }
}

/// Render `task` as Markdown, inlining display targets found under `project_dir`.
pub fn render_markdown(task: &Task, project_dir: Option<&Path>) -> Result<String> {
    let renderer = MarkdownRenderer::new()?;
    let renderer = match project_dir {
        Some(dir) => renderer.with_project_dir(dir),
        None => renderer,
    };
    renderer.render_task(task)
}
