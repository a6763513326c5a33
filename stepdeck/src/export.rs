//! JSON export of a deck, with each action's key and summary.

use serde::Serialize;

use crate::core::key::{ActionKey, derive_key};
use crate::deck::LoadedDeck;
use crate::model::action::Action;
use crate::model::step::Step;

#[derive(Debug, Serialize)]
pub struct ExportedDeck<'a> {
    pub code: &'a str,
    pub path: String,
    pub tasks: Vec<ExportedTask<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ExportedTask<'a> {
    pub name: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<&'a str>,
    pub steps: Vec<ExportedStep<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ExportedStep<'a> {
    pub title: &'a str,
    pub description: &'a str,
    pub bullets: &'a [String],
    pub notes: &'a [String],
    pub group: Option<&'a str>,
    pub actions: Vec<ExportedAction<'a>>,
}

#[derive(Debug, Serialize)]
pub struct ExportedAction<'a> {
    pub key: ActionKey,
    pub summary: String,
    #[serde(flatten)]
    pub action: &'a Action,
}

pub fn export_deck(loaded: &LoadedDeck) -> ExportedDeck<'_> {
    ExportedDeck {
        code: &loaded.code,
        path: loaded.path.display().to_string(),
        tasks: loaded
            .deck
            .tasks
            .iter()
            .map(|task| ExportedTask {
                name: &task.name,
                description: task.description.as_deref(),
                steps: task.steps.iter().map(export_step).collect(),
            })
            .collect(),
    }
}

pub fn export_step(step: &Step) -> ExportedStep<'_> {
    ExportedStep {
        title: &step.title,
        description: &step.description,
        bullets: &step.bullets,
        notes: &step.notes,
        group: step.group.as_deref(),
        actions: step
            .actions
            .iter()
            .enumerate()
            .map(|(index, action)| ExportedAction {
                key: derive_key(action, index),
                summary: action.summary(),
                action,
            })
            .collect(),
    }
}
