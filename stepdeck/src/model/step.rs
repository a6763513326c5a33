//! Steps, tasks and decks.

use serde::{Deserialize, Serialize};

use crate::model::action::Action;

/// A presentable unit: narrative plus an ordered list of actions.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Step {
    pub title: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub bullets: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    #[serde(default)]
    pub actions: Vec<Action>,
}

impl Step {
    pub fn builder(title: impl Into<String>) -> StepBuilder {
        StepBuilder {
            step: Step {
                title: title.into(),
                ..Step::default()
            },
        }
    }
}

/// Fluent construction for steps defined in code.
#[derive(Debug)]
pub struct StepBuilder {
    step: Step,
}

impl StepBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.step.description = description.into();
        self
    }

    pub fn bullet(mut self, bullet: impl Into<String>) -> Self {
        self.step.bullets.push(bullet.into());
        self
    }

    pub fn note(mut self, note: impl Into<String>) -> Self {
        self.step.notes.push(note.into());
        self
    }

    pub fn group(mut self, group: impl Into<String>) -> Self {
        self.step.group = Some(group.into());
        self
    }

    pub fn action(mut self, action: Action) -> Self {
        self.step.actions.push(action);
        self
    }

    pub fn build(self) -> Step {
        self.step
    }
}

/// Named, ordered sequence of steps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Task {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub steps: Vec<Step>,
}

/// A deck file: an optional code plus its tasks.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Deck {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl Deck {
    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_keeps_action_order() {
        let step = Step::builder("Install")
            .description("Pull dependencies")
            .bullet("composer")
            .action(Action::shell("composer install"))
            .action(Action::slide_break())
            .build();
        assert_eq!(step.title, "Install");
        assert_eq!(step.bullets, vec!["composer".to_string()]);
        assert_eq!(step.actions.len(), 2);
        assert_eq!(step.actions[1].kind.type_name(), "SlideBreakMarker");
    }
}
