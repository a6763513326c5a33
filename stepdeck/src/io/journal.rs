//! Append-only run journal (`.stepdeck/runs/<deck>.jsonl`).
//!
//! One JSON object per line records task runs and every finished process.
//! Journal writes never fail an execution: errors are logged and dropped.

use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::io::process::CommandResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalEvent {
    TaskRunStarted,
    ProcessFinished,
    TaskRunFinished,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JournalEntry {
    pub ts: String,
    #[serde(rename = "type")]
    pub event: JournalEvent,
    pub run_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deck: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmdline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
}

impl JournalEntry {
    fn new(event: JournalEvent, run_id: &str) -> Self {
        Self {
            ts: timestamp(),
            event,
            run_id: run_id.to_string(),
            deck: None,
            task_name: None,
            step: None,
            working_dir: None,
            cmdline: None,
            exit_code: None,
        }
    }
}

/// `YYYYMMDDTHHMMSS-<16 hex chars>`.
pub fn generate_run_id() -> String {
    let suffix: [u8; 8] = rand::random();
    format!("{}-{}", Local::now().format("%Y%m%dT%H%M%S"), hex::encode(suffix))
}

fn timestamp() -> String {
    Local::now().to_rfc3339_opts(SecondsFormat::Secs, false)
}

/// Open handle on a deck's journal file. Flushed on drop.
#[derive(Debug)]
pub struct RunJournal {
    path: PathBuf,
    deck: String,
    writer: BufWriter<File>,
}

impl RunJournal {
    pub fn open(path: &Path, deck: &str) -> Result<Self> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("create journal dir {}", parent.display()))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("open journal {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            deck: deck.to_string(),
            writer: BufWriter::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn task_started(&mut self, run_id: &str, task: &str, working_dir: &Path) {
        let mut entry = JournalEntry::new(JournalEvent::TaskRunStarted, run_id);
        entry.deck = Some(self.deck.clone());
        entry.task_name = Some(task.to_string());
        entry.working_dir = Some(working_dir.display().to_string());
        self.append(&entry);
    }

    pub fn process_finished(&mut self, run_id: &str, step: &str, result: &CommandResult) {
        let mut entry = JournalEntry::new(JournalEvent::ProcessFinished, run_id);
        entry.step = Some(step.to_string());
        entry.cmdline = Some(result.command.clone());
        entry.exit_code = Some(result.exit_code);
        self.append(&entry);
    }

    pub fn task_finished(&mut self, run_id: &str, task: &str, exit_code: i32) {
        let mut entry = JournalEntry::new(JournalEvent::TaskRunFinished, run_id);
        entry.deck = Some(self.deck.clone());
        entry.task_name = Some(task.to_string());
        entry.exit_code = Some(exit_code);
        self.append(&entry);
    }

    fn append(&mut self, entry: &JournalEntry) {
        let line = match serde_json::to_string(entry) {
            Ok(line) => line,
            Err(err) => {
                warn!(err = %err, "failed to encode journal entry");
                return;
            }
        };
        let written = writeln!(self.writer, "{line}").and_then(|()| self.writer.flush());
        if let Err(err) = written {
            warn!(err = %err, path = %self.path.display(), "failed to append journal entry");
        }
    }
}

impl Drop for RunJournal {
    fn drop(&mut self) {
        if let Err(err) = self.writer.flush() {
            warn!(err = %err, path = %self.path.display(), "failed to flush journal");
        }
    }
}

/// Parse every entry of a journal file. Malformed lines are skipped.
pub fn read_journal(path: &Path) -> Result<Vec<JournalEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    Ok(contents
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match serde_json::from_str(line) {
            Ok(entry) => Some(entry),
            Err(err) => {
                warn!(err = %err, "skipping malformed journal line");
                None
            }
        })
        .collect())
}

/// The last `n` entries of a journal file, oldest first.
pub fn tail_journal(path: &Path, n: usize) -> Result<Vec<JournalEntry>> {
    let mut entries = read_journal(path)?;
    let keep_from = entries.len().saturating_sub(n);
    Ok(entries.split_off(keep_from))
}
