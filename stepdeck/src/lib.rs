//! Step execution and artifact capture for scripted project walkthroughs.
//!
//! A deck holds named tasks; a task is an ordered list of steps; a step is a
//! titled list of actions. Running a step executes each action against a
//! working directory and records evidence (command logs, file snapshots, git
//! diffs) under a per-step artifact directory.
//!
//! - **[`core`]**: Pure logic (key derivation, shell sanitizing, YAML merge,
//!   snippet extraction, command assembly). No I/O.
//! - **[`io`]**: Side-effecting operations (processes, git, artifact files,
//!   config, run journal).
//! - **[`model`]**: Actions, steps, tasks and the execution context.
//!
//! [`execute`] coordinates the two; [`deck`], [`export`] and [`render`] back
//! the CLI commands.

pub mod core;
pub mod deck;
pub mod execute;
pub mod exit_codes;
pub mod export;
pub mod io;
pub mod logging;
pub mod model;
pub mod render;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
