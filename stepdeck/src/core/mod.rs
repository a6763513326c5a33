//! Deterministic, pure logic shared by the step engine.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod commands;
pub mod key;
pub mod links;
pub mod merge;
pub mod path;
pub mod shell;
pub mod snippet;
