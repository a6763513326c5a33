//! Side-effecting adapters: processes, filesystem, git, journal, config.

pub mod artifacts;
pub mod config;
pub mod env_file;
pub mod files;
pub mod git;
pub mod guards;
pub mod journal;
pub mod process;
