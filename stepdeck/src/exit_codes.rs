//! Stable exit codes for stepdeck CLI commands.

/// Command succeeded; every executed command exited zero.
pub const OK: i32 = 0;
/// Invalid deck, config, arguments, or an action error aborted the run.
pub const INVALID: i32 = 1;
/// The run completed but at least one command exited non-zero.
pub const STEP_FAILED: i32 = 2;
