//! Step and action data model.

pub mod action;
pub mod context;
pub mod step;
