//! Incremental, per-reference commit history for git-lanes.

#![warn(missing_docs)]
#![warn(clippy::all, clippy::as_conversions, clippy::clone_on_ref_ptr)]
#![allow(clippy::too_many_arguments)]

pub mod core;
pub mod git;
pub mod testing;
