//! Core algorithms and data structures.

pub mod cache;
pub mod commit_set;
pub mod config;
pub mod exit;
pub mod formatting;
pub mod graph;
pub mod history;
pub mod references;
pub mod repo_data;
pub mod source;
pub mod task;
pub mod update;
