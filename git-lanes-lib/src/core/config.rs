//! Accessors for configuration values.

use tracing::{instrument, warn};

use crate::core::commit_set::DEFAULT_FAST_PATH_WINDOW;
use crate::core::update::DEFAULT_UPDATE_QUEUE_CAPACITY;
use crate::git::Repo;

/// Tunables for the history engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryConfig {
    /// How many reference updates may wait for the update worker before
    /// further ones are dropped.
    pub update_queue_capacity: usize,

    /// How many leading commits are compared directly when locating a merge
    /// base, before searching by date.
    pub fast_path_window: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        HistoryConfig {
            update_queue_capacity: DEFAULT_UPDATE_QUEUE_CAPACITY,
            fast_path_window: DEFAULT_FAST_PATH_WINDOW,
        }
    }
}

fn get_count(repo: &Repo, key: &str, default: usize) -> eyre::Result<usize> {
    let fallback = i64::try_from(default).unwrap_or(i64::MAX);
    let value: i64 = repo.get_readonly_config()?.get_or(key, fallback)?;
    match usize::try_from(value) {
        Ok(value) if value > 0 => Ok(value),
        _ => {
            warn!(?key, ?value, ?default, "Ignoring invalid config value");
            Ok(default)
        }
    }
}

/// Read the history engine's tunables from the repository's config, falling
/// back to the defaults for anything unset.
#[instrument]
pub fn get_history_config(repo: &Repo) -> eyre::Result<HistoryConfig> {
    let default = HistoryConfig::default();
    Ok(HistoryConfig {
        update_queue_capacity: get_count(
            repo,
            "lanes.history.updateQueueCapacity",
            default.update_queue_capacity,
        )?,
        fast_path_window: get_count(
            repo,
            "lanes.history.fastPathWindow",
            default.fast_path_window,
        )?,
    })
}

/// Whether to draw graphs with Unicode box-drawing characters. `None` means
/// to decide based on whether the output is a terminal.
#[instrument]
pub fn get_graph_unicode(repo: &Repo) -> eyre::Result<Option<bool>> {
    repo.get_readonly_config()?.get("lanes.graph.unicode")
}
