//! Everything known about one repository, wired together.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use eyre::Context;
use tracing::{debug, error, instrument};

use crate::core::cache::CommitCache;
use crate::core::commit_set::CommitSet;
use crate::core::config::{get_history_config, HistoryConfig};
use crate::core::exit::ExitFlag;
use crate::core::history::{Error, HistoryRegistry};
use crate::core::references::{ReferenceDiff, ReferenceSet};
use crate::core::source::CommitSource;
use crate::core::update::{update_pipeline, UpdatePipeline};
use crate::git::{ReferenceName, Repo};

/// Owns the commit cache, the references, the per-reference histories and
/// the worker which keeps those histories in step with the references.
pub struct RepositoryData {
    cache: Arc<CommitCache>,
    exit_flag: ExitFlag,
    references: Arc<ReferenceSet>,
    registry: Arc<HistoryRegistry>,
    pipeline: UpdatePipeline,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RepositoryData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RepositoryData")
            .field("references", &self.references)
            .field("registry", &self.registry)
            .field("pipeline", &self.pipeline)
            .finish()
    }
}

impl RepositoryData {
    /// Wire up a repository read through `source`, and start the update
    /// worker. `cache` should be the cache `source` interns commits in.
    pub fn new(
        source: Arc<dyn CommitSource>,
        cache: Arc<CommitCache>,
        exit_flag: ExitFlag,
        config: HistoryConfig,
    ) -> Self {
        let references = Arc::new(ReferenceSet::new(Arc::clone(&source)));
        let registry = Arc::new(HistoryRegistry::new(source, Arc::clone(&cache), config));
        let (pipeline, queue) = update_pipeline(config.update_queue_capacity);
        let worker = queue.spawn_worker(Arc::clone(&registry));
        RepositoryData {
            cache,
            exit_flag,
            references,
            registry,
            pipeline,
            worker: Mutex::new(Some(worker)),
        }
    }

    /// Open the Git repository containing `path`, configured from its
    /// `lanes.*` settings.
    #[instrument]
    pub fn open(path: &Path) -> eyre::Result<Self> {
        let cache = Arc::new(CommitCache::new());
        let exit_flag = ExitFlag::new();
        let repo = Repo::from_dir(path, Arc::clone(&cache), exit_flag.clone())
            .wrap_err_with(|| format!("Opening repository at {path:?}"))?;
        let config = get_history_config(&repo)?;
        debug!(?config, "Read history config");
        Ok(Self::new(Arc::new(repo), cache, exit_flag, config))
    }

    #[allow(missing_docs)]
    pub fn cache(&self) -> &Arc<CommitCache> {
        &self.cache
    }

    #[allow(missing_docs)]
    pub fn exit_flag(&self) -> &ExitFlag {
        &self.exit_flag
    }

    #[allow(missing_docs)]
    pub fn references(&self) -> &Arc<ReferenceSet> {
        &self.references
    }

    #[allow(missing_docs)]
    pub fn registry(&self) -> &Arc<HistoryRegistry> {
        &self.registry
    }

    #[allow(missing_docs)]
    pub fn pipeline(&self) -> &UpdatePipeline {
        &self.pipeline
    }

    /// Reload the references. Moved references are handed to the update
    /// worker to patch their histories; histories of removed references are
    /// dropped.
    #[instrument]
    pub fn refresh_references(&self) -> Result<ReferenceDiff, Error> {
        let diff = self.references.reload()?;
        for updated in &diff.updated {
            self.pipeline.submit(updated.clone());
        }
        for removed in &diff.removed {
            if self.registry.forget(removed.get_name()) {
                debug!(reference = %removed.get_name(), "Dropped history of removed reference");
            }
        }
        Ok(diff)
    }

    /// Load the history of the reference called `name`, as of the last
    /// reference refresh.
    pub fn load_history(&self, name: &ReferenceName) -> Result<Arc<CommitSet>, Error> {
        let reference = self
            .references
            .find(name)
            .ok_or_else(|| Error::NoHistory { name: name.clone() })?;
        self.registry.load_history(&reference)
    }

    /// Stop all background work: raise the exit flag, close the update queue
    /// and wait for the worker to finish.
    pub fn shutdown(&self) {
        self.exit_flag.raise();
        self.pipeline.close();
        let worker = self
            .worker
            .lock()
            .expect("Poisoned mutex for RepositoryData worker")
            .take();
        if let Some(worker) = worker {
            if worker.join().is_err() {
                error!("Update worker panicked");
            }
        }
    }
}

impl Drop for RepositoryData {
    fn drop(&mut self) {
        self.shutdown();
    }
}
