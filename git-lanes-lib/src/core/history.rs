//! Keeps the commit history of every tracked reference.

use std::collections::{HashMap, HashSet};
use std::ops::ControlFlow;
use std::sync::{Arc, Mutex, RwLock};
use std::thread::JoinHandle;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::cache::CommitCache;
use crate::core::commit_set::{CommitPredicate, CommitSet, CommitSetState, HistoryPatch};
use crate::core::config::HistoryConfig;
use crate::core::graph::Graph;
use crate::core::source::CommitSource;
use crate::git::{Commit, Reference, ReferenceName, UpdatedReference};

/// Errors from operations on histories and reference sets. None of these are
/// fatal; they are reported to whoever asked for the operation.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("the operation requires a load to be in progress")]
    NotLoading,

    #[error("no history has been loaded for {name}")]
    NoHistory { name: ReferenceName },

    #[error("no filter is applied to the history of {name}")]
    NoFilterApplied { name: ReferenceName },

    #[error("a load is already in progress")]
    LoadInProgress,

    #[error("could not read from the repository: {0}")]
    Source(eyre::Report),
}

/// Receives news about histories. Callbacks run on the thread which did the
/// work (a loader thread or the update worker), never on the caller's thread.
pub trait HistoryListener: Send + Sync {
    /// A full load of `reference`'s history finished.
    fn on_history_loaded(&self, _reference: &Reference, _state: CommitSetState) {}

    /// `reference`'s history was patched in place after it moved. Rows
    /// outside of the patch are unchanged, apart from being shifted.
    fn on_history_patched(&self, _reference: &Reference, _patch: HistoryPatch) {}
}

struct Entry {
    reference: Reference,
    commits: Arc<CommitSet>,
}

/// Maps each reference to its [`CommitSet`] and keeps those sets current.
pub struct HistoryRegistry {
    source: Arc<dyn CommitSource>,
    cache: Arc<CommitCache>,
    config: HistoryConfig,
    entries: Mutex<HashMap<ReferenceName, Entry>>,
    loads_in_progress: Mutex<HashSet<ReferenceName>>,
    full_reload: Mutex<bool>,
    listeners: RwLock<Vec<Arc<dyn HistoryListener>>>,
}

impl std::fmt::Debug for HistoryRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HistoryRegistry")
            .field("config", &self.config)
            .field(
                "entries.len()",
                &match self.entries.try_lock() {
                    Ok(entries) => entries.len().to_string(),
                    Err(_) => "<could not determine>".to_string(),
                },
            )
            .finish()
    }
}

/// Releases a load slot when dropped, including on early return.
struct LoadSlot<'a> {
    loads_in_progress: &'a Mutex<HashSet<ReferenceName>>,
    name: ReferenceName,
}

impl Drop for LoadSlot<'_> {
    fn drop(&mut self) {
        let mut loads_in_progress = self
            .loads_in_progress
            .lock()
            .expect("Poisoned mutex for HistoryRegistry loads");
        loads_in_progress.remove(&self.name);
    }
}

impl HistoryRegistry {
    /// Constructor.
    pub fn new(
        source: Arc<dyn CommitSource>,
        cache: Arc<CommitCache>,
        config: HistoryConfig,
    ) -> Self {
        HistoryRegistry {
            source,
            cache,
            config,
            entries: Default::default(),
            loads_in_progress: Default::default(),
            full_reload: Default::default(),
            listeners: Default::default(),
        }
    }

    /// Register a listener for load and patch notifications.
    pub fn add_listener(&self, listener: Arc<dyn HistoryListener>) {
        self.listeners
            .write()
            .expect("Poisoned lock for HistoryRegistry listeners")
            .push(listener);
    }

    fn for_each_listener(&self, f: impl Fn(&dyn HistoryListener)) {
        let listeners = self
            .listeners
            .read()
            .expect("Poisoned lock for HistoryRegistry listeners");
        for listener in listeners.iter() {
            f(listener.as_ref());
        }
    }

    /// Load the full history of `reference`, replacing any history (and
    /// filters) previously held for it. Blocks until the walk is done, so it
    /// should be called off the UI thread; see
    /// [`HistoryRegistry::spawn_load_history`].
    ///
    /// Commits read before a failure are kept.
    #[instrument]
    pub fn load_history(&self, reference: &Reference) -> Result<Arc<CommitSet>, Error> {
        let name = reference.get_name().clone();
        let _slot = {
            let mut loads_in_progress = self
                .loads_in_progress
                .lock()
                .expect("Poisoned mutex for HistoryRegistry loads");
            if !loads_in_progress.insert(name.clone()) {
                return Err(Error::LoadInProgress);
            }
            LoadSlot {
                loads_in_progress: &self.loads_in_progress,
                name: name.clone(),
            }
        };

        let commits = Arc::new(CommitSet::new());
        self.entries
            .lock()
            .expect("Poisoned mutex for HistoryRegistry")
            .insert(
                name,
                Entry {
                    reference: reference.clone(),
                    commits: Arc::clone(&commits),
                },
            );

        let mut add_error = None;
        let walk_result = self.source.commits_from(reference.get_oid(), &mut |commit| {
            if self.source.is_exiting() {
                debug!("Exiting; abandoning history walk");
                return ControlFlow::Break(());
            }
            match commits.add_commit(commit) {
                Ok(()) => ControlFlow::Continue(()),
                Err(err) => {
                    add_error = Some(err);
                    ControlFlow::Break(())
                }
            }
        });
        commits.set_loading(false);

        if let Some(err) = add_error {
            return Err(err);
        }
        walk_result.map_err(Error::Source)?;

        let state = commits.state();
        debug!(?reference, ?state, "Loaded history");
        self.for_each_listener(|listener| listener.on_history_loaded(reference, state));
        Ok(commits)
    }

    /// Like [`HistoryRegistry::load_history`], but on a new thread.
    pub fn spawn_load_history(
        self: &Arc<Self>,
        reference: Reference,
    ) -> JoinHandle<Result<Arc<CommitSet>, Error>> {
        let registry = Arc::clone(self);
        std::thread::spawn(move || registry.load_history(&reference))
    }

    /// Reload the histories of all of `references`, one thread per
    /// reference. Only one full reload may run at a time. The results are in
    /// the same order as `references`.
    #[instrument(skip(references))]
    pub fn reload_all(
        &self,
        references: &[Reference],
    ) -> Result<Vec<Result<Arc<CommitSet>, Error>>, Error> {
        {
            let mut full_reload = self
                .full_reload
                .lock()
                .expect("Poisoned mutex for HistoryRegistry reload");
            if *full_reload {
                return Err(Error::LoadInProgress);
            }
            *full_reload = true;
        }

        let results = crossbeam::thread::scope(|scope| {
            let handles: Vec<_> = references
                .iter()
                .map(|reference| scope.spawn(move |_| self.load_history(reference)))
                .collect();
            handles
                .into_iter()
                .map(|handle| match handle.join() {
                    Ok(result) => result,
                    Err(_) => Err(Error::Source(eyre::eyre!("History loader thread panicked"))),
                })
                .collect::<Vec<_>>()
        });

        *self
            .full_reload
            .lock()
            .expect("Poisoned mutex for HistoryRegistry reload") = false;

        results.map_err(|_| Error::Source(eyre::eyre!("History reload panicked")))
    }

    /// The history held for the reference with the given name.
    pub fn history(&self, name: &ReferenceName) -> Option<Arc<CommitSet>> {
        self.entries
            .lock()
            .expect("Poisoned mutex for HistoryRegistry")
            .get(name)
            .map(|entry| Arc::clone(&entry.commits))
    }

    /// The reference value whose history is held under `name`. This follows
    /// the reference as patches are applied.
    pub fn reference(&self, name: &ReferenceName) -> Option<Reference> {
        self.entries
            .lock()
            .expect("Poisoned mutex for HistoryRegistry")
            .get(name)
            .map(|entry| entry.reference.clone())
    }

    fn require_history(&self, name: &ReferenceName) -> Result<Arc<CommitSet>, Error> {
        self.history(name)
            .ok_or_else(|| Error::NoHistory { name: name.clone() })
    }

    /// Drop the history of a reference, e.g. because it was deleted.
    pub fn forget(&self, name: &ReferenceName) -> bool {
        self.entries
            .lock()
            .expect("Poisoned mutex for HistoryRegistry")
            .remove(name)
            .is_some()
    }

    /// Up to `count` visible commits of `name`'s history, from `start`.
    pub fn commits_window(
        &self,
        name: &ReferenceName,
        start: usize,
        count: usize,
    ) -> Result<Vec<Arc<Commit>>, Error> {
        Ok(self.require_history(name)?.commits_window(start, count))
    }

    /// The visible commit at `index` of `name`'s history.
    pub fn commit_at_index(
        &self,
        name: &ReferenceName,
        index: usize,
    ) -> Result<Option<Arc<Commit>>, Error> {
        Ok(self.require_history(name)?.commit_at(index))
    }

    #[allow(missing_docs)]
    pub fn state(&self, name: &ReferenceName) -> Result<CommitSetState, Error> {
        Ok(self.require_history(name)?.state())
    }

    /// Stack a filter on `name`'s history.
    pub fn add_filter(&self, name: &ReferenceName, predicate: CommitPredicate) -> Result<(), Error> {
        self.require_history(name)?.add_filter(predicate);
        Ok(())
    }

    /// Remove the most recently added filter from `name`'s history.
    pub fn remove_filter(&self, name: &ReferenceName) -> Result<(), Error> {
        if self.require_history(name)?.remove_filter() {
            Ok(())
        } else {
            Err(Error::NoFilterApplied { name: name.clone() })
        }
    }

    /// Lay out the graph of `name`'s visible history. See
    /// [`CommitSet::graph`].
    pub fn graph(&self, name: &ReferenceName) -> Result<Graph, Error> {
        Ok(self.require_history(name)?.graph())
    }

    /// Patch the history held for `updated.old` so that it becomes the
    /// history of `updated.new`, reusing everything older than their merge
    /// base. Returns `None` if there was nothing to patch.
    #[instrument]
    pub fn apply_update(&self, updated: &UpdatedReference) -> Result<Option<HistoryPatch>, Error> {
        let UpdatedReference { old, new } = updated;
        let commits = {
            let entries = self.entries.lock().expect("Poisoned mutex for HistoryRegistry");
            match entries.get(old.get_name()) {
                Some(entry) if entry.reference.get_oid() == old.get_oid() => {
                    Arc::clone(&entry.commits)
                }
                Some(entry) => {
                    debug!(held = ?entry.reference, "History is for a different commit; not patching");
                    return Ok(None);
                }
                None => {
                    debug!("No history held; not patching");
                    return Ok(None);
                }
            }
        };
        if commits.is_loading() {
            warn!(reference = ?old.get_name(), "History is still loading; not patching");
            return Ok(None);
        }

        let merge_base = self
            .source
            .merge_base(new.get_oid(), old.get_oid())
            .map_err(Error::Source)?;
        let new_commits = self
            .source
            .commits_in_range(old.get_oid(), new.get_oid())
            .map_err(Error::Source)?;

        let splice_point = match merge_base {
            None => commits.unfiltered_len(),
            Some(merge_base_oid) => match self.cache.get(merge_base_oid) {
                Some(merge_base) => {
                    match commits.find_unfiltered(&merge_base, self.config.fast_path_window) {
                        Ok(index) | Err(index) => index,
                    }
                }
                None => commits
                    .unfiltered_position(merge_base_oid)
                    .unwrap_or_else(|| commits.unfiltered_len()),
            },
        };

        commits.set_loading(true);
        let patch = commits.splice_front(splice_point, &new_commits);
        commits.set_loading(false);
        let patch = patch?;

        if let Some(entry) = self
            .entries
            .lock()
            .expect("Poisoned mutex for HistoryRegistry")
            .get_mut(old.get_name())
        {
            entry.reference = new.clone();
        }

        debug!(?patch, ?splice_point, "Patched history");
        self.for_each_listener(|listener| listener.on_history_patched(new, patch));
        Ok(Some(patch))
    }
}
