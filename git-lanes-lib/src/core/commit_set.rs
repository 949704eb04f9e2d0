//! The ordered, filterable list of commits held for one reference.
//!
//! A [`CommitSet`] is a chain of links. The first link holds every commit
//! loaded for the reference, in the order the [`crate::core::source::CommitSource`]
//! produced them (newest first). Each further link narrows its parent with a
//! predicate. Only the last link (the leaf) is visible to readers; the
//! intermediate links are kept so that filters can be removed again, last
//! applied first removed, without reloading anything.

use std::collections::HashSet;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::instrument;

use crate::core::formatting::Pluralize;
use crate::core::graph::Graph;
use crate::core::history::Error;
use crate::git::{Commit, NonZeroOid};

/// A predicate over commits, typically compiled from a user's query.
pub type CommitPredicate = Arc<dyn Fn(&Commit) -> bool + Send + Sync>;

/// Wrap a closure as a [`CommitPredicate`].
pub fn commit_predicate(f: impl Fn(&Commit) -> bool + Send + Sync + 'static) -> CommitPredicate {
    Arc::new(f)
}

/// Number of leading commits checked directly when looking for a commit,
/// before falling back to a search by date.
pub const DEFAULT_FAST_PATH_WINDOW: usize = 5;

/// Information about the filters applied to a [`CommitSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FilterInfo {
    /// How many commits there were when the first filter was applied.
    pub unfiltered_commit_num: usize,

    /// How many filters are currently stacked.
    pub filters_applied: usize,
}

/// A point-in-time summary of a [`CommitSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CommitSetState {
    /// Whether commits are still being added.
    pub loading: bool,

    /// How many commits are visible, i.e. after filtering.
    pub commit_num: usize,

    /// Set if at least one filter is applied.
    pub filter_info: Option<FilterInfo>,
}

impl CommitSetState {
    /// A one-line status message, like `filter reduced 120 commits to 14`.
    pub fn describe(&self) -> String {
        let commits = |amount| Pluralize {
            determiner: None,
            amount,
            unit: ("commit", "commits"),
        };
        match self.filter_info {
            Some(FilterInfo {
                unfiltered_commit_num,
                filters_applied,
            }) => {
                let filters = if filters_applied == 1 {
                    "filter".to_string()
                } else {
                    format!("{filters_applied} filters")
                };
                format!(
                    "{filters} reduced {} to {}",
                    commits(unfiltered_commit_num),
                    self.commit_num
                )
            }
            None => commits(self.commit_num).to_string(),
        }
    }
}

/// The leaf-level effect of replacing the newest part of a history.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HistoryPatch {
    /// Index of the first row affected. Patches always replace a prefix, so
    /// this is the splice point, `0`.
    pub start: usize,

    /// How many previously visible commits were dropped.
    pub removed: usize,

    /// How many commits were inserted at `start`.
    pub inserted: usize,
}

enum Admission {
    All,
    Matching(CommitPredicate),
}

impl Admission {
    fn admits(&self, commit: &Commit) -> bool {
        match self {
            Admission::All => true,
            Admission::Matching(predicate) => predicate(commit),
        }
    }
}

struct Link {
    admission: Admission,
    commits: Vec<Arc<Commit>>,
    child: Option<Box<Link>>,
}

impl Link {
    fn new(admission: Admission, commits: Vec<Arc<Commit>>) -> Self {
        Link {
            admission,
            commits,
            child: None,
        }
    }

    fn leaf(&self) -> &Link {
        let mut link = self;
        while let Some(child) = &link.child {
            link = child;
        }
        link
    }

    fn depth(&self) -> usize {
        let mut depth = 0;
        let mut link = self;
        while let Some(child) = &link.child {
            depth += 1;
            link = child;
        }
        depth
    }

    fn add_commit(&mut self, commit: &Arc<Commit>) {
        if !self.admission.admits(commit) {
            return;
        }
        if let Some(child) = &mut self.child {
            child.add_commit(commit);
        }
        self.commits.push(Arc::clone(commit));
    }

    fn add_child(&mut self, predicate: CommitPredicate) {
        match &mut self.child {
            Some(child) => child.add_child(predicate),
            None => {
                let commits = self
                    .commits
                    .iter()
                    .filter(|commit| predicate(commit))
                    .cloned()
                    .collect();
                self.child = Some(Box::new(Link::new(Admission::Matching(predicate), commits)));
            }
        }
    }

    fn remove_last_child(&mut self) -> bool {
        let child_is_leaf = match &self.child {
            None => return false,
            Some(child) => child.child.is_none(),
        };
        if child_is_leaf {
            self.child = None;
            true
        } else {
            match &mut self.child {
                Some(child) => child.remove_last_child(),
                None => false,
            }
        }
    }

    /// Replace this link's commits that belong to `replaced` (which always
    /// form a prefix) with the admitted subset of `new_commits`. Returns the
    /// leaf's patch.
    fn splice_front(
        &mut self,
        replaced: &HashSet<NonZeroOid>,
        new_commits: &[Arc<Commit>],
    ) -> HistoryPatch {
        let removed = self
            .commits
            .iter()
            .take_while(|commit| replaced.contains(&commit.get_oid()))
            .count();
        let admitted: Vec<Arc<Commit>> = new_commits
            .iter()
            .filter(|commit| self.admission.admits(commit))
            .cloned()
            .collect();
        let patch = HistoryPatch {
            start: 0,
            removed,
            inserted: admitted.len(),
        };
        self.commits.splice(0..removed, admitted.iter().cloned());
        match &mut self.child {
            Some(child) => child.splice_front(replaced, &admitted),
            None => patch,
        }
    }
}

struct Chain {
    loading: bool,
    root: Link,

    /// The unfiltered commit count when the first filter went on.
    unfiltered_at_first_filter: Option<usize>,
}

/// The commits known for one reference, plus any filters stacked on them.
///
/// Readers ([`CommitSet::commit_at`], [`CommitSet::stream`], ...) only ever
/// see the leaf of the filter chain and may run concurrently with the single
/// task that is loading or patching the set.
pub struct CommitSet {
    chain: RwLock<Chain>,
}

impl std::fmt::Debug for CommitSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.chain.try_read() {
            Ok(chain) => write!(
                f,
                "<CommitSet loading={} commits={} filters={}>",
                chain.loading,
                chain.root.leaf().commits.len(),
                chain.root.depth()
            ),
            Err(_) => write!(f, "<CommitSet (locked)>"),
        }
    }
}

impl Default for CommitSet {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitSet {
    /// Make an empty set in the loading state.
    pub fn new() -> Self {
        CommitSet {
            chain: RwLock::new(Chain {
                loading: true,
                root: Link::new(Admission::All, Vec::new()),
                unfiltered_at_first_filter: None,
            }),
        }
    }

    /// Make a set holding `commits`, already loaded.
    pub fn from_commits(commits: impl IntoIterator<Item = Arc<Commit>>) -> Self {
        CommitSet {
            chain: RwLock::new(Chain {
                loading: false,
                root: Link::new(Admission::All, commits.into_iter().collect()),
                unfiltered_at_first_filter: None,
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, Chain> {
        self.chain.read().expect("Poisoned lock for CommitSet")
    }

    fn write(&self) -> RwLockWriteGuard<'_, Chain> {
        self.chain.write().expect("Poisoned lock for CommitSet")
    }

    /// Append a commit, which must be no newer than any commit already
    /// present. Filters see it too.
    pub fn add_commit(&self, commit: Arc<Commit>) -> Result<(), Error> {
        let mut chain = self.write();
        if !chain.loading {
            return Err(Error::NotLoading);
        }
        chain.root.add_commit(&commit);
        Ok(())
    }

    /// The visible commit at `index`, if there is one.
    pub fn commit_at(&self, index: usize) -> Option<Arc<Commit>> {
        self.read().root.leaf().commits.get(index).cloned()
    }

    /// Up to `count` visible commits starting at `start`.
    pub fn commits_window(&self, start: usize, count: usize) -> Vec<Arc<Commit>> {
        let chain = self.read();
        let commits = &chain.root.leaf().commits;
        commits
            .iter()
            .skip(start)
            .take(count)
            .cloned()
            .collect()
    }

    /// The number of visible commits.
    pub fn len(&self) -> usize {
        self.read().root.leaf().commits.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Where the commit with the given OID is among the visible commits.
    pub fn position(&self, oid: NonZeroOid) -> Option<usize> {
        self.read()
            .root
            .leaf()
            .commits
            .iter()
            .position(|commit| commit.get_oid() == oid)
    }

    /// Iterate over the visible commits. Each call starts a new cursor at
    /// the newest commit. Commits appended while iterating are picked up.
    pub fn stream(&self) -> CommitStream<'_> {
        CommitStream {
            set: self,
            index: 0,
        }
    }

    #[allow(missing_docs)]
    pub fn set_loading(&self, loading: bool) {
        self.write().loading = loading;
    }

    #[allow(missing_docs)]
    pub fn is_loading(&self) -> bool {
        self.read().loading
    }

    /// Summarize the loading flag, visible commit count and filters.
    pub fn state(&self) -> CommitSetState {
        let chain = self.read();
        let filters_applied = chain.root.depth();
        CommitSetState {
            loading: chain.loading,
            commit_num: chain.root.leaf().commits.len(),
            filter_info: if filters_applied == 0 {
                None
            } else {
                Some(FilterInfo {
                    unfiltered_commit_num: chain
                        .unfiltered_at_first_filter
                        .unwrap_or(chain.root.commits.len()),
                    filters_applied,
                })
            },
        }
    }

    /// Narrow the visible commits to those matching `predicate`. The commits
    /// currently visible are replayed through it; later additions are
    /// filtered as they arrive.
    #[instrument(skip(predicate))]
    pub fn add_filter(&self, predicate: CommitPredicate) {
        let mut chain = self.write();
        if chain.unfiltered_at_first_filter.is_none() {
            chain.unfiltered_at_first_filter = Some(chain.root.commits.len());
        }
        chain.root.add_child(predicate);
    }

    /// Undo the most recent [`CommitSet::add_filter`]. Returns `false` if no
    /// filter was applied.
    #[instrument]
    pub fn remove_filter(&self) -> bool {
        let mut chain = self.write();
        let removed = chain.root.remove_last_child();
        if chain.root.depth() == 0 {
            chain.unfiltered_at_first_filter = None;
        }
        removed
    }

    /// How many filters are stacked.
    pub fn filters_applied(&self) -> usize {
        self.read().root.depth()
    }

    /// Replace the first `replaced` unfiltered commits with `new_commits`,
    /// keeping the rest of the history as it is. Filters are patched the same
    /// way. The set must be loading.
    pub fn splice_front(
        &self,
        replaced: usize,
        new_commits: &[Arc<Commit>],
    ) -> Result<HistoryPatch, Error> {
        let mut chain = self.write();
        if !chain.loading {
            return Err(Error::NotLoading);
        }
        let replaced = replaced.min(chain.root.commits.len());
        let replaced_oids: HashSet<NonZeroOid> = chain.root.commits[..replaced]
            .iter()
            .map(|commit| commit.get_oid())
            .collect();
        Ok(chain.root.splice_front(&replaced_oids, new_commits))
    }

    /// Locate `target` among the unfiltered commits. See
    /// [`find_commit_index`].
    pub fn find_unfiltered(&self, target: &Commit, fast_path_window: usize) -> Result<usize, usize> {
        find_commit_index(&self.read().root.commits, target, fast_path_window)
    }

    /// Locate a commit among the unfiltered commits by OID alone, for when
    /// its date isn't known.
    pub fn unfiltered_position(&self, oid: NonZeroOid) -> Option<usize> {
        self.read()
            .root
            .commits
            .iter()
            .position(|commit| commit.get_oid() == oid)
    }

    /// The number of commits before any filtering.
    pub fn unfiltered_len(&self) -> usize {
        self.read().root.commits.len()
    }

    /// Lay out the visible commits. The layout walks the unfiltered history
    /// so that lanes close at hidden commits too.
    pub fn graph(&self) -> Graph {
        let chain = self.read();
        let visible: HashSet<NonZeroOid> = chain
            .root
            .leaf()
            .commits
            .iter()
            .map(|commit| commit.get_oid())
            .collect();
        Graph::from_visible_commits(chain.root.commits.iter().cloned(), |commit| {
            visible.contains(&commit.get_oid())
        })
    }
}

/// Iterator returned by [`CommitSet::stream`].
pub struct CommitStream<'a> {
    set: &'a CommitSet,
    index: usize,
}

impl Iterator for CommitStream<'_> {
    type Item = Arc<Commit>;

    fn next(&mut self) -> Option<Self::Item> {
        let commit = self.set.commit_at(self.index)?;
        self.index += 1;
        Some(commit)
    }
}

/// Find `target` in `commits`, which are sorted newest first.
///
/// Returns `Ok(index)` if found. Otherwise returns `Err(index)`, where
/// `index` is the position `target` would occupy given its date, like
/// [`slice::binary_search`].
///
/// The first `fast_path_window` entries are checked directly, which covers
/// fast-forwards where the target is at or near the front. Otherwise the
/// commits sharing the target's date are located by binary search and probed
/// one by one. Histories which aren't strictly sorted (e.g. because of clock
/// skew between committers) are finally scanned linearly.
pub fn find_commit_index(
    commits: &[Arc<Commit>],
    target: &Commit,
    fast_path_window: usize,
) -> Result<usize, usize> {
    let is_target =
        |commit: &Arc<Commit>| std::ptr::eq(commit.as_ref(), target) || **commit == *target;

    if let Some(index) = commits.iter().take(fast_path_window).position(is_target) {
        return Ok(index);
    }

    let time = target.get_time();
    let first_not_newer = commits.partition_point(|commit| commit.get_time() > time);
    let same_time = commits[first_not_newer..].partition_point(|commit| commit.get_time() == time);
    if let Some(offset) = commits[first_not_newer..first_not_newer + same_time]
        .iter()
        .position(|commit| commit.get_oid() == target.get_oid())
    {
        return Ok(first_not_newer + offset);
    }

    match commits
        .iter()
        .position(|commit| commit.get_oid() == target.get_oid())
    {
        Some(index) => Ok(index),
        None => Err(first_not_newer),
    }
}
