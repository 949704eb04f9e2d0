//! The current set of references, and what changed between two loads of it.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use itertools::Itertools;
use tracing::{debug, error, instrument, warn};

use crate::core::history::Error;
use crate::core::source::CommitSource;
use crate::git::{Reference, ReferenceKind, ReferenceName, UpdatedReference};

/// The result of comparing two loads of the references. Each list is sorted
/// by reference name.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceDiff {
    /// References whose names were not present before.
    pub added: Vec<Reference>,

    /// References whose names are no longer present.
    pub removed: Vec<Reference>,

    /// References which now point to a different commit.
    pub updated: Vec<UpdatedReference>,
}

impl ReferenceDiff {
    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        let Self {
            added,
            removed,
            updated,
        } = self;
        added.is_empty() && removed.is_empty() && updated.is_empty()
    }
}

/// Receives news about references.
///
/// Each call to [`ReferenceSet::update`] produces exactly one call of each
/// method below. Each kind of notification is delivered from its own
/// background task, so there is no ordering between the kinds; a given kind is
/// delivered to the registered listeners one after another.
pub trait ReferenceListener: Send + Sync {
    /// References were added, removed or moved.
    fn on_references_changed(&self, _diff: &ReferenceDiff) {}

    /// What `HEAD` resolves to, before and after the update. The two may be
    /// equal.
    fn on_head_changed(&self, _old: Option<&Reference>, _new: Option<&Reference>) {}

    /// Local branches whose divergence from their upstream was recomputed,
    /// with the new counts filled in.
    fn on_tracking_branches_updated(&self, _branches: &[Reference]) {}
}

#[derive(Default)]
struct State {
    loading: bool,
    references: BTreeMap<ReferenceName, Reference>,

    /// Remote branch name to the local branches tracking it.
    tracking: HashMap<ReferenceName, Vec<ReferenceName>>,
}

impl State {
    fn head(&self) -> Option<&Reference> {
        self.references.values().find(|reference| reference.is_head())
    }
}

/// All references in a repository, as of the last completed load.
///
/// Loads are mutually exclusive: [`ReferenceSet::start_update`] claims the
/// load slot, and [`ReferenceSet::update`] (or
/// [`ReferenceSet::finish_update`]) releases it.
pub struct ReferenceSet {
    source: Arc<dyn CommitSource>,
    state: Arc<Mutex<State>>,
    listeners: Arc<RwLock<Vec<Arc<dyn ReferenceListener>>>>,
}

impl std::fmt::Debug for ReferenceSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.state.try_lock() {
            Ok(state) => write!(
                f,
                "<ReferenceSet loading={} references={}>",
                state.loading,
                state.references.len()
            ),
            Err(_) => write!(f, "<ReferenceSet (locked)>"),
        }
    }
}

impl ReferenceSet {
    /// Make an empty set. Ahead/behind counts are computed with `source`.
    pub fn new(source: Arc<dyn CommitSource>) -> Self {
        ReferenceSet {
            source,
            state: Default::default(),
            listeners: Default::default(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().expect("Poisoned mutex for ReferenceSet")
    }

    /// Register a listener for reference notifications.
    pub fn add_listener(&self, listener: Arc<dyn ReferenceListener>) {
        self.listeners
            .write()
            .expect("Poisoned lock for ReferenceSet listeners")
            .push(listener);
    }

    /// Claim the load slot. Returns `false` if another load holds it.
    pub fn start_update(&self) -> bool {
        let mut state = self.lock();
        if state.loading {
            false
        } else {
            state.loading = true;
            true
        }
    }

    /// Release the load slot without applying anything.
    pub fn finish_update(&self) {
        self.lock().loading = false;
    }

    /// Replace the references with `new_references`, which must have been
    /// read after a successful [`ReferenceSet::start_update`]. Returns the
    /// differences from the previous load and notifies listeners of them.
    #[instrument(skip(new_references))]
    pub fn update(&self, new_references: Vec<Reference>) -> Result<ReferenceDiff, Error> {
        let mut state = self.lock();
        if !state.loading {
            return Err(Error::NotLoading);
        }

        let mut new_map: BTreeMap<ReferenceName, Reference> = BTreeMap::new();
        for reference in new_references {
            if let Some(previous) = new_map.insert(reference.get_name().clone(), reference) {
                warn!(?previous, "Duplicate reference name in load; keeping the last one");
            }
        }

        let diff = diff_references(&state.references, &new_map);
        let to_recompute = carry_over_ahead_behind(&state.references, &mut new_map);
        let tracking = build_tracking_index(&new_map);

        let old_head = state.head().cloned();
        state.references = new_map;
        state.tracking = tracking;
        let new_head = state.head().cloned();
        state.loading = false;
        drop(state);

        debug!(
            added = diff.added.len(),
            removed = diff.removed.len(),
            updated = diff.updated.len(),
            recompute = to_recompute.len(),
            "Updated references"
        );
        self.notify(diff.clone(), old_head, new_head, to_recompute);
        Ok(diff)
    }

    /// Claim the load slot, read the references from the source, and apply
    /// them with [`ReferenceSet::update`].
    pub fn reload(&self) -> Result<ReferenceDiff, Error> {
        if !self.start_update() {
            return Err(Error::LoadInProgress);
        }
        match self.source.load_references() {
            Ok(references) => self.update(references),
            Err(err) => {
                self.finish_update();
                Err(Error::Source(err))
            }
        }
    }

    fn notify(
        &self,
        diff: ReferenceDiff,
        old_head: Option<Reference>,
        new_head: Option<Reference>,
        to_recompute: Vec<Reference>,
    ) {
        let listeners = Arc::clone(&self.listeners);
        rayon::spawn(move || {
            for listener in read_listeners(&listeners) {
                listener.on_references_changed(&diff);
            }
        });

        let listeners = Arc::clone(&self.listeners);
        rayon::spawn(move || {
            for listener in read_listeners(&listeners) {
                listener.on_head_changed(old_head.as_ref(), new_head.as_ref());
            }
        });

        let listeners = Arc::clone(&self.listeners);
        let source = Arc::clone(&self.source);
        let state = Arc::clone(&self.state);
        rayon::spawn(move || {
            let branches = recompute_ahead_behind(source.as_ref(), &state, to_recompute);
            for listener in read_listeners(&listeners) {
                listener.on_tracking_branches_updated(&branches);
            }
        });
    }

    /// Every reference, sorted by name.
    pub fn references(&self) -> Vec<Reference> {
        self.lock().references.values().cloned().collect()
    }

    #[allow(missing_docs)]
    pub fn len(&self) -> usize {
        self.lock().references.len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn of_kind(&self, matches: impl Fn(&ReferenceKind) -> bool) -> Vec<Reference> {
        self.lock()
            .references
            .values()
            .filter(|reference| matches(reference.get_kind()))
            .cloned()
            .collect()
    }

    /// Local branches, sorted by name.
    pub fn local_branches(&self) -> Vec<Reference> {
        self.of_kind(|kind| matches!(kind, ReferenceKind::LocalBranch { .. }))
    }

    /// Remote branches, sorted by name.
    pub fn remote_branches(&self) -> Vec<Reference> {
        self.of_kind(|kind| matches!(kind, ReferenceKind::RemoteBranch))
    }

    /// Tags, sorted by name.
    pub fn tags(&self) -> Vec<Reference> {
        self.of_kind(|kind| matches!(kind, ReferenceKind::Tag))
    }

    /// The checked-out branch, or the detached `HEAD`.
    pub fn head(&self) -> Option<Reference> {
        self.lock().head().cloned()
    }

    #[allow(missing_docs)]
    pub fn find(&self, name: &ReferenceName) -> Option<Reference> {
        self.lock().references.get(name).cloned()
    }

    /// The local branches tracking the given remote branch.
    pub fn tracked_by(&self, remote: &ReferenceName) -> Vec<ReferenceName> {
        self.lock()
            .tracking
            .get(remote)
            .cloned()
            .unwrap_or_default()
    }

    /// The references whose rendered form (see
    /// [`Reference::friendly_describe`]) satisfies `predicate`.
    pub fn filtered(&self, predicate: impl Fn(&str) -> bool) -> Vec<Reference> {
        self.lock()
            .references
            .values()
            .filter(|reference| predicate(&reference.friendly_describe()))
            .cloned()
            .collect()
    }
}

fn read_listeners(
    listeners: &RwLock<Vec<Arc<dyn ReferenceListener>>>,
) -> Vec<Arc<dyn ReferenceListener>> {
    listeners
        .read()
        .expect("Poisoned lock for ReferenceSet listeners")
        .clone()
}

fn diff_references(
    old: &BTreeMap<ReferenceName, Reference>,
    new: &BTreeMap<ReferenceName, Reference>,
) -> ReferenceDiff {
    let added = new
        .iter()
        .filter(|(name, _)| !old.contains_key(*name))
        .map(|(_, reference)| reference.clone())
        .collect();
    let removed = old
        .iter()
        .filter(|(name, _)| !new.contains_key(*name))
        .map(|(_, reference)| reference.clone())
        .collect();
    let updated = new
        .iter()
        .filter_map(|(name, new_reference)| {
            let old_reference = old.get(name)?;
            if old_reference.get_oid() == new_reference.get_oid() {
                None
            } else {
                Some(UpdatedReference {
                    old: old_reference.clone(),
                    new: new_reference.clone(),
                })
            }
        })
        .collect();
    ReferenceDiff {
        added,
        removed,
        updated,
    }
}

/// Keep the known ahead/behind counts of local branches for which neither
/// side moved, and return the branches which need new counts, including
/// those which just stopped tracking anything.
fn carry_over_ahead_behind(
    old: &BTreeMap<ReferenceName, Reference>,
    new: &mut BTreeMap<ReferenceName, Reference>,
) -> Vec<Reference> {
    let oid_of = |references: &BTreeMap<ReferenceName, Reference>, name: &ReferenceName| {
        references.get(name).map(|reference| reference.get_oid())
    };

    let mut carried = Vec::new();
    let mut to_recompute = Vec::new();
    for (name, reference) in new.iter() {
        let upstream = match reference.get_upstream() {
            Some(upstream) => upstream,
            None => {
                // Its counts go away with the upstream.
                let had_upstream = old
                    .get(name)
                    .map_or(false, |old_reference| old_reference.get_upstream().is_some());
                if had_upstream {
                    to_recompute.push(reference.clone());
                }
                continue;
            }
        };
        let unchanged = match old.get(name) {
            Some(old_reference) => {
                old_reference.get_oid() == reference.get_oid()
                    && old_reference.get_upstream() == Some(upstream)
                    && oid_of(old, upstream) == oid_of(new, upstream)
                    && old_reference.get_ahead_behind().is_some()
            }
            None => false,
        };
        match (unchanged, old.get(name)) {
            (true, Some(old_reference)) => {
                carried.push((name.clone(), old_reference.get_ahead_behind()));
            }
            _ => to_recompute.push(reference.clone()),
        }
    }

    for (name, ahead_behind) in carried {
        if let Some(reference) = new.get_mut(&name) {
            reference.set_ahead_behind(ahead_behind);
        }
    }
    to_recompute
}

fn build_tracking_index(
    references: &BTreeMap<ReferenceName, Reference>,
) -> HashMap<ReferenceName, Vec<ReferenceName>> {
    references
        .values()
        .filter_map(|reference| {
            reference
                .get_upstream()
                .map(|upstream| (upstream.clone(), reference.get_name().clone()))
        })
        .into_group_map()
}

/// Compute ahead/behind for each of `branches` and store the results back
/// into `state`, as long as the branch hasn't moved in the meantime. Returns
/// the branches with their new counts.
fn recompute_ahead_behind(
    source: &dyn CommitSource,
    state: &Mutex<State>,
    branches: Vec<Reference>,
) -> Vec<Reference> {
    let mut updated = Vec::with_capacity(branches.len());
    for mut branch in branches {
        let upstream_oid = match branch.get_upstream() {
            None => None,
            Some(upstream_name) => {
                let state = state.lock().expect("Poisoned mutex for ReferenceSet");
                match state.references.get(upstream_name) {
                    Some(upstream) => match upstream.get_kind() {
                        ReferenceKind::RemoteBranch | ReferenceKind::LocalBranch { .. } => {
                            Some(upstream.get_oid())
                        }
                        ReferenceKind::Tag | ReferenceKind::DetachedHead => {
                            error!(
                                branch = %branch.get_name(),
                                upstream = %upstream_name,
                                "internal error: upstream is not a branch"
                            );
                            continue;
                        }
                    },
                    None => None,
                }
            }
        };

        let ahead_behind = match upstream_oid {
            None => None,
            Some(upstream_oid) => match source.ahead_behind(branch.get_oid(), upstream_oid) {
                Ok(ahead_behind) => Some(ahead_behind),
                Err(err) => {
                    warn!(branch = %branch.get_name(), %err, "Could not compute ahead/behind");
                    None
                }
            },
        };
        branch.set_ahead_behind(ahead_behind);

        let mut state = state.lock().expect("Poisoned mutex for ReferenceSet");
        match state.references.get_mut(branch.get_name()) {
            Some(current)
                if current.get_oid() == branch.get_oid()
                    && current.get_upstream() == branch.get_upstream() =>
            {
                current.set_ahead_behind(ahead_behind);
            }
            _ => {
                debug!(branch = %branch.get_name(), "Branch changed while computing ahead/behind");
            }
        }
        drop(state);
        updated.push(branch);
    }
    updated
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::fake_oid;

    fn to_map(references: Vec<Reference>) -> BTreeMap<ReferenceName, Reference> {
        references
            .into_iter()
            .map(|reference| (reference.get_name().clone(), reference))
            .collect()
    }

    #[test]
    fn test_carry_over_only_when_nothing_moved() {
        let mut old = to_map(vec![
            Reference::tracking_branch("refs/heads/main", fake_oid(1), "refs/remotes/origin/main"),
            Reference::tracking_branch("refs/heads/dev", fake_oid(2), "refs/remotes/origin/dev"),
            Reference::remote_branch("refs/remotes/origin/main", fake_oid(1)),
            Reference::remote_branch("refs/remotes/origin/dev", fake_oid(2)),
        ]);
        for reference in old.values_mut() {
            reference.set_ahead_behind(Some(Default::default()));
        }

        let mut new = to_map(vec![
            Reference::tracking_branch("refs/heads/main", fake_oid(1), "refs/remotes/origin/main"),
            Reference::tracking_branch("refs/heads/dev", fake_oid(2), "refs/remotes/origin/dev"),
            Reference::remote_branch("refs/remotes/origin/main", fake_oid(1)),
            Reference::remote_branch("refs/remotes/origin/dev", fake_oid(3)),
        ]);
        let to_recompute = carry_over_ahead_behind(&old, &mut new);
        assert_eq!(
            to_recompute
                .iter()
                .map(|reference| reference.get_name().as_str())
                .collect_vec(),
            vec!["refs/heads/dev"]
        );
        assert!(new[&ReferenceName::from("refs/heads/main")]
            .get_ahead_behind()
            .is_some());
    }

    #[test]
    fn test_tracking_index() {
        let references = to_map(vec![
            Reference::tracking_branch("refs/heads/a", fake_oid(1), "refs/remotes/origin/main"),
            Reference::tracking_branch("refs/heads/b", fake_oid(1), "refs/remotes/origin/main"),
            Reference::local_branch("refs/heads/c", fake_oid(1)),
        ]);
        let index = build_tracking_index(&references);
        assert_eq!(index.len(), 1);
        assert_eq!(
            index[&ReferenceName::from("refs/remotes/origin/main")],
            vec![
                ReferenceName::from("refs/heads/a"),
                ReferenceName::from("refs/heads/b")
            ]
        );
    }
}
