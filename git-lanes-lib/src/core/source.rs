//! The interface to whatever supplies commits and references.

use std::ops::ControlFlow;
use std::sync::Arc;

use crate::git::{AheadBehind, Commit, NonZeroOid, Reference};

/// Decides, per commit, whether to keep walking.
pub type CommitSink<'a> = dyn FnMut(Arc<Commit>) -> ControlFlow<()> + 'a;

/// Reads history out of a repository. The history engine never opens
/// repositories itself; it is handed one of these.
///
/// All walks are in date-descending order, like `git log`.
pub trait CommitSource: Send + Sync {
    /// Walk every commit reachable from `start`, handing each one to `sink`
    /// until it returns [`ControlFlow::Break`] or history runs out.
    fn commits_from(&self, start: NonZeroOid, sink: &mut CommitSink<'_>) -> eyre::Result<()>;

    /// The commits reachable from `include` but not from `exclude`, i.e.
    /// `exclude..include`.
    fn commits_in_range(
        &self,
        exclude: NonZeroOid,
        include: NonZeroOid,
    ) -> eyre::Result<Vec<Arc<Commit>>>;

    /// The nearest common ancestor of two commits, or `None` if their
    /// histories are unrelated.
    fn merge_base(&self, lhs: NonZeroOid, rhs: NonZeroOid) -> eyre::Result<Option<NonZeroOid>>;

    /// How far `local` has diverged from `upstream`.
    fn ahead_behind(&self, local: NonZeroOid, upstream: NonZeroOid) -> eyre::Result<AheadBehind>;

    /// Every branch, tag and (if detached) `HEAD` in the repository.
    fn load_references(&self) -> eyre::Result<Vec<Reference>>;

    /// Whether the process is shutting down. Long walks poll this and stop
    /// early when it is set.
    fn is_exiting(&self) -> bool {
        false
    }
}
