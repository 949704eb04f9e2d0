//! Interning of commit objects.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::git::{Commit, NonZeroOid};

/// Maps each OID to the one shared [`Commit`] instance for it.
///
/// Histories of different references overlap heavily, so interning keeps a
/// single allocation per commit and lets readers compare commits by pointer
/// before falling back to comparing OIDs.
#[derive(Debug, Default)]
pub struct CommitCache {
    commits: Mutex<HashMap<NonZeroOid, Arc<Commit>>>,
}

impl CommitCache {
    /// Constructor.
    pub fn new() -> Self {
        Default::default()
    }

    /// Return the shared instance for `commit`'s OID, inserting `commit` if
    /// this is the first time the OID has been seen.
    pub fn intern(&self, commit: Commit) -> Arc<Commit> {
        let mut commits = self.commits.lock().expect("Poisoned mutex for CommitCache");
        Arc::clone(
            commits
                .entry(commit.get_oid())
                .or_insert_with(|| Arc::new(commit)),
        )
    }

    /// Look up a commit which has already been interned.
    pub fn get(&self, oid: NonZeroOid) -> Option<Arc<Commit>> {
        let commits = self.commits.lock().expect("Poisoned mutex for CommitCache");
        commits.get(&oid).cloned()
    }

    /// The number of distinct commits held.
    pub fn len(&self) -> usize {
        self.commits
            .lock()
            .expect("Poisoned mutex for CommitCache")
            .len()
    }

    #[allow(missing_docs)]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every cached commit. Histories keep their own references to the
    /// commits they hold.
    pub fn clear(&self) {
        self.commits
            .lock()
            .expect("Poisoned mutex for CommitCache")
            .clear();
    }
}
