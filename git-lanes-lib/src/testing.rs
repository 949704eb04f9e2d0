//! Testing utilities.
//!
//! This is inside `src` rather than `tests` since we use this code in some unit
//! tests.

use std::collections::{HashMap, HashSet, VecDeque};
use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use eyre::Context;
use itertools::Itertools;
use tempfile::TempDir;

use crate::core::cache::CommitCache;
use crate::core::exit::ExitFlag;
use crate::core::source::{CommitSink, CommitSource};
use crate::git::{AheadBehind, Commit, NonZeroOid, Reference, Signature, Time};

const DUMMY_NAME: &str = "Testy McTestface";
const DUMMY_EMAIL: &str = "test@example.com";

/// A made-up OID for test commit number `id`. `id` must not be zero.
pub fn fake_oid(id: u32) -> NonZeroOid {
    format!("{id:040x}")
        .parse()
        .expect("Test OIDs must be non-zero")
}

/// Make a commit with OID [`fake_oid`]`(id)`, committed at `time` seconds
/// past the epoch, with message `commit <id>`.
pub fn make_commit(id: u32, parents: &[u32], time: i64) -> Commit {
    make_authored_commit(id, parents, time, DUMMY_NAME, &format!("commit {id}"))
}

/// Like [`make_commit`], with the given author name and message.
pub fn make_authored_commit(
    id: u32,
    parents: &[u32],
    time: i64,
    author_name: &str,
    message: &str,
) -> Commit {
    let time = Time::new(time, 0);
    Commit::new(
        fake_oid(id),
        parents.iter().copied().map(fake_oid).collect(),
        Signature::new(author_name, DUMMY_EMAIL, time),
        Signature::new(DUMMY_NAME, DUMMY_EMAIL, time),
        message,
    )
}

/// An in-memory [`CommitSource`] over a hand-built commit graph.
pub struct FakeCommitSource {
    cache: Arc<CommitCache>,
    commits: RwLock<HashMap<NonZeroOid, Arc<Commit>>>,
    references: Mutex<Vec<Reference>>,
    exit_flag: ExitFlag,
    fail_walks_after: Mutex<Option<usize>>,
}

impl std::fmt::Debug for FakeCommitSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<FakeCommitSource>")
    }
}

impl FakeCommitSource {
    /// Constructor. Commits added to the source are interned in `cache`.
    pub fn new(cache: Arc<CommitCache>) -> Self {
        FakeCommitSource {
            cache,
            commits: Default::default(),
            references: Default::default(),
            exit_flag: ExitFlag::new(),
            fail_walks_after: Default::default(),
        }
    }

    /// Add a commit to the graph.
    pub fn add_commit(&self, commit: Commit) -> Arc<Commit> {
        let commit = self.cache.intern(commit);
        self.commits
            .write()
            .expect("Poisoned lock for FakeCommitSource")
            .insert(commit.get_oid(), Arc::clone(&commit));
        commit
    }

    /// Add several commits to the graph.
    pub fn add_commits(&self, commits: impl IntoIterator<Item = Commit>) {
        for commit in commits {
            self.add_commit(commit);
        }
    }

    /// Set what [`CommitSource::load_references`] returns.
    pub fn set_references(&self, references: Vec<Reference>) {
        *self
            .references
            .lock()
            .expect("Poisoned mutex for FakeCommitSource") = references;
    }

    /// Make [`CommitSource::commits_from`] fail after producing `count`
    /// commits.
    pub fn fail_walks_after(&self, count: usize) {
        *self
            .fail_walks_after
            .lock()
            .expect("Poisoned mutex for FakeCommitSource") = Some(count);
    }

    /// The cache which commits added to the source are interned in.
    pub fn cache(&self) -> &Arc<CommitCache> {
        &self.cache
    }

    /// The flag polled by [`CommitSource::is_exiting`].
    pub fn exit_flag(&self) -> &ExitFlag {
        &self.exit_flag
    }

    fn reachable(&self, start: NonZeroOid) -> HashSet<NonZeroOid> {
        let commits = self.commits.read().expect("Poisoned lock for FakeCommitSource");
        let mut seen = HashSet::new();
        let mut queue = VecDeque::from([start]);
        while let Some(oid) = queue.pop_front() {
            if !seen.insert(oid) {
                continue;
            }
            if let Some(commit) = commits.get(&oid) {
                queue.extend(commit.get_parent_oids().iter().copied());
            }
        }
        seen
    }

    /// The known commits among `oids`, newest first.
    fn sorted(&self, oids: impl IntoIterator<Item = NonZeroOid>) -> Vec<Arc<Commit>> {
        let commits = self.commits.read().expect("Poisoned lock for FakeCommitSource");
        oids.into_iter()
            .filter_map(|oid| commits.get(&oid).cloned())
            .sorted_by(|lhs, rhs| {
                rhs.get_time()
                    .cmp(&lhs.get_time())
                    .then_with(|| rhs.get_oid().cmp(&lhs.get_oid()))
            })
            .collect()
    }
}

impl CommitSource for FakeCommitSource {
    fn commits_from(&self, start: NonZeroOid, sink: &mut CommitSink<'_>) -> eyre::Result<()> {
        let fail_after = *self
            .fail_walks_after
            .lock()
            .expect("Poisoned mutex for FakeCommitSource");
        for (index, commit) in self.sorted(self.reachable(start)).into_iter().enumerate() {
            if fail_after == Some(index) {
                eyre::bail!("Simulated failure after {index} commits");
            }
            if sink(commit).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn commits_in_range(
        &self,
        exclude: NonZeroOid,
        include: NonZeroOid,
    ) -> eyre::Result<Vec<Arc<Commit>>> {
        let excluded = self.reachable(exclude);
        Ok(self.sorted(
            self.reachable(include)
                .into_iter()
                .filter(|oid| !excluded.contains(oid)),
        ))
    }

    fn merge_base(&self, lhs: NonZeroOid, rhs: NonZeroOid) -> eyre::Result<Option<NonZeroOid>> {
        let rhs_ancestors = self.reachable(rhs);
        let common = self
            .reachable(lhs)
            .into_iter()
            .filter(|oid| rhs_ancestors.contains(oid));
        Ok(self.sorted(common).first().map(|commit| commit.get_oid()))
    }

    fn ahead_behind(&self, local: NonZeroOid, upstream: NonZeroOid) -> eyre::Result<AheadBehind> {
        let local = self.reachable(local);
        let upstream = self.reachable(upstream);
        Ok(AheadBehind {
            ahead: local.difference(&upstream).count(),
            behind: upstream.difference(&local).count(),
        })
    }

    fn load_references(&self) -> eyre::Result<Vec<Reference>> {
        Ok(self
            .references
            .lock()
            .expect("Poisoned mutex for FakeCommitSource")
            .clone())
    }

    fn is_exiting(&self) -> bool {
        self.exit_flag.is_raised()
    }
}

/// Collect every commit a source produces from `start`.
pub fn collect_commits(
    source: &dyn CommitSource,
    start: NonZeroOid,
) -> eyre::Result<Vec<Arc<Commit>>> {
    let mut commits = Vec::new();
    source.commits_from(start, &mut |commit| {
        commits.push(commit);
        ControlFlow::Continue(())
    })?;
    Ok(commits)
}

/// A scratch Git repository on disk, deleted when dropped.
pub struct GitRepo {
    _temp_dir: TempDir,
    path: PathBuf,
    repo: git2::Repository,
}

impl std::fmt::Debug for GitRepo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<GitRepo at {:?}>", self.path)
    }
}

/// Create an empty Git repository in a temporary directory.
pub fn make_git_repo() -> eyre::Result<GitRepo> {
    let temp_dir = tempfile::tempdir().wrap_err("Creating temporary directory")?;
    let path = temp_dir.path().to_owned();
    let repo = git2::Repository::init(&path).wrap_err("Initializing repository")?;
    Ok(GitRepo {
        _temp_dir: temp_dir,
        path,
        repo,
    })
}

impl GitRepo {
    /// The working directory of the repository.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Commit an empty tree at `time` with the given parents, moving
    /// `update_ref` (e.g. `HEAD` or `refs/heads/main`) to the new commit if
    /// given.
    pub fn commit(
        &self,
        update_ref: Option<&str>,
        message: &str,
        time: i64,
        parents: &[NonZeroOid],
    ) -> eyre::Result<NonZeroOid> {
        let signature = git2::Signature::new(DUMMY_NAME, DUMMY_EMAIL, &git2::Time::new(time, 0))?;
        let tree_oid = self.repo.treebuilder(None)?.write()?;
        let tree = self.repo.find_tree(tree_oid)?;
        let parents = parents
            .iter()
            .map(|oid| self.repo.find_commit(oid.to_string().parse()?))
            .collect::<Result<Vec<_>, git2::Error>>()?;
        let parents = parents.iter().collect_vec();
        let oid = self
            .repo
            .commit(update_ref, &signature, &signature, message, &tree, &parents)
            .wrap_err_with(|| format!("Committing {message:?}"))?;
        Ok(oid.to_string().parse()?)
    }

    /// Create or move a reference, e.g. `refs/heads/feature`.
    pub fn set_reference(&self, name: &str, oid: NonZeroOid) -> eyre::Result<()> {
        self.repo
            .reference(name, oid.to_string().parse()?, true, "test")
            .wrap_err_with(|| format!("Setting reference {name:?}"))?;
        Ok(())
    }

    /// Create a symbolic reference, like `refs/remotes/origin/HEAD`.
    pub fn set_symbolic_reference(&self, name: &str, target: &str) -> eyre::Result<()> {
        self.repo
            .reference_symbolic(name, target, true, "test")
            .wrap_err_with(|| format!("Setting symbolic reference {name:?}"))?;
        Ok(())
    }

    /// Delete a reference.
    pub fn delete_reference(&self, name: &str) -> eyre::Result<()> {
        self.repo.find_reference(name)?.delete()?;
        Ok(())
    }

    /// Create an annotated tag pointing to `oid`.
    pub fn annotated_tag(&self, name: &str, oid: NonZeroOid) -> eyre::Result<()> {
        let signature = git2::Signature::new(DUMMY_NAME, DUMMY_EMAIL, &git2::Time::new(0, 0))?;
        let target = self.repo.find_object(oid.to_string().parse()?, None)?;
        self.repo
            .tag(name, &target, &signature, "test tag", false)
            .wrap_err_with(|| format!("Creating tag {name:?}"))?;
        Ok(())
    }

    /// Make `branch` (a short local branch name) track `remote_branch`
    /// (e.g. `origin/main`), adding the `origin` remote if needed.
    pub fn set_upstream(&self, branch: &str, remote_branch: &str) -> eyre::Result<()> {
        if self.repo.find_remote("origin").is_err() {
            self.repo.remote("origin", "https://example.com/repo.git")?;
        }
        let mut branch = self.repo.find_branch(branch, git2::BranchType::Local)?;
        branch.set_upstream(Some(remote_branch))?;
        Ok(())
    }

    /// Point `HEAD` at a branch.
    pub fn set_head(&self, name: &str) -> eyre::Result<()> {
        self.repo.set_head(name)?;
        Ok(())
    }

    /// Detach `HEAD` at `oid`.
    pub fn detach_head(&self, oid: NonZeroOid) -> eyre::Result<()> {
        self.repo.set_head_detached(oid.to_string().parse()?)?;
        Ok(())
    }

    /// Write a config value into the repository's local config.
    pub fn set_config_i64(&self, key: &str, value: i64) -> eyre::Result<()> {
        let mut config = crate::git::Config::from(self.repo.config()?);
        config.set_i64(key, value)
    }

    /// Write a config value into the repository's local config.
    pub fn set_config_str(&self, key: &str, value: &str) -> eyre::Result<()> {
        let mut config = crate::git::Config::from(self.repo.config()?);
        config.set_str(key, value)
    }
}
