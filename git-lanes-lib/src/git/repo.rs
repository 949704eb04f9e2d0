//! Operations on the Git repository. This module exists for a few reasons:
//!
//! - To ensure that every call to a Git operation has an associated `wrap_err`
//!   for use with `Try`.
//! - To improve the interface in some cases. In particular, some operations in
//!   `git2` return an `Option` instead of a `Result` with an error code.
//! - To share a repository between threads. `git2::Repository` is not `Sync`,
//!   so each thread borrows its own handle from a pool.

use std::ops::ControlFlow;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, instrument, warn};

use crate::core::cache::CommitCache;
use crate::core::exit::ExitFlag;
use crate::core::source::{CommitSink, CommitSource};
use crate::core::task::{Resource, ResourcePool};
use crate::git::config::Config;
use crate::git::oid::make_non_zero_oid;
use crate::git::{
    AheadBehind, CategorizedReferenceName, Commit, NonZeroOid, Reference, ReferenceKind,
    ReferenceName,
};

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("could not open repository: {0}")]
    OpenRepo(#[source] git2::Error),

    #[error("could not read config: {0}")]
    ReadConfig(#[source] git2::Error),

    #[error("could not find commit {oid}: {source}")]
    FindCommit {
        source: git2::Error,
        oid: NonZeroOid,
    },

    #[error("unexpected zero OID while walking history")]
    ZeroOid,

    #[error("could not walk history from {oid}: {source}")]
    WalkHistory {
        source: git2::Error,
        oid: NonZeroOid,
    },

    #[error("could not calculate merge-base between {lhs} and {rhs}: {source}")]
    FindMergeBase {
        source: git2::Error,
        lhs: NonZeroOid,
        rhs: NonZeroOid,
    },

    #[error("could not compare {local} with its upstream {upstream}: {source}")]
    AheadBehind {
        source: git2::Error,
        local: NonZeroOid,
        upstream: NonZeroOid,
    },

    #[error("could not read references: {0}")]
    ReadReferences(#[source] git2::Error),

    #[error("could not read HEAD: {0}")]
    ReadHead(#[source] git2::Error),

    #[error("interrupted while reading references")]
    Interrupted,
}

/// Result type.
pub type Result<T> = std::result::Result<T, RepoError>;

/// Convert a `git2::Error` into an `eyre::Error` with an auto-generated message.
pub(crate) fn wrap_git_error(error: git2::Error) -> eyre::Error {
    eyre::eyre!("Git error {:?}: {}", error.code(), error.message())
}

struct RepositoryOpener {
    path: PathBuf,
}

impl Resource for RepositoryOpener {
    type Output = git2::Repository;
    type Error = RepoError;

    fn try_create(&self) -> Result<Self::Output> {
        git2::Repository::open(&self.path).map_err(RepoError::OpenRepo)
    }
}

/// A Git repository, usable from any thread.
pub struct Repo {
    path: PathBuf,
    pool: ResourcePool<RepositoryOpener>,
    cache: Arc<CommitCache>,
    exit_flag: ExitFlag,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Git repository at: {:?}>", self.path)
    }
}

impl Repo {
    /// Get the Git repository containing the given directory. Commits read
    /// from it are interned in `cache`, and long walks stop once `exit_flag`
    /// is raised.
    #[instrument]
    pub fn from_dir(path: &Path, cache: Arc<CommitCache>, exit_flag: ExitFlag) -> Result<Self> {
        let repo = git2::Repository::discover(path).map_err(RepoError::OpenRepo)?;
        let path = repo.path().to_owned();
        Ok(Repo {
            pool: ResourcePool::new(RepositoryOpener { path: path.clone() }),
            path,
            cache,
            exit_flag,
        })
    }

    /// Get the path to the `.git` directory for the repository.
    pub fn get_path(&self) -> &Path {
        &self.path
    }

    /// The cache that commits read from this repository are interned in.
    pub fn get_commit_cache(&self) -> &Arc<CommitCache> {
        &self.cache
    }

    #[allow(missing_docs)]
    pub fn get_exit_flag(&self) -> &ExitFlag {
        &self.exit_flag
    }

    /// Get the configuration object for the repository.
    pub fn get_readonly_config(&self) -> Result<Config> {
        let config = self.pool.with(|repo| repo.config())?;
        Ok(Config::from(config.map_err(RepoError::ReadConfig)?))
    }

    /// Look up a commit by OID.
    #[instrument]
    pub fn find_commit(&self, oid: NonZeroOid) -> Result<Arc<Commit>> {
        self.pool.with(|repo| self.load_commit(repo, oid.inner))?
    }

    fn load_commit(&self, repo: &git2::Repository, oid: git2::Oid) -> Result<Arc<Commit>> {
        let non_zero_oid = make_non_zero_oid(oid).ok_or(RepoError::ZeroOid)?;
        if let Some(commit) = self.cache.get(non_zero_oid) {
            return Ok(commit);
        }
        let commit = repo
            .find_commit(oid)
            .map_err(|source| RepoError::FindCommit {
                source,
                oid: non_zero_oid,
            })?;
        let commit = Commit::from_git2(&commit).ok_or(RepoError::ZeroOid)?;
        Ok(self.cache.intern(commit))
    }

    fn walk(
        &self,
        repo: &git2::Repository,
        include: NonZeroOid,
        exclude: Option<NonZeroOid>,
        sink: &mut CommitSink<'_>,
    ) -> Result<()> {
        let walk_error = |source| RepoError::WalkHistory {
            source,
            oid: include,
        };
        let mut walk = repo.revwalk().map_err(walk_error)?;
        walk.set_sorting(git2::Sort::TIME).map_err(walk_error)?;
        walk.push(include.inner).map_err(walk_error)?;
        if let Some(exclude) = exclude {
            walk.hide(exclude.inner).map_err(walk_error)?;
        }

        for oid in walk {
            if self.exit_flag.is_raised() {
                debug!(?include, "Exiting; stopping history walk");
                break;
            }
            let commit = self.load_commit(repo, oid.map_err(walk_error)?)?;
            if sink(commit).is_break() {
                break;
            }
        }
        Ok(())
    }

    fn read_references(&self, repo: &git2::Repository) -> Result<Vec<Reference>> {
        let head_detached = match repo.head_detached() {
            Ok(head_detached) => head_detached,
            Err(err) if err.code() == git2::ErrorCode::UnbornBranch => false,
            Err(err) => return Err(RepoError::ReadHead(err)),
        };
        let head_name = if head_detached {
            None
        } else {
            match repo.find_reference("HEAD") {
                Ok(head) => head.symbolic_target().map(str::to_owned),
                Err(err) if err.code() == git2::ErrorCode::NotFound => None,
                Err(err) => return Err(RepoError::ReadHead(err)),
            }
        };

        let mut references = Vec::new();
        for reference in repo.references().map_err(RepoError::ReadReferences)? {
            if self.exit_flag.is_raised() {
                return Err(RepoError::Interrupted);
            }
            let reference = reference.map_err(RepoError::ReadReferences)?;
            let name = match reference.name() {
                Some(name) => ReferenceName::from(name),
                None => {
                    warn!(name = ?String::from_utf8_lossy(reference.name_bytes()), "Skipping reference with non-UTF-8 name");
                    continue;
                }
            };
            if reference.kind() == Some(git2::ReferenceType::Symbolic) {
                debug!(?name, "Skipping symbolic reference");
                continue;
            }
            let oid = match reference.peel_to_commit() {
                Ok(commit) => match make_non_zero_oid(commit.id()) {
                    Some(oid) => oid,
                    None => continue,
                },
                Err(err) => {
                    debug!(?name, ?err, "Skipping reference which doesn't point to a commit");
                    continue;
                }
            };

            let reference = match CategorizedReferenceName::new(&name) {
                CategorizedReferenceName::LocalBranch { .. } => {
                    let upstream = match git2::Branch::wrap(reference).upstream() {
                        Ok(upstream) => upstream.get().name().map(ReferenceName::from),
                        Err(err) if err.code() == git2::ErrorCode::NotFound => None,
                        Err(err) => {
                            warn!(?name, ?err, "Could not read upstream of branch");
                            None
                        }
                    };
                    let is_head = head_name.as_deref() == Some(name.as_str());
                    Reference::new(
                        name,
                        oid,
                        ReferenceKind::LocalBranch {
                            upstream,
                            ahead_behind: None,
                            is_head,
                        },
                    )
                }
                CategorizedReferenceName::RemoteBranch { .. } => Reference::remote_branch(name, oid),
                CategorizedReferenceName::Tag { .. } => Reference::tag(name, oid),
                CategorizedReferenceName::OtherRef { .. } => {
                    debug!(?name, "Skipping reference which is not a branch or tag");
                    continue;
                }
            };
            references.push(reference);
        }

        if head_detached {
            let head = repo.head().map_err(RepoError::ReadHead)?;
            if let Some(oid) = head.target().and_then(make_non_zero_oid) {
                references.push(Reference::detached_head(oid));
            }
        }
        Ok(references)
    }
}

impl CommitSource for Repo {
    #[instrument(skip(sink))]
    fn commits_from(&self, start: NonZeroOid, sink: &mut CommitSink<'_>) -> eyre::Result<()> {
        Ok(self.pool.with(|repo| self.walk(repo, start, None, sink))??)
    }

    #[instrument]
    fn commits_in_range(
        &self,
        exclude: NonZeroOid,
        include: NonZeroOid,
    ) -> eyre::Result<Vec<Arc<Commit>>> {
        let mut commits = Vec::new();
        self.pool.with(|repo| {
            self.walk(repo, include, Some(exclude), &mut |commit| {
                commits.push(commit);
                ControlFlow::Continue(())
            })
        })??;
        Ok(commits)
    }

    #[instrument]
    fn merge_base(&self, lhs: NonZeroOid, rhs: NonZeroOid) -> eyre::Result<Option<NonZeroOid>> {
        let merge_base = self.pool.with(|repo| match repo.merge_base(lhs.inner, rhs.inner) {
            Ok(merge_base_oid) => Ok(make_non_zero_oid(merge_base_oid)),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(source) => Err(RepoError::FindMergeBase { source, lhs, rhs }),
        })??;
        Ok(merge_base)
    }

    #[instrument]
    fn ahead_behind(&self, local: NonZeroOid, upstream: NonZeroOid) -> eyre::Result<AheadBehind> {
        let (ahead, behind) = self
            .pool
            .with(|repo| repo.graph_ahead_behind(local.inner, upstream.inner))?
            .map_err(|source| RepoError::AheadBehind {
                source,
                local,
                upstream,
            })?;
        Ok(AheadBehind { ahead, behind })
    }

    #[instrument]
    fn load_references(&self) -> eyre::Result<Vec<Reference>> {
        Ok(self.pool.with(|repo| self.read_references(repo))??)
    }

    fn is_exiting(&self) -> bool {
        self.exit_flag.is_raised()
    }
}
