//! Tools for interfacing with the Git repository.

mod config;
mod object;
mod oid;
mod reference;
mod repo;

pub use config::{Config, GetConfigValue};
pub use object::{Commit, Signature, Time};
pub use oid::NonZeroOid;
pub use reference::{
    AheadBehind, CategorizedReferenceName, Reference, ReferenceKind, ReferenceName,
    UpdatedReference, HEAD_REFERENCE_NAME,
};
pub use repo::{Repo, RepoError, Result as RepoResult};
