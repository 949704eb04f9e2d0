use std::cmp::Ordering;

use crate::git::oid::make_non_zero_oid;
use crate::git::NonZeroOid;

/// A timestamp as used in a commit signature.
///
/// Ordering only considers the instant (seconds since the epoch), not the
/// timezone offset it was recorded in.
#[derive(Clone, Copy, Debug)]
pub struct Time {
    pub(super) inner: git2::Time,
}

impl Time {
    /// Constructor.
    pub fn new(seconds: i64, offset_minutes: i32) -> Self {
        Time {
            inner: git2::Time::new(seconds, offset_minutes),
        }
    }

    /// Seconds since the Unix epoch.
    pub fn seconds(&self) -> i64 {
        self.inner.seconds()
    }

    /// Offset from UTC, in minutes.
    pub fn offset_minutes(&self) -> i32 {
        self.inner.offset_minutes()
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.seconds() == other.seconds()
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.seconds().cmp(&other.seconds())
    }
}

impl From<git2::Time> for Time {
    fn from(inner: git2::Time) -> Self {
        Time { inner }
    }
}

/// The identity and time attached to a commit, either as its author or its
/// committer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Signature {
    name: String,
    email: String,
    time: Time,
}

impl Signature {
    /// Constructor.
    pub fn new(name: impl Into<String>, email: impl Into<String>, time: Time) -> Self {
        Signature {
            name: name.into(),
            email: email.into(),
            time,
        }
    }

    pub(crate) fn from_git2(signature: &git2::Signature<'_>) -> Self {
        Signature {
            name: String::from_utf8_lossy(signature.name_bytes()).into_owned(),
            email: String::from_utf8_lossy(signature.email_bytes()).into_owned(),
            time: signature.when().into(),
        }
    }

    /// Get the time when this signature was applied.
    pub fn get_time(&self) -> Time {
        self.time
    }

    #[allow(missing_docs)]
    pub fn get_name(&self) -> &str {
        &self.name
    }

    #[allow(missing_docs)]
    pub fn get_email(&self) -> &str {
        &self.email
    }

    /// Return the friendly formatted name and email of the signature.
    pub fn friendly_describe(&self) -> String {
        match (self.name.is_empty(), self.email.is_empty()) {
            (false, false) => format!("{} <{}>", self.name, self.email),
            (false, true) => self.name.clone(),
            (true, false) => format!("<{}>", self.email),
            (true, true) => String::new(),
        }
    }
}

/// A commit read out of the object database.
///
/// Unlike a `git2::Commit`, this owns all of its data, so it can be shared
/// between threads. Instances are normally interned through a
/// [`crate::core::cache::CommitCache`], so there is one shared instance per OID.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Commit {
    oid: NonZeroOid,
    parent_oids: Vec<NonZeroOid>,
    author: Signature,
    committer: Signature,
    message: String,
}

impl Commit {
    /// Constructor.
    pub fn new(
        oid: NonZeroOid,
        parent_oids: Vec<NonZeroOid>,
        author: Signature,
        committer: Signature,
        message: impl Into<String>,
    ) -> Self {
        Commit {
            oid,
            parent_oids,
            author,
            committer,
            message: message.into(),
        }
    }

    pub(crate) fn from_git2(commit: &git2::Commit<'_>) -> Option<Self> {
        let oid = make_non_zero_oid(commit.id())?;
        Some(Commit {
            oid,
            parent_oids: commit.parent_ids().filter_map(make_non_zero_oid).collect(),
            author: Signature::from_git2(&commit.author()),
            committer: Signature::from_git2(&commit.committer()),
            message: String::from_utf8_lossy(commit.message_bytes()).into_owned(),
        })
    }

    /// Get the object ID of the commit.
    pub fn get_oid(&self) -> NonZeroOid {
        self.oid
    }

    /// Get the object IDs of the parents of this commit.
    pub fn get_parent_oids(&self) -> &[NonZeroOid] {
        &self.parent_oids
    }

    /// Get the number of parents of this commit.
    pub fn get_parent_count(&self) -> usize {
        self.parent_oids.len()
    }

    /// Whether this commit has more than one parent.
    pub fn is_merge(&self) -> bool {
        self.parent_oids.len() > 1
    }

    #[allow(missing_docs)]
    pub fn get_author(&self) -> &Signature {
        &self.author
    }

    #[allow(missing_docs)]
    pub fn get_committer(&self) -> &Signature {
        &self.committer
    }

    /// The time used to order history: the committer time.
    pub fn get_time(&self) -> Time {
        self.committer.get_time()
    }

    /// Get the full commit message.
    pub fn get_message(&self) -> &str {
        &self.message
    }

    /// Get the summary (first line) of the commit message.
    pub fn get_summary(&self) -> &str {
        self.message.lines().next().unwrap_or_default().trim_end()
    }

    /// Print a one-line description of this commit containing its OID and
    /// summary.
    pub fn friendly_describe(&self) -> String {
        format!("{} {}", self.oid.to_short_string(), self.get_summary())
    }
}
