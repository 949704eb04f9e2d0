use crate::git::NonZeroOid;

/// The name of a reference, like `refs/heads/master`.
#[derive(Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct ReferenceName(String);

impl ReferenceName {
    /// View this reference name as a string. (This is a zero-cost conversion.)
    pub fn as_str(&self) -> &str {
        let Self(reference_name) = self;
        reference_name
    }
}

impl From<&str> for ReferenceName {
    fn from(s: &str) -> Self {
        ReferenceName(s.to_owned())
    }
}

impl From<String> for ReferenceName {
    fn from(s: String) -> Self {
        ReferenceName(s)
    }
}

impl AsRef<str> for ReferenceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Determine what kind of reference a name denotes, by its prefix.
#[derive(Debug)]
pub enum CategorizedReferenceName<'a> {
    /// The reference represents a local branch.
    LocalBranch {
        /// The full name of the reference.
        name: &'a str,

        /// The string `refs/heads/`.
        prefix: &'static str,
    },

    /// The reference represents a remote branch.
    RemoteBranch {
        /// The full name of the reference.
        name: &'a str,

        /// The string `refs/remotes/`.
        prefix: &'static str,
    },

    /// The reference represents a tag.
    Tag {
        /// The full name of the reference.
        name: &'a str,

        /// The string `refs/tags/`.
        prefix: &'static str,
    },

    /// Some other kind of reference which isn't a branch or tag at all.
    OtherRef {
        /// The full name of the reference.
        name: &'a str,
    },
}

impl<'a> CategorizedReferenceName<'a> {
    /// Categorize the provided reference name.
    pub fn new(name: &'a ReferenceName) -> Self {
        let name = name.as_str();
        if name.starts_with("refs/heads/") {
            Self::LocalBranch {
                name,
                prefix: "refs/heads/",
            }
        } else if name.starts_with("refs/remotes/") {
            Self::RemoteBranch {
                name,
                prefix: "refs/remotes/",
            }
        } else if name.starts_with("refs/tags/") {
            Self::Tag {
                name,
                prefix: "refs/tags/",
            }
        } else {
            Self::OtherRef { name }
        }
    }

    /// Render only the suffix of the reference name. The caller will usually
    /// check the type of reference and add additional information to the
    /// reference name.
    pub fn render_suffix(&self) -> String {
        let (name, prefix): (_, &'static str) = match self {
            Self::LocalBranch { name, prefix } => (name, prefix),
            Self::RemoteBranch { name, prefix } => (name, prefix),
            Self::Tag { name, prefix } => (name, prefix),
            Self::OtherRef { name } => (name, ""),
        };
        name.strip_prefix(prefix).unwrap_or(name).to_owned()
    }

    /// Render the reference name, and prepend a helpful string like `branch`
    /// to the description.
    pub fn friendly_describe(&self) -> String {
        let name = self.render_suffix();
        match self {
            CategorizedReferenceName::LocalBranch { .. } => format!("branch {name}"),
            CategorizedReferenceName::RemoteBranch { .. } => format!("remote branch {name}"),
            CategorizedReferenceName::Tag { .. } => format!("tag {name}"),
            CategorizedReferenceName::OtherRef { .. } => format!("ref {name}"),
        }
    }
}

/// How far a local branch has diverged from the branch it tracks.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct AheadBehind {
    /// Commits on the local branch that are not on its upstream.
    pub ahead: usize,

    /// Commits on the upstream that are not on the local branch.
    pub behind: usize,
}

/// The variant-specific part of a [`Reference`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReferenceKind {
    /// A branch under `refs/heads/`.
    LocalBranch {
        /// The remote branch this branch tracks, if any.
        upstream: Option<ReferenceName>,

        /// Divergence from `upstream`, once it has been computed.
        ahead_behind: Option<AheadBehind>,

        /// Whether `HEAD` currently points to this branch.
        is_head: bool,
    },

    /// A branch under `refs/remotes/`.
    RemoteBranch,

    /// A tag under `refs/tags/`, peeled to the commit it names.
    Tag,

    /// `HEAD`, when it points directly at a commit rather than a branch.
    DetachedHead,
}

/// A named pointer to a commit, as of the moment it was read.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Reference {
    name: ReferenceName,
    shorthand: String,
    oid: NonZeroOid,
    kind: ReferenceKind,
}

/// The name used for a detached `HEAD`.
pub const HEAD_REFERENCE_NAME: &str = "HEAD";

impl Reference {
    /// Constructor. The shorthand is derived from the name.
    pub fn new(name: impl Into<ReferenceName>, oid: NonZeroOid, kind: ReferenceKind) -> Self {
        let name = name.into();
        let shorthand = CategorizedReferenceName::new(&name).render_suffix();
        Reference {
            name,
            shorthand,
            oid,
            kind,
        }
    }

    /// Make a local branch reference with no upstream.
    pub fn local_branch(name: impl Into<ReferenceName>, oid: NonZeroOid) -> Self {
        Self::new(
            name,
            oid,
            ReferenceKind::LocalBranch {
                upstream: None,
                ahead_behind: None,
                is_head: false,
            },
        )
    }

    /// Make a local branch reference tracking `upstream`.
    pub fn tracking_branch(
        name: impl Into<ReferenceName>,
        oid: NonZeroOid,
        upstream: impl Into<ReferenceName>,
    ) -> Self {
        Self::new(
            name,
            oid,
            ReferenceKind::LocalBranch {
                upstream: Some(upstream.into()),
                ahead_behind: None,
                is_head: false,
            },
        )
    }

    /// Make a remote branch reference.
    pub fn remote_branch(name: impl Into<ReferenceName>, oid: NonZeroOid) -> Self {
        Self::new(name, oid, ReferenceKind::RemoteBranch)
    }

    /// Make a tag reference.
    pub fn tag(name: impl Into<ReferenceName>, oid: NonZeroOid) -> Self {
        Self::new(name, oid, ReferenceKind::Tag)
    }

    /// Make a detached `HEAD` reference.
    pub fn detached_head(oid: NonZeroOid) -> Self {
        Self::new(HEAD_REFERENCE_NAME, oid, ReferenceKind::DetachedHead)
    }

    /// The same reference, pointing at a different commit.
    pub fn with_oid(&self, oid: NonZeroOid) -> Self {
        Reference {
            oid,
            ..self.clone()
        }
    }

    /// The same reference, marked as the target of `HEAD`. Only meaningful
    /// for local branches.
    pub fn with_head(mut self, value: bool) -> Self {
        if let ReferenceKind::LocalBranch { is_head, .. } = &mut self.kind {
            *is_head = value;
        }
        self
    }

    #[allow(missing_docs)]
    pub fn get_name(&self) -> &ReferenceName {
        &self.name
    }

    /// The name without its `refs/...` prefix, for display.
    pub fn get_shorthand(&self) -> &str {
        &self.shorthand
    }

    #[allow(missing_docs)]
    pub fn get_oid(&self) -> NonZeroOid {
        self.oid
    }

    #[allow(missing_docs)]
    pub fn get_kind(&self) -> &ReferenceKind {
        &self.kind
    }

    /// The upstream of a tracking local branch.
    pub fn get_upstream(&self) -> Option<&ReferenceName> {
        match &self.kind {
            ReferenceKind::LocalBranch { upstream, .. } => upstream.as_ref(),
            ReferenceKind::RemoteBranch | ReferenceKind::Tag | ReferenceKind::DetachedHead => {
                None
            }
        }
    }

    /// The divergence from the upstream, if known.
    pub fn get_ahead_behind(&self) -> Option<AheadBehind> {
        match &self.kind {
            ReferenceKind::LocalBranch { ahead_behind, .. } => *ahead_behind,
            ReferenceKind::RemoteBranch | ReferenceKind::Tag | ReferenceKind::DetachedHead => {
                None
            }
        }
    }

    pub(crate) fn set_ahead_behind(&mut self, value: Option<AheadBehind>) {
        if let ReferenceKind::LocalBranch { ahead_behind, .. } = &mut self.kind {
            *ahead_behind = value;
        }
    }

    /// Whether this reference is what `HEAD` resolves to.
    pub fn is_head(&self) -> bool {
        match &self.kind {
            ReferenceKind::LocalBranch { is_head, .. } => *is_head,
            ReferenceKind::DetachedHead => true,
            ReferenceKind::RemoteBranch | ReferenceKind::Tag => false,
        }
    }

    /// Render the reference for display in a reference browser, such as
    /// `branch main` or `tag v1.0`.
    pub fn friendly_describe(&self) -> String {
        match self.kind {
            ReferenceKind::DetachedHead => format!("detached HEAD {}", self.oid.to_short_string()),
            _ => CategorizedReferenceName::new(&self.name).friendly_describe(),
        }
    }
}

/// A reference whose target commit changed between two reference loads.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatedReference {
    /// The value before the change.
    pub old: Reference,

    /// The value after the change. Has the same name as `old`.
    pub new: Reference,
}

impl UpdatedReference {
    #[allow(missing_docs)]
    pub fn get_name(&self) -> &ReferenceName {
        self.new.get_name()
    }
}
