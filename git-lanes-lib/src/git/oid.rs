use std::fmt;
use std::str::FromStr;

use eyre::Context;

use crate::git::repo::wrap_git_error;

/// The ID of a commit or other Git object. Never the all-zeros OID, which
/// `git2` uses to mean "no object".
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonZeroOid {
    pub(super) inner: git2::Oid,
}

impl NonZeroOid {
    /// The first seven hex digits, as `git log --oneline` shows them.
    pub fn to_short_string(&self) -> String {
        let mut hex = self.to_string();
        hex.truncate(7);
        hex
    }
}

impl fmt::Debug for NonZeroOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NonZeroOid({})", self.inner)
    }
}

impl fmt::Display for NonZeroOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl FromStr for NonZeroOid {
    type Err = eyre::Error;

    fn from_str(hex: &str) -> Result<Self, Self::Err> {
        let oid = git2::Oid::from_str(hex)
            .map_err(wrap_git_error)
            .wrap_err_with(|| format!("Could not parse OID: {hex:?}"))?;
        match make_non_zero_oid(oid) {
            Some(oid) => Ok(oid),
            None => eyre::bail!("Expected a non-zero OID, but got: {hex:?}"),
        }
    }
}

pub(crate) fn make_non_zero_oid(oid: git2::Oid) -> Option<NonZeroOid> {
    if oid.is_zero() {
        None
    } else {
        Some(NonZeroOid { inner: oid })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_oid() -> eyre::Result<()> {
        assert!("0000000000000000000000000000000000000000"
            .parse::<NonZeroOid>()
            .is_err());
        assert!("not hex".parse::<NonZeroOid>().is_err());

        let oid: NonZeroOid = "f777ecc9b0db5ed372b2615695191a8a17f79f24".parse()?;
        assert_eq!(oid.to_short_string(), "f777ecc");
        assert_eq!(oid.to_string(), "f777ecc9b0db5ed372b2615695191a8a17f79f24");
        insta::assert_snapshot!(format!("{oid:?}"), @"NonZeroOid(f777ecc9b0db5ed372b2615695191a8a17f79f24)");
        Ok(())
    }
}
