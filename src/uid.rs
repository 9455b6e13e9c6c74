//! UID set normalisation
//!
//! Mutating commands accept UIDs either as a list or as a pre-joined
//! string; both end up as one comma-joined set without whitespace.

use crate::error::{Error, Result};
use std::fmt;

/// Upper bound on the UIDs [`UidSet::uids`] will materialise.
pub const MAX_EXPANDED_UIDS: usize = 100_000;

/// A normalised IMAP UID set (`"1,5,7"`, `"3:9"`, `"1:*"`).
///
/// # Examples
///
/// ```
/// use imap_mailbox::UidSet;
///
/// assert_eq!(UidSet::from("1, 2 ,3").as_str(), "1,2,3");
/// assert_eq!(UidSet::from(vec![4, 8]).as_str(), "4,8");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UidSet(String);

impl UidSet {
    /// Every message in the selected folder.
    #[must_use]
    pub fn all() -> Self {
        Self("1:*".to_string())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Expand the set into explicit UIDs, preserving input order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidUid`] for non-numeric members, open
    /// ranges (`*`) and sets larger than [`MAX_EXPANDED_UIDS`], and
    /// [`Error::EmptyUidSet`] for an empty set.
    pub fn uids(&self) -> Result<Vec<u32>> {
        if self.is_empty() {
            return Err(Error::EmptyUidSet);
        }
        let mut out = Vec::new();
        for member in self.0.split(',') {
            if let Some((lo, hi)) = member.split_once(':') {
                let lo = parse_uid(lo)?;
                let hi = parse_uid(hi)?;
                let (lo, hi) = if lo <= hi { (lo, hi) } else { (hi, lo) };
                let span = usize::try_from(hi - lo).unwrap_or(usize::MAX);
                if span >= MAX_EXPANDED_UIDS.saturating_sub(out.len()) {
                    return Err(Error::InvalidUid(format!(
                        "{member} spans more than {MAX_EXPANDED_UIDS} UIDs"
                    )));
                }
                out.extend(lo..=hi);
            } else {
                out.push(parse_uid(member)?);
            }
        }
        Ok(out)
    }
}

fn parse_uid(s: &str) -> Result<u32> {
    s.parse().map_err(|_| Error::InvalidUid(s.to_string()))
}

impl fmt::Display for UidSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for UidSet {
    fn from(s: &str) -> Self {
        let members: Vec<String> = s
            .split(',')
            .map(|m| m.chars().filter(|c| !c.is_whitespace()).collect::<String>())
            .filter(|m| !m.is_empty())
            .collect();
        Self(members.join(","))
    }
}

impl From<String> for UidSet {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<&String> for UidSet {
    fn from(s: &String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<u32> for UidSet {
    fn from(uid: u32) -> Self {
        Self(uid.to_string())
    }
}

impl From<&[u32]> for UidSet {
    fn from(uids: &[u32]) -> Self {
        let members: Vec<String> = uids.iter().map(ToString::to_string).collect();
        Self(members.join(","))
    }
}

impl From<Vec<u32>> for UidSet {
    fn from(uids: Vec<u32>) -> Self {
        Self::from(uids.as_slice())
    }
}

impl From<&Vec<u32>> for UidSet {
    fn from(uids: &Vec<u32>) -> Self {
        Self::from(uids.as_slice())
    }
}

impl<const N: usize> From<[u32; N]> for UidSet {
    fn from(uids: [u32; N]) -> Self {
        Self::from(uids.as_slice())
    }
}
