//! IMAP folder types
//!
//! [`FolderRole`] names the well-known folders (INBOX, Sent, Trash,
//! ...) whose server-side names come from the configuration.
//! [`Folder`] is one node of the folder hierarchy reconstructed from
//! the flat LIST response.

use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A well-known mailbox folder.
///
/// # Examples
///
/// ```
/// use imap_mailbox::FolderRole;
///
/// let trash: FolderRole = "trash".parse().unwrap();
/// assert_eq!(trash, FolderRole::Trash);
/// assert_eq!(trash.default_name(), "Trash");
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FolderRole {
    /// The INBOX folder (RFC 3501 required, case-insensitive).
    Inbox,
    /// Sent messages.
    Sent,
    /// Deleted messages.
    Trash,
    /// Spam / junk messages.
    Spam,
    /// Draft messages.
    Drafts,
}

impl FolderRole {
    pub const ALL: [Self; 5] = [Self::Inbox, Self::Sent, Self::Trash, Self::Spam, Self::Drafts];

    /// The folder name used when the configuration does not override it.
    #[must_use]
    pub const fn default_name(self) -> &'static str {
        match self {
            Self::Inbox => "INBOX",
            Self::Sent => "Sent",
            Self::Trash => "Trash",
            Self::Spam => "Spam",
            Self::Drafts => "Drafts",
        }
    }
}

impl fmt::Display for FolderRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inbox => "inbox",
            Self::Sent => "sent",
            Self::Trash => "trash",
            Self::Spam => "spam",
            Self::Drafts => "drafts",
        })
    }
}

impl FromStr for FolderRole {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "inbox" => Ok(Self::Inbox),
            "sent" => Ok(Self::Sent),
            "trash" => Ok(Self::Trash),
            "spam" | "junk" => Ok(Self::Spam),
            "draft" | "drafts" => Ok(Self::Drafts),
            other => Err(Error::Config(format!("Unknown folder role: {other}"))),
        }
    }
}

/// One node of the folder hierarchy.
///
/// `name` is the last path segment, `path` the full server-side name
/// that can be passed to `select_folder`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Folder {
    pub name: String,
    pub path: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<Self>,
}

impl Folder {
    fn new(name: &str, path: String) -> Self {
        Self {
            name: name.to_string(),
            path,
            children: Vec::new(),
        }
    }
}

/// Rebuild the folder hierarchy from flat folder paths.
///
/// Every path containing `delimiter` is split into segments and nested
/// under its parents; parents that were not listed themselves are
/// created on the way. Each level is sorted lexicographically.
#[must_use]
pub fn build_hierarchy<S: AsRef<str>>(paths: &[S], delimiter: &str) -> Vec<Folder> {
    let mut roots = Vec::new();
    for path in paths {
        let path = path.as_ref();
        if path.is_empty() {
            continue;
        }
        let segments: Vec<&str> = if delimiter.is_empty() {
            vec![path]
        } else {
            path.split(delimiter).collect()
        };
        insert(&mut roots, &segments, "", delimiter);
    }
    sort_levels(&mut roots);
    roots
}

fn insert(level: &mut Vec<Folder>, segments: &[&str], prefix: &str, delimiter: &str) {
    let Some((first, rest)) = segments.split_first() else {
        return;
    };
    let path = if prefix.is_empty() {
        (*first).to_string()
    } else {
        format!("{prefix}{delimiter}{first}")
    };

    let idx = if let Some(idx) = level.iter().position(|f| f.path == path) {
        idx
    } else {
        level.push(Folder::new(first, path.clone()));
        level.len() - 1
    };
    insert(&mut level[idx].children, rest, &path, delimiter);
}

fn sort_levels(level: &mut [Folder]) {
    level.sort_by(|a, b| a.name.cmp(&b.name));
    for folder in level {
        sort_levels(&mut folder.children);
    }
}
