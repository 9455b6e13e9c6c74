//! IMAP message flags
//!
//! Provides a strongly-typed enum for IMAP flags instead of raw
//! strings. Standard system flags have dedicated variants; arbitrary
//! keyword flags use the `Keyword` variant.

use serde::{Deserialize, Serialize};
use std::fmt;

/// An IMAP message flag.
///
/// System flags (prefixed with `\` in the IMAP protocol) have
/// dedicated variants. User-defined keyword flags use [`Flag::Keyword`].
///
/// # Examples
///
/// ```
/// use imap_mailbox::Flag;
///
/// let seen = Flag::Seen;
/// assert_eq!(seen.as_imap_str(), "\\Seen");
///
/// let kw = Flag::Keyword("$Important".to_string());
/// assert_eq!(kw.as_imap_str(), "$Important");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Flag {
    /// Message has been read (`\Seen`).
    Seen,
    /// Message has been answered (`\Answered`).
    Answered,
    /// Message is flagged for attention (`\Flagged`).
    Flagged,
    /// Message is marked for deletion (`\Deleted`).
    Deleted,
    /// Message is a draft (`\Draft`).
    Draft,
    /// Message arrived in this session (`\Recent`). Server-maintained,
    /// cannot be set by clients.
    Recent,
    /// A user-defined keyword flag (no `\` prefix).
    Keyword(String),
}

impl Flag {
    /// The IMAP wire representation of this flag.
    ///
    /// System flags include the leading backslash (e.g. `\Seen`).
    /// Keyword flags are returned as-is.
    #[must_use]
    pub fn as_imap_str(&self) -> &str {
        match self {
            Self::Seen => "\\Seen",
            Self::Answered => "\\Answered",
            Self::Flagged => "\\Flagged",
            Self::Deleted => "\\Deleted",
            Self::Draft => "\\Draft",
            Self::Recent => "\\Recent",
            Self::Keyword(kw) => kw,
        }
    }

    /// Parse a flag from its wire form or a bare name (`seen`,
    /// `\Seen`, `read` ...). Unknown names become keywords.
    #[must_use]
    pub fn parse(s: &str) -> Self {
        let bare = s.strip_prefix('\\').unwrap_or(s);
        match bare.to_ascii_lowercase().as_str() {
            "seen" | "read" => Self::Seen,
            "answered" => Self::Answered,
            "flagged" => Self::Flagged,
            "deleted" => Self::Deleted,
            "draft" => Self::Draft,
            "recent" => Self::Recent,
            _ => Self::Keyword(s.to_string()),
        }
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_imap_str())
    }
}

/// Join flags into the parenthesised list used by STORE and APPEND.
#[must_use]
pub fn flag_list(flags: &[Flag]) -> String {
    let inner: Vec<&str> = flags.iter().map(Flag::as_imap_str).collect();
    format!("({})", inner.join(" "))
}

/// The standard flag state of one message.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct MessageFlags {
    pub recent: bool,
    pub read: bool,
    pub answered: bool,
    pub flagged: bool,
    pub deleted: bool,
    pub draft: bool,
}

impl MessageFlags {
    /// Derive the flag state from the flags the server reported.
    #[must_use]
    pub fn from_flags<'a, I>(flags: I) -> Self
    where
        I: IntoIterator<Item = &'a Flag>,
    {
        let mut state = Self::default();
        for flag in flags {
            match flag {
                Flag::Seen => state.read = true,
                Flag::Answered => state.answered = true,
                Flag::Flagged => state.flagged = true,
                Flag::Deleted => state.deleted = true,
                Flag::Draft => state.draft = true,
                Flag::Recent => state.recent = true,
                Flag::Keyword(_) => {}
            }
        }
        state
    }

    #[must_use]
    pub const fn unread(&self) -> bool {
        !self.read
    }
}
