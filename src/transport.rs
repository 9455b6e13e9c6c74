//! The wire-level capability a [`Session`](crate::Session) drives
//!
//! [`Transport`] is everything the session needs from an IMAP
//! connection. [`ImapTransport`](crate::ImapTransport) speaks the real
//! protocol; tests plug in an in-memory mailbox.

use crate::config::TimeoutPhase;
use crate::error::Result;
use crate::flag::Flag;
use crate::mime::BodyNode;
use crate::search::SortKey;
use crate::uid::UidSet;
use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Result of selecting a folder.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Selection {
    pub exists: u32,
    pub recent: u32,
}

/// One entry of a LIST response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListedFolder {
    pub path: String,
    /// Hierarchy delimiter, `None` for flat namespaces.
    pub delimiter: Option<String>,
}

/// An envelope address as the server reports it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawAddress {
    pub name: Option<String>,
    pub mailbox: Option<String>,
    pub host: Option<String>,
}

/// Header-level metadata of one message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeaderInfo {
    pub uid: u32,
    /// Sequence number in the selected folder.
    pub seq: u32,
    pub from: Vec<RawAddress>,
    pub to: Vec<RawAddress>,
    pub cc: Vec<RawAddress>,
    pub bcc: Vec<RawAddress>,
    pub reply_to: Vec<RawAddress>,
    /// Subject as sent, possibly still in encoded-word form.
    pub subject: Option<String>,
    pub message_id: Option<String>,
    pub in_reply_to: Option<String>,
    pub date: Option<String>,
    pub internal_date: Option<DateTime<FixedOffset>>,
    pub flags: Vec<Flag>,
    pub size: u32,
    /// The complete header block, used for headers the envelope omits.
    pub raw_header: String,
}

/// The unparsed source of a message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawMessage {
    pub header: Vec<u8>,
    pub text: Vec<u8>,
}

/// Storage usage and limit of a quota root, in KiB.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quota {
    pub usage: u64,
    /// Zero means unlimited.
    pub limit: u64,
}

impl Quota {
    /// Usage as a whole percentage of the limit, 0 when unlimited.
    #[must_use]
    pub fn percent_used(&self) -> u64 {
        self.usage
            .saturating_mul(100)
            .checked_div(self.limit)
            .unwrap_or_default()
    }
}

/// Whether a STORE adds or removes flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlagAction {
    Add,
    Remove,
}

/// IMAP primitives, roughly one protocol command each.
///
/// Message arguments are UIDs in the currently selected folder.
#[allow(async_fn_in_trait)]
pub trait Transport {
    /// Select `folder`; subsequent message calls operate on it.
    async fn select(&mut self, folder: &str) -> Result<Selection>;

    /// Leave the selected folder without expunging it.
    async fn unselect(&mut self) -> Result<()>;

    /// List every folder matching `pattern` under the root.
    async fn list(&mut self, pattern: &str) -> Result<Vec<ListedFolder>>;

    async fn create(&mut self, folder: &str) -> Result<()>;

    async fn rename(&mut self, from: &str, to: &str) -> Result<()>;

    async fn delete(&mut self, folder: &str) -> Result<()>;

    /// UID SEARCH.
    async fn search(&mut self, criteria: &str) -> Result<Vec<u32>>;

    /// UID SEARCH ordered by `key`, ties in ascending UID order.
    async fn sort(&mut self, key: SortKey, descending: bool, criteria: &str) -> Result<Vec<u32>>;

    /// Resolve a UID to its sequence number, `None` when absent.
    async fn sequence_number(&mut self, uid: u32) -> Result<Option<u32>>;

    async fn fetch_header(&mut self, uid: u32) -> Result<HeaderInfo>;

    async fn fetch_structure(&mut self, uid: u32) -> Result<BodyNode>;

    /// Raw (still transfer-encoded) bytes of one body part.
    async fn fetch_body(&mut self, uid: u32, part: &str) -> Result<Vec<u8>>;

    async fn fetch_raw(&mut self, uid: u32) -> Result<RawMessage>;

    /// RFC822 size of every message in `uids`.
    async fn fetch_sizes(&mut self, uids: &UidSet) -> Result<Vec<u32>>;

    async fn store_flags(&mut self, uids: &UidSet, flags: &[Flag], action: FlagAction) -> Result<()>;

    /// Move messages to `target`. The source copies may stay behind
    /// flagged `\Deleted` until the next expunge.
    async fn move_messages(&mut self, uids: &UidSet, target: &str) -> Result<()>;

    async fn expunge(&mut self) -> Result<()>;

    /// APPEND a complete message to `folder`.
    async fn append(&mut self, folder: &str, flags: &[Flag], content: &[u8]) -> Result<()>;

    /// Storage quota of the root governing `folder`, `None` when the
    /// server reports no STORAGE resource.
    async fn quota(&mut self, folder: &str) -> Result<Option<Quota>>;

    async fn noop(&mut self) -> Result<()>;

    async fn logout(&mut self) -> Result<()>;

    fn set_timeout(&mut self, phase: TimeoutPhase, timeout: Duration);

    fn timeout(&self, phase: TimeoutPhase) -> Duration;
}
