//! IMAP mailbox client library
//!
//! A [`Session`] wraps one authenticated IMAP connection and exposes the
//! mailbox the way an application wants to see it: folders by role,
//! sorted searches, flag and move operations, and messages normalised
//! into plain [`Message`] records with decoded bodies, attachments and
//! inline images embedded as `data:` URIs.
//!
//! Message records can be cached through a [`Cache`] backed by an
//! in-memory or on-disk [`CacheStore`].
//!
//! The wire protocol sits behind the [`Transport`] trait;
//! [`ImapTransport`] is the production implementation over
//! [`async-imap`](async_imap) with implicit TLS or STARTTLS.

mod actions;
mod cache;
mod config;
mod connection;
mod embed;
mod encoding;
mod error;
mod flag;
mod folder;
mod message;
mod messages;
mod mime;
mod search;
mod session;
mod transport;
mod uid;

pub use cache::{Cache, CacheStore, FileStore, MemoryStore};
pub use config::{CacheConfig, Encryption, FolderNames, ImapConfig, MailboxAddress, TimeoutPhase, Timeouts};
pub use connection::ImapTransport;
pub use embed::embed_inline_images;
pub use encoding::{TransferEncoding, decode_mime_words, decode_transfer, to_utf8};
pub use error::{Error, Result};
pub use flag::{Flag, MessageFlags};
pub use folder::{Folder, FolderRole};
pub use message::{Address, Attachment, Body, Message};
pub use messages::{AddressBook, MailboxStatistics};
pub use mime::{AttachmentPart, BodyLeaf, BodyNode, Disposition, attachment_parts, find_text_part};
pub use search::{Search, SearchDate, SortKey};
pub use session::Session;
pub use transport::{
    FlagAction, HeaderInfo, ListedFolder, Quota, RawAddress, RawMessage, Selection, Transport,
};
pub use uid::UidSet;
