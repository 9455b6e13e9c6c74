//! Fake IMAP server for integration testing
//!
//! An in-process IMAP server that speaks enough of the protocol to
//! drive `ImapTransport` (and the `mailbox-cli` binary) end-to-end:
//!
//! TCP -> greeting -> STARTTLS -> TLS handshake -> LOGIN -> commands -> LOGOUT
//!
//! ## Module layout
//!
//! - `server` -- TCP listener, TLS setup, and command dispatch
//! - `handlers/` -- command handlers grouped by concern
//! - `mailbox` -- test data model (folders, messages, builder)
//! - `io` -- shared write helpers

mod handlers;
mod io;
mod server;

pub use mailbox::{MailboxBuilder, make_raw_message};
pub use server::FakeImapServer;
