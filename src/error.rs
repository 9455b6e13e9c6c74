//! Error types for imap-mailbox

use crate::config::TimeoutPhase;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IMAP error: {0}")]
    Imap(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("{0} timeout expired")]
    Timeout(TimeoutPhase),

    /// The session was already disconnected.
    #[error("Session is not connected")]
    NotConnected,

    #[error("Empty UID set")]
    EmptyUidSet,

    #[error("Invalid UID: {0}")]
    InvalidUid(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;
