//! IMAP connection configuration

use crate::error::{Error, Result};
use crate::folder::FolderRole;
use std::env;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

/// Transport security for the IMAP connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Encryption {
    /// Plain TCP, no TLS at all.
    None,
    /// Implicit TLS (usually port 993).
    Ssl,
    /// STARTTLS upgrade of a plain connection (usually port 143).
    #[default]
    Tls,
}

impl FromStr for Encryption {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "" | "none" | "plain" => Ok(Self::None),
            "ssl" => Ok(Self::Ssl),
            "tls" | "starttls" => Ok(Self::Tls),
            other => Err(Error::Config(format!("Unknown encryption mode: {other}"))),
        }
    }
}

/// Protocol phase a timeout applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimeoutPhase {
    Open,
    Read,
    Write,
    Close,
}

impl fmt::Display for TimeoutPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Open => "open",
            Self::Read => "read",
            Self::Write => "write",
            Self::Close => "close",
        })
    }
}

/// Per-phase transport timeouts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub open: Duration,
    pub read: Duration,
    pub write: Duration,
    pub close: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            open: Duration::from_secs(30),
            read: Duration::from_secs(30),
            write: Duration::from_secs(30),
            close: Duration::from_secs(10),
        }
    }
}

impl Timeouts {
    #[must_use]
    pub const fn get(&self, phase: TimeoutPhase) -> Duration {
        match phase {
            TimeoutPhase::Open => self.open,
            TimeoutPhase::Read => self.read,
            TimeoutPhase::Write => self.write,
            TimeoutPhase::Close => self.close,
        }
    }

    pub const fn set(&mut self, phase: TimeoutPhase, timeout: Duration) {
        match phase {
            TimeoutPhase::Open => self.open = timeout,
            TimeoutPhase::Read => self.read = timeout,
            TimeoutPhase::Write => self.write = timeout,
            TimeoutPhase::Close => self.close = timeout,
        }
    }
}

/// Server-side names of the well-known folders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FolderNames {
    pub inbox: String,
    pub sent: String,
    pub trash: String,
    pub spam: String,
    pub drafts: String,
}

impl Default for FolderNames {
    fn default() -> Self {
        Self {
            inbox: FolderRole::Inbox.default_name().to_string(),
            sent: FolderRole::Sent.default_name().to_string(),
            trash: FolderRole::Trash.default_name().to_string(),
            spam: FolderRole::Spam.default_name().to_string(),
            drafts: FolderRole::Drafts.default_name().to_string(),
        }
    }
}

impl FolderNames {
    /// The configured name for a folder role.
    #[must_use]
    pub fn name(&self, role: FolderRole) -> &str {
        match role {
            FolderRole::Inbox => &self.inbox,
            FolderRole::Sent => &self.sent,
            FolderRole::Trash => &self.trash,
            FolderRole::Spam => &self.spam,
            FolderRole::Drafts => &self.drafts,
        }
    }
}

/// Read-through cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheConfig {
    pub active: bool,
    /// Primary store: `memory` or `file`.
    pub adapter: String,
    /// Store used when the primary one cannot be initialised.
    pub backup: String,
    pub key_prefix: String,
    pub ttl: Duration,
    /// Directory of the `file` adapter.
    pub directory: Option<PathBuf>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            active: false,
            adapter: "file".to_string(),
            backup: "memory".to_string(),
            key_prefix: "imap:".to_string(),
            ttl: Duration::from_secs(60),
            directory: None,
        }
    }
}

/// IMAP connection configuration
#[derive(Debug, Clone)]
pub struct ImapConfig {
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    pub validate_cert: bool,
    pub username: String,
    pub password: String,
    pub folders: FolderNames,
    pub expunge_on_disconnect: bool,
    pub cache: CacheConfig,
    pub timeouts: Timeouts,
}

impl Default for ImapConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 143,
            encryption: Encryption::Tls,
            validate_cert: true,
            username: String::new(),
            password: String::new(),
            folders: FolderNames::default(),
            expunge_on_disconnect: false,
            cache: CacheConfig::default(),
            timeouts: Timeouts::default(),
        }
    }
}

impl ImapConfig {
    /// Load IMAP configuration from environment variables
    ///
    /// Reads from `.env` file if present. Required variables:
    /// - `IMAP_USERNAME`
    /// - `IMAP_PASSWORD`
    ///
    /// Optional (with defaults from [`ImapConfig::default`]):
    /// - `IMAP_HOST`, `IMAP_PORT`
    /// - `IMAP_ENCRYPTION` (`none`, `ssl` or `tls`), `IMAP_VALIDATE_CERT`
    /// - `IMAP_FOLDER_INBOX`, `IMAP_FOLDER_SENT`, `IMAP_FOLDER_TRASH`,
    ///   `IMAP_FOLDER_SPAM`, `IMAP_FOLDER_DRAFTS`
    /// - `IMAP_EXPUNGE_ON_DISCONNECT`
    /// - `IMAP_CACHE_ACTIVE`, `IMAP_CACHE_ADAPTER`, `IMAP_CACHE_BACKUP`,
    ///   `IMAP_CACHE_PREFIX`, `IMAP_CACHE_TTL` (seconds), `IMAP_CACHE_DIR`
    /// - `IMAP_TIMEOUT_OPEN`, `IMAP_TIMEOUT_READ`, `IMAP_TIMEOUT_WRITE`,
    ///   `IMAP_TIMEOUT_CLOSE` (seconds)
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a required variable is missing or a
    /// value cannot be parsed.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup, overlaying
    /// every key that is present over the defaults.
    ///
    /// # Errors
    ///
    /// Same as [`ImapConfig::from_env`].
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(host) = lookup("IMAP_HOST") {
            config.host = host;
        }
        if let Some(port) = lookup("IMAP_PORT") {
            config.port = port
                .parse()
                .map_err(|e| Error::Config(format!("Invalid IMAP_PORT: {e}")))?;
        }
        if let Some(mode) = lookup("IMAP_ENCRYPTION") {
            config.encryption = mode.parse()?;
        }
        if let Some(flag) = lookup("IMAP_VALIDATE_CERT") {
            config.validate_cert = parse_bool("IMAP_VALIDATE_CERT", &flag)?;
        }
        config.username =
            lookup("IMAP_USERNAME").ok_or_else(|| Error::Config("IMAP_USERNAME not set".into()))?;
        config.password =
            lookup("IMAP_PASSWORD").ok_or_else(|| Error::Config("IMAP_PASSWORD not set".into()))?;

        for (key, slot) in [
            ("IMAP_FOLDER_INBOX", &mut config.folders.inbox),
            ("IMAP_FOLDER_SENT", &mut config.folders.sent),
            ("IMAP_FOLDER_TRASH", &mut config.folders.trash),
            ("IMAP_FOLDER_SPAM", &mut config.folders.spam),
            ("IMAP_FOLDER_DRAFTS", &mut config.folders.drafts),
        ] {
            if let Some(name) = lookup(key) {
                *slot = name;
            }
        }

        if let Some(flag) = lookup("IMAP_EXPUNGE_ON_DISCONNECT") {
            config.expunge_on_disconnect = parse_bool("IMAP_EXPUNGE_ON_DISCONNECT", &flag)?;
        }

        if let Some(flag) = lookup("IMAP_CACHE_ACTIVE") {
            config.cache.active = parse_bool("IMAP_CACHE_ACTIVE", &flag)?;
        }
        if let Some(adapter) = lookup("IMAP_CACHE_ADAPTER") {
            config.cache.adapter = adapter;
        }
        if let Some(backup) = lookup("IMAP_CACHE_BACKUP") {
            config.cache.backup = backup;
        }
        if let Some(prefix) = lookup("IMAP_CACHE_PREFIX") {
            config.cache.key_prefix = prefix;
        }
        if let Some(ttl) = lookup("IMAP_CACHE_TTL") {
            config.cache.ttl = parse_seconds("IMAP_CACHE_TTL", &ttl)?;
        }
        if let Some(dir) = lookup("IMAP_CACHE_DIR") {
            config.cache.directory = Some(PathBuf::from(dir));
        }

        for (key, phase) in [
            ("IMAP_TIMEOUT_OPEN", TimeoutPhase::Open),
            ("IMAP_TIMEOUT_READ", TimeoutPhase::Read),
            ("IMAP_TIMEOUT_WRITE", TimeoutPhase::Write),
            ("IMAP_TIMEOUT_CLOSE", TimeoutPhase::Close),
        ] {
            if let Some(secs) = lookup(key) {
                config.timeouts.set(phase, parse_seconds(key, &secs)?);
            }
        }

        Ok(config)
    }

    /// The mailbox address descriptor for this configuration.
    #[must_use]
    pub fn address(&self) -> MailboxAddress {
        MailboxAddress {
            host: self.host.clone(),
            port: self.port,
            encryption: self.encryption,
            validate_cert: self.validate_cert,
        }
    }
}

fn parse_bool(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("Invalid {key}: {other}"))),
    }
}

fn parse_seconds(key: &str, value: &str) -> Result<Duration> {
    value
        .trim()
        .parse()
        .map(Duration::from_secs)
        .map_err(|e| Error::Config(format!("Invalid {key}: {e}")))
}

/// Where and how to reach the mailbox server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailboxAddress {
    pub host: String,
    pub port: u16,
    pub encryption: Encryption,
    pub validate_cert: bool,
}

impl MailboxAddress {
    /// `host:port`, as handed to the TCP connector.
    #[must_use]
    pub fn socket_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

impl fmt::Display for MailboxAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{{{}:{}/imap", self.host, self.port)?;
        match self.encryption {
            Encryption::None => {}
            Encryption::Ssl => f.write_str("/ssl")?,
            Encryption::Tls => f.write_str("/tls")?,
        }
        if self.encryption != Encryption::None && !self.validate_cert {
            f.write_str("/novalidate-cert")?;
        }
        f.write_str("}")
    }
}
