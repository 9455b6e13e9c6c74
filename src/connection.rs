//! IMAP connection and TLS helpers
//!
//! [`ImapTransport`] implements [`Transport`] over `async-imap`. It
//! connects over plain TCP, implicit TLS or STARTTLS, and bounds every
//! command by the configured per-phase timeout.

use crate::config::{Encryption, ImapConfig, TimeoutPhase, Timeouts};
use crate::encoding::{TransferEncoding, to_utf8};
use crate::error::{Error, Result};
use crate::flag::{Flag, flag_list};
use crate::mime::{BodyLeaf, BodyNode, Disposition};
use crate::search::{SortKey, sort_headers};
use crate::transport::{
    FlagAction, HeaderInfo, ListedFolder, Quota, RawAddress, RawMessage, Selection, Transport,
};
use crate::uid::UidSet;
use async_imap::imap_proto::types::{
    Address, BodyContentCommon, BodyContentSinglePart, BodyStructure, ContentEncoding, SectionPath,
};
use async_imap::types::{Fetch, QuotaResourceName};
use futures::StreamExt;
use futures::io::{AsyncRead, AsyncWrite};
use rustls::pki_types::ServerName;
use std::borrow::Cow;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio_rustls::TlsConnector;
use tokio_util::compat::TokioAsyncReadCompatExt;
use tracing::{debug, info};

/// Any byte stream an IMAP session can run over.
pub trait ImapStream: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug {}

impl<T: AsyncRead + AsyncWrite + Unpin + Send + fmt::Debug> ImapStream for T {}

/// An authenticated IMAP session over plain TCP or TLS.
pub type ImapSession = async_imap::Session<Box<dyn ImapStream>>;

/// Build a TLS connector.
///
/// With `validate_cert` the server chain is checked against the
/// webpki root store; without it every certificate is accepted, which
/// is what self-signed local bridges need.
fn tls_connector(validate_cert: bool) -> Result<TlsConnector> {
    let provider = Arc::new(rustls::crypto::ring::default_provider());
    let builder = rustls::ClientConfig::builder_with_provider(provider)
        .with_safe_default_protocol_versions()
        .map_err(|e| Error::Tls(e.to_string()))?;

    let config = if validate_cert {
        let roots = rustls::RootCertStore::from_iter(webpki_roots::TLS_SERVER_ROOTS.iter().cloned());
        builder.with_root_certificates(roots).with_no_client_auth()
    } else {
        builder
            .dangerous()
            .with_custom_certificate_verifier(Arc::new(DangerousVerifier))
            .with_no_client_auth()
    };
    Ok(TlsConnector::from(Arc::new(config)))
}

async fn tls_wrap(stream: TcpStream, host: &str, validate_cert: bool) -> Result<Box<dyn ImapStream>> {
    let connector = tls_connector(validate_cert)?;
    let server_name = ServerName::try_from(host.to_string())
        .map_err(|e| Error::Tls(format!("Invalid server name: {e}")))?;
    let tls_stream = connector
        .connect(server_name, stream)
        .await
        .map_err(|e| Error::Tls(e.to_string()))?;
    Ok(Box::new(tls_stream.compat()))
}

/// Run `fut` under the timeout configured for `phase`.
async fn timed<T, F>(phase: TimeoutPhase, limit: Duration, fut: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    tokio::time::timeout(limit, fut)
        .await
        .map_err(|_| Error::Timeout(phase))?
}

/// Open a fresh IMAP session and log in.
///
/// `Encryption::Tls` issues STARTTLS on the plain connection before the
/// handshake, `Encryption::Ssl` starts with the handshake.
async fn open(config: &ImapConfig) -> Result<ImapSession> {
    let address = config.address();
    debug!("Connecting to IMAP server at {}", address);

    let tcp_stream = TcpStream::connect(address.socket_addr())
        .await
        .map_err(|e| Error::Connection(format!("{address}: {e}")))?;

    let stream: Box<dyn ImapStream> = match config.encryption {
        Encryption::None => Box::new(tcp_stream.compat()),
        Encryption::Ssl => tls_wrap(tcp_stream, &config.host, config.validate_cert).await?,
        Encryption::Tls => {
            let mut client = async_imap::Client::new(tcp_stream.compat());
            client
                .run_command_and_check_ok("STARTTLS", None)
                .await
                .map_err(|e| Error::Tls(format!("STARTTLS failed: {e}")))?;
            let inner = client.into_inner().into_inner();
            tls_wrap(inner, &config.host, config.validate_cert).await?
        }
    };

    let session = async_imap::Client::new(stream)
        .login(&config.username, &config.password)
        .await
        .map_err(|(e, _)| Error::Connection(format!("Login failed: {e}")))?;

    info!("Connected to IMAP server {}", address);
    Ok(session)
}

/// The production [`Transport`]: a live `async-imap` session.
pub struct ImapTransport {
    session: ImapSession,
    timeouts: Timeouts,
}

impl fmt::Debug for ImapTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ImapTransport")
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl ImapTransport {
    /// Connect and authenticate, bounded by the open timeout.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Connection`] if the server is unreachable or
    /// rejects the credentials, [`Error::Tls`] if the handshake fails
    /// and [`Error::Timeout`] if it takes too long.
    pub async fn connect(config: &ImapConfig) -> Result<Self> {
        let timeouts = config.timeouts;
        let session = timed(TimeoutPhase::Open, timeouts.open, open(config)).await?;
        Ok(Self { session, timeouts })
    }

    async fn fetch(&mut self, uids: &str, query: &str) -> Result<Vec<Fetch>> {
        let session = &mut self.session;
        timed(TimeoutPhase::Read, self.timeouts.read, async move {
            let stream = session
                .uid_fetch(uids, query)
                .await
                .map_err(|e| Error::Imap(format!("Fetch failed: {e}")))?;
            let results: Vec<_> = stream.collect().await;
            results
                .into_iter()
                .map(|r| r.map_err(|e| Error::Imap(format!("Fetch error: {e}"))))
                .collect()
        })
        .await
    }

    async fn fetch_one(&mut self, uid: u32, query: &str) -> Result<Fetch> {
        self.fetch(&uid.to_string(), query)
            .await?
            .into_iter()
            .find(|f| f.uid == Some(uid))
            .ok_or_else(|| Error::Imap(format!("Message UID {uid} not found")))
    }
}

impl Transport for ImapTransport {
    async fn select(&mut self, folder: &str) -> Result<Selection> {
        let mailbox = timed(TimeoutPhase::Read, self.timeouts.read, async {
            self.session
                .select(folder)
                .await
                .map_err(|e| Error::Imap(format!("Failed to select {folder}: {e}")))
        })
        .await?;
        Ok(Selection {
            exists: mailbox.exists,
            recent: mailbox.recent,
        })
    }

    async fn unselect(&mut self) -> Result<()> {
        timed(TimeoutPhase::Read, self.timeouts.read, async {
            if self.session.run_command_and_check_ok("UNSELECT").await.is_ok() {
                return Ok(());
            }
            // No UNSELECT extension: CLOSE on a read-only folder expunges nothing.
            self.session
                .examine("INBOX")
                .await
                .map_err(|e| Error::Imap(format!("Failed to examine INBOX: {e}")))?;
            self.session
                .close()
                .await
                .map_err(|e| Error::Imap(format!("Close failed: {e}")))
        })
        .await
    }

    async fn list(&mut self, pattern: &str) -> Result<Vec<ListedFolder>> {
        let session = &mut self.session;
        timed(TimeoutPhase::Read, self.timeouts.read, async move {
            let stream = session
                .list(Some(""), Some(pattern))
                .await
                .map_err(|e| Error::Imap(format!("List folders failed: {e}")))?;
            let names: Vec<_> = stream.collect().await;
            Ok(names
                .into_iter()
                .filter_map(std::result::Result::ok)
                .map(|name| ListedFolder {
                    path: name.name().to_string(),
                    delimiter: name.delimiter().map(str::to_string),
                })
                .collect())
        })
        .await
    }

    async fn create(&mut self, folder: &str) -> Result<()> {
        timed(TimeoutPhase::Write, self.timeouts.write, async {
            self.session
                .create(folder)
                .await
                .map_err(|e| Error::Imap(format!("Failed to create {folder}: {e}")))
        })
        .await
    }

    async fn rename(&mut self, from: &str, to: &str) -> Result<()> {
        timed(TimeoutPhase::Write, self.timeouts.write, async {
            self.session
                .rename(from, to)
                .await
                .map_err(|e| Error::Imap(format!("Failed to rename {from} to {to}: {e}")))
        })
        .await
    }

    async fn delete(&mut self, folder: &str) -> Result<()> {
        timed(TimeoutPhase::Write, self.timeouts.write, async {
            self.session
                .delete(folder)
                .await
                .map_err(|e| Error::Imap(format!("Failed to delete {folder}: {e}")))
        })
        .await
    }

    async fn search(&mut self, criteria: &str) -> Result<Vec<u32>> {
        let uids = timed(TimeoutPhase::Read, self.timeouts.read, async {
            self.session
                .uid_search(criteria)
                .await
                .map_err(|e| Error::Imap(format!("Search failed: {e}")))
        })
        .await?;
        let mut uids: Vec<u32> = uids.into_iter().collect();
        uids.sort_unstable();
        Ok(uids)
    }

    async fn sort(&mut self, key: SortKey, descending: bool, criteria: &str) -> Result<Vec<u32>> {
        // SORT is an extension; ordering client-side works on every server.
        let uids = self.search(criteria).await?;
        if uids.len() < 2 {
            return Ok(uids);
        }
        let fetches = self
            .fetch(&compact_uids(&uids), "(UID ENVELOPE INTERNALDATE RFC822.SIZE)")
            .await?;
        let headers: Vec<HeaderInfo> = fetches
            .iter()
            .filter_map(|f| f.uid.map(|uid| header_info(uid, f)))
            .collect();
        debug!("Sorting {} message(s) by {}", headers.len(), key);
        Ok(sort_headers(&headers, key, descending))
    }

    async fn sequence_number(&mut self, uid: u32) -> Result<Option<u32>> {
        let fetches = self.fetch(&uid.to_string(), "(UID)").await?;
        Ok(fetches
            .iter()
            .find(|f| f.uid == Some(uid))
            .map(|f| f.message))
    }

    async fn fetch_header(&mut self, uid: u32) -> Result<HeaderInfo> {
        let fetch = self
            .fetch_one(
                uid,
                "(UID FLAGS ENVELOPE RFC822.SIZE INTERNALDATE BODY.PEEK[HEADER])",
            )
            .await?;
        Ok(header_info(uid, &fetch))
    }

    async fn fetch_structure(&mut self, uid: u32) -> Result<BodyNode> {
        let fetch = self.fetch_one(uid, "(UID BODYSTRUCTURE)").await?;
        fetch
            .bodystructure()
            .map(convert_structure)
            .ok_or_else(|| Error::Parse(format!("No BODYSTRUCTURE for UID {uid}")))
    }

    async fn fetch_body(&mut self, uid: u32, part: &str) -> Result<Vec<u8>> {
        let path = part
            .split('.')
            .map(|n| n.parse::<u32>().map_err(|_| Error::Parse(format!("Invalid part number: {part}"))))
            .collect::<Result<Vec<u32>>>()?;
        let fetch = self
            .fetch_one(uid, &format!("(UID BODY.PEEK[{part}])"))
            .await?;
        Ok(fetch
            .section(&SectionPath::Part(path, None))
            .map(<[u8]>::to_vec)
            .unwrap_or_default())
    }

    async fn fetch_raw(&mut self, uid: u32) -> Result<RawMessage> {
        let fetch = self
            .fetch_one(uid, "(UID BODY.PEEK[HEADER] BODY.PEEK[TEXT])")
            .await?;
        Ok(RawMessage {
            header: fetch.header().map(<[u8]>::to_vec).unwrap_or_default(),
            text: fetch.text().map(<[u8]>::to_vec).unwrap_or_default(),
        })
    }

    async fn fetch_sizes(&mut self, uids: &UidSet) -> Result<Vec<u32>> {
        let fetches = self.fetch(uids.as_str(), "(UID RFC822.SIZE)").await?;
        Ok(fetches.iter().filter_map(|f| f.size).collect())
    }

    async fn store_flags(&mut self, uids: &UidSet, flags: &[Flag], action: FlagAction) -> Result<()> {
        let query = format!(
            "{}FLAGS.SILENT {}",
            match action {
                FlagAction::Add => '+',
                FlagAction::Remove => '-',
            },
            flag_list(flags)
        );
        let session = &mut self.session;
        timed(TimeoutPhase::Write, self.timeouts.write, async move {
            let stream = session
                .uid_store(uids.as_str(), &query)
                .await
                .map_err(|e| Error::Imap(format!("Store failed: {e}")))?;
            let _: Vec<_> = stream.collect().await;
            Ok(())
        })
        .await
    }

    async fn move_messages(&mut self, uids: &UidSet, target: &str) -> Result<()> {
        let session = &mut self.session;
        timed(TimeoutPhase::Write, self.timeouts.write, async move {
            if session.uid_mv(uids.as_str(), target).await.is_ok() {
                return Ok(());
            }
            // No MOVE extension: copy and leave the originals flagged.
            session
                .uid_copy(uids.as_str(), target)
                .await
                .map_err(|e| Error::Imap(format!("Failed to move to {target}: {e}")))?;
            let stream = session
                .uid_store(uids.as_str(), "+FLAGS.SILENT (\\Deleted)")
                .await
                .map_err(|e| Error::Imap(format!("Store failed: {e}")))?;
            let _: Vec<_> = stream.collect().await;
            Ok(())
        })
        .await
    }

    async fn expunge(&mut self) -> Result<()> {
        let session = &mut self.session;
        timed(TimeoutPhase::Write, self.timeouts.write, async move {
            let stream = session
                .expunge()
                .await
                .map_err(|e| Error::Imap(format!("Expunge failed: {e}")))?;
            let _: Vec<_> = stream.collect().await;
            Ok(())
        })
        .await
    }

    async fn append(&mut self, folder: &str, flags: &[Flag], content: &[u8]) -> Result<()> {
        let flags = (!flags.is_empty()).then(|| flag_list(flags));
        timed(TimeoutPhase::Write, self.timeouts.write, async {
            self.session
                .append(folder, flags.as_deref(), None, content)
                .await
                .map_err(|e| Error::Imap(format!("Append to {folder} failed: {e}")))
        })
        .await
    }

    async fn quota(&mut self, folder: &str) -> Result<Option<Quota>> {
        let (_, quotas) = timed(TimeoutPhase::Read, self.timeouts.read, async {
            self.session
                .get_quota_root(folder)
                .await
                .map_err(|e| Error::Imap(format!("Quota lookup failed: {e}")))
        })
        .await?;
        Ok(quotas
            .iter()
            .flat_map(|q| &q.resources)
            .find(|r| r.name == QuotaResourceName::Storage)
            .map(|r| Quota {
                usage: r.usage,
                limit: r.limit,
            }))
    }

    async fn noop(&mut self) -> Result<()> {
        timed(TimeoutPhase::Read, self.timeouts.read, async {
            self.session
                .noop()
                .await
                .map_err(|e| Error::Imap(format!("NOOP failed: {e}")))
        })
        .await
    }

    async fn logout(&mut self) -> Result<()> {
        timed(TimeoutPhase::Close, self.timeouts.close, async {
            self.session
                .logout()
                .await
                .map_err(|e| Error::Imap(format!("Logout failed: {e}")))
        })
        .await
    }

    fn set_timeout(&mut self, phase: TimeoutPhase, timeout: Duration) {
        self.timeouts.set(phase, timeout);
    }

    fn timeout(&self, phase: TimeoutPhase) -> Duration {
        self.timeouts.get(phase)
    }
}

/// Render ascending UIDs as a sequence set, runs collapsed to ranges.
fn compact_uids(uids: &[u32]) -> String {
    let mut members: Vec<String> = Vec::new();
    let mut iter = uids.iter().copied().peekable();
    while let Some(start) = iter.next() {
        let mut end = start;
        while let Some(&next) = iter.peek() {
            if Some(next) != end.checked_add(1) {
                break;
            }
            end = next;
            iter.next();
        }
        members.push(if end == start {
            start.to_string()
        } else {
            format!("{start}:{end}")
        });
    }
    members.join(",")
}

fn text(bytes: Option<&Cow<'_, [u8]>>) -> Option<String> {
    bytes.map(|b| to_utf8(b, None))
}

fn raw_addresses(list: Option<&Vec<Address<'_>>>) -> Vec<RawAddress> {
    list.map(|addrs| {
        addrs
            .iter()
            .map(|a| RawAddress {
                name: text(a.name.as_ref()),
                mailbox: text(a.mailbox.as_ref()),
                host: text(a.host.as_ref()),
            })
            .collect()
    })
    .unwrap_or_default()
}

fn convert_flag(flag: &async_imap::types::Flag<'_>) -> Option<Flag> {
    use async_imap::types::Flag as Wire;
    match flag {
        Wire::Seen => Some(Flag::Seen),
        Wire::Answered => Some(Flag::Answered),
        Wire::Flagged => Some(Flag::Flagged),
        Wire::Deleted => Some(Flag::Deleted),
        Wire::Draft => Some(Flag::Draft),
        Wire::Recent => Some(Flag::Recent),
        Wire::MayCreate => None,
        Wire::Custom(keyword) => Some(Flag::Keyword(keyword.to_string())),
    }
}

fn header_info(uid: u32, fetch: &Fetch) -> HeaderInfo {
    let mut info = HeaderInfo {
        uid,
        seq: fetch.message,
        flags: fetch.flags().filter_map(|f| convert_flag(&f)).collect(),
        size: fetch.size.unwrap_or_default(),
        internal_date: fetch.internal_date(),
        raw_header: fetch.header().map(|h| to_utf8(h, None)).unwrap_or_default(),
        ..HeaderInfo::default()
    };
    if let Some(envelope) = fetch.envelope() {
        info.from = raw_addresses(envelope.from.as_ref());
        info.to = raw_addresses(envelope.to.as_ref());
        info.cc = raw_addresses(envelope.cc.as_ref());
        info.bcc = raw_addresses(envelope.bcc.as_ref());
        info.reply_to = raw_addresses(envelope.reply_to.as_ref());
        info.subject = text(envelope.subject.as_ref());
        info.message_id = text(envelope.message_id.as_ref());
        info.in_reply_to = text(envelope.in_reply_to.as_ref());
        info.date = text(envelope.date.as_ref());
    }
    info
}

type Params<'a> = Option<Vec<(Cow<'a, str>, Cow<'a, str>)>>;

fn params(list: &Params<'_>) -> Vec<(String, String)> {
    list.iter()
        .flatten()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn transfer_encoding(encoding: &ContentEncoding<'_>) -> TransferEncoding {
    match encoding {
        ContentEncoding::SevenBit => TransferEncoding::SevenBit,
        ContentEncoding::EightBit => TransferEncoding::EightBit,
        ContentEncoding::Binary => TransferEncoding::Binary,
        ContentEncoding::Base64 => TransferEncoding::Base64,
        ContentEncoding::QuotedPrintable => TransferEncoding::QuotedPrintable,
        ContentEncoding::Other(name) => TransferEncoding::from(&**name),
    }
}

fn leaf(
    common: &BodyContentCommon<'_>,
    other: &BodyContentSinglePart<'_>,
    embedded: Option<BodyNode>,
) -> BodyLeaf {
    let mut leaf = BodyLeaf::new(&common.ty.ty, &common.ty.subtype);
    leaf.params = params(&common.ty.params);
    leaf.content_id = other.id.as_ref().map(ToString::to_string);
    leaf.encoding = transfer_encoding(&other.transfer_encoding);
    leaf.size = other.octets;
    leaf.disposition = common
        .disposition
        .as_ref()
        .map(|d| Disposition::new(&d.ty, params(&d.params)));
    leaf.embedded = embedded.map(Box::new);
    leaf
}

fn convert_structure(structure: &BodyStructure<'_>) -> BodyNode {
    match structure {
        BodyStructure::Multipart { common, bodies, .. } => BodyNode::Multipart {
            subtype: common.ty.subtype.to_ascii_lowercase(),
            parts: bodies.iter().map(convert_structure).collect(),
        },
        BodyStructure::Basic { common, other, .. } | BodyStructure::Text { common, other, .. } => {
            BodyNode::Leaf(leaf(common, other, None))
        }
        BodyStructure::Message {
            common, other, body, ..
        } => BodyNode::Leaf(leaf(common, other, Some(convert_structure(body)))),
    }
}

/// Certificate verifier that accepts all certificates
/// (for self-signed local servers).
#[derive(Debug)]
struct DangerousVerifier;

impl rustls::client::danger::ServerCertVerifier for DangerousVerifier {
    fn verify_server_cert(
        &self,
        _end_entity: &rustls::pki_types::CertificateDer<'_>,
        _intermediates: &[rustls::pki_types::CertificateDer<'_>],
        _server_name: &rustls::pki_types::ServerName<'_>,
        _ocsp_response: &[u8],
        _now: rustls::pki_types::UnixTime,
    ) -> std::result::Result<rustls::client::danger::ServerCertVerified, rustls::Error> {
        Ok(rustls::client::danger::ServerCertVerified::assertion())
    }

    fn verify_tls12_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn verify_tls13_signature(
        &self,
        _message: &[u8],
        _cert: &rustls::pki_types::CertificateDer<'_>,
        _dss: &rustls::DigitallySignedStruct,
    ) -> std::result::Result<rustls::client::danger::HandshakeSignatureValid, rustls::Error> {
        Ok(rustls::client::danger::HandshakeSignatureValid::assertion())
    }

    fn supported_verify_schemes(&self) -> Vec<rustls::SignatureScheme> {
        rustls::crypto::ring::default_provider()
            .signature_verification_algorithms
            .supported_schemes()
    }
}
