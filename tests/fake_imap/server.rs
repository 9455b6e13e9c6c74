//! In-process fake IMAP server for integration testing
//!
//! ## Connection lifecycle
//!
//! ```text
//!   Client connects via TCP
//!       |
//!   Server sends greeting: "* OK IMAP4rev1 ready\r\n"
//!       |
//!   Client sends STARTTLS, both sides run the TLS handshake
//!       |
//!   Client sends LOGIN, then LIST, SELECT, UID SEARCH, UID FETCH, ...
//!       |
//!   Client sends LOGOUT
//! ```
//!
//! Every command starts with a client-chosen tag that the server
//! echoes in the tagged completion (`A0001 OK LOGIN completed`).
//! Lines prefixed with `*` are untagged data sent before it.
//!
//! Commands the fake does not implement (UID MOVE, APPEND) are
//! answered with `BAD`, which sends the client down its fallback paths.

use super::handlers::{
    StoreArgs, handle_capability, handle_create, handle_delete, handle_expunge,
    handle_get_quota_root, handle_list, handle_login, handle_logout, handle_noop, handle_rename,
    handle_select, handle_uid_copy, handle_uid_fetch, handle_uid_search, handle_uid_store,
    handle_unselect, requested_items,
};
use super::io::{complete, write_line};
use super::mailbox::Mailbox;
use imap_codec::CommandCodec;
use imap_codec::decode::Decoder;
use imap_codec::imap_types::command::CommandBody;
use imap_codec::imap_types::mailbox::Mailbox as ImapMailbox;
use rcgen::generate_simple_self_signed;
use rustls::pki_types::PrivatePkcs8KeyDer;
use std::sync::{Arc, Mutex};
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, BufReader};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;

/// A fake IMAP server on localhost with an OS-assigned port.
///
/// A self-signed certificate is generated at startup with `rcgen`.
/// The mailbox state is shared by all connections, so changes made by
/// one session are visible to the next and to the test itself.
pub struct FakeImapServer {
    port: u16,
    mailbox: Arc<Mutex<Mailbox>>,
    handle: tokio::task::JoinHandle<()>,
}

impl FakeImapServer {
    /// Start serving `mailbox`. The server stops when dropped.
    pub async fn start(mailbox: Mailbox) -> Self {
        // Tests race to install the provider; losing the race is fine.
        let _ = rustls::crypto::ring::default_provider().install_default();

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind to ephemeral port");
        let port = listener.local_addr().unwrap().port();

        let cert = generate_simple_self_signed(vec!["127.0.0.1".to_string()])
            .expect("generate self-signed cert");
        let cert_der = cert.cert.der().clone();
        let key_der = PrivatePkcs8KeyDer::from(cert.key_pair.serialize_der());

        let tls_config = rustls::ServerConfig::builder()
            .with_no_client_auth()
            .with_single_cert(vec![cert_der], key_der.into())
            .expect("build server TLS config");

        let acceptor = TlsAcceptor::from(Arc::new(tls_config));
        let mailbox = Arc::new(Mutex::new(mailbox));
        let shared = mailbox.clone();

        let handle = tokio::spawn(async move {
            loop {
                let Ok((stream, _addr)) = listener.accept().await else {
                    break;
                };
                let acceptor = acceptor.clone();
                let mailbox = shared.clone();
                tokio::spawn(async move {
                    handle_connection(stream, acceptor, &mailbox).await;
                });
            }
        });

        Self {
            port,
            mailbox,
            handle,
        }
    }

    pub const fn port(&self) -> u16 {
        self.port
    }

    /// A copy of the current mailbox state.
    pub fn snapshot(&self) -> Mailbox {
        self.mailbox.lock().unwrap().clone()
    }
}

impl Drop for FakeImapServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

/// Greeting and STARTTLS on the plain stream, then the TLS session.
async fn handle_connection(stream: tokio::net::TcpStream, acceptor: TlsAcceptor, mailbox: &Mutex<Mailbox>) {
    let mut reader = BufReader::new(stream);

    if write_line(&mut reader, "* OK IMAP4rev1 Fake server ready\r\n")
        .await
        .is_err()
    {
        return;
    }

    let mut line = String::new();
    if reader.read_line(&mut line).await.is_err() {
        return;
    }
    let Some((tag, command)) = line.trim().split_once(' ') else {
        return;
    };
    if !command.eq_ignore_ascii_case("STARTTLS") {
        complete(&mut reader, tag, "BAD", "Expected STARTTLS").await;
        return;
    }
    let tag = tag.to_string();
    complete(&mut reader, &tag, "OK", "Begin TLS negotiation now").await;

    let tcp = reader.into_inner();
    let Ok(tls_stream) = acceptor.accept(tcp).await else {
        return;
    };
    handle_imap_session(tls_stream, mailbox).await;
}

fn mailbox_name(mb: &ImapMailbox<'_>) -> String {
    match mb {
        ImapMailbox::Inbox => "INBOX".to_string(),
        ImapMailbox::Other(other) => {
            let bytes: &[u8] = other.as_ref();
            String::from_utf8_lossy(bytes).into_owned()
        }
    }
}

/// The password argument of a LOGIN line, unquoted.
fn login_password(line: &str) -> String {
    line.split_whitespace()
        .last()
        .unwrap_or_default()
        .trim_matches('"')
        .to_string()
}

/// Parse each command with `imap-codec` and dispatch on its body.
///
/// Read handlers get a snapshot taken under the lock, write handlers
/// the shared `Mutex` itself.
#[allow(clippy::too_many_lines)]
async fn handle_imap_session<S: AsyncRead + AsyncWrite + Unpin>(stream: S, mailbox: &Mutex<Mailbox>) {
    let mut reader = BufReader::new(stream);
    let mut selected_folder: Option<String> = None;
    let codec = CommandCodec::default();

    loop {
        let mut line = String::new();
        match reader.read_line(&mut line).await {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let Ok((_, command)) = codec.decode(line.as_bytes()) else {
            let tag = trimmed.split_whitespace().next().unwrap_or("*");
            let resp = format!("{tag} BAD Parse error\r\n");
            if write_line(&mut reader, &resp).await.is_err() {
                break;
            }
            continue;
        };

        let tag = command.tag.inner();
        let snap = mailbox.lock().unwrap().clone();

        match command.body {
            CommandBody::Capability => handle_capability(tag, &mut reader).await,
            CommandBody::Noop => handle_noop(tag, &mut reader).await,
            CommandBody::Login { .. } => {
                if !handle_login(tag, login_password(trimmed).as_bytes(), &mut reader).await {
                    break;
                }
            }
            CommandBody::List { .. } => handle_list(tag, &snap, &mut reader).await,
            CommandBody::Select { mailbox: mb, .. } | CommandBody::Examine { mailbox: mb, .. } => {
                let name = mailbox_name(&mb);
                selected_folder = handle_select(tag, &name, &snap, &mut reader).await;
            }
            CommandBody::Unselect | CommandBody::Close => {
                handle_unselect(tag, &mut reader).await;
                selected_folder = None;
            }
            CommandBody::GetQuotaRoot { mailbox: mb } => {
                handle_get_quota_root(tag, &mailbox_name(&mb), &snap, &mut reader).await;
            }
            CommandBody::Create { mailbox: mb, .. } => {
                handle_create(tag, &mailbox_name(&mb), mailbox, &mut reader).await;
            }
            CommandBody::Delete { mailbox: mb, .. } => {
                handle_delete(tag, &mailbox_name(&mb), mailbox, &mut reader).await;
            }
            CommandBody::Rename { from, to, .. } => {
                let (from, to) = (mailbox_name(&from), mailbox_name(&to));
                handle_rename(tag, &from, &to, mailbox, &mut reader).await;
                if selected_folder.as_deref() == Some(from.as_str()) {
                    selected_folder = Some(to);
                }
            }
            CommandBody::Search {
                criteria,
                uid: true,
                ..
            } => {
                handle_uid_search(
                    tag,
                    criteria.as_ref(),
                    &snap,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Fetch {
                sequence_set,
                uid: true,
                ..
            } => {
                let items = requested_items(trimmed);
                handle_uid_fetch(
                    tag,
                    &sequence_set,
                    &items,
                    &snap,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Store {
                ref sequence_set,
                uid: true,
                ref kind,
                ref response,
                ref flags,
                ..
            } => {
                let args = StoreArgs {
                    sequence_set,
                    kind,
                    response,
                    flags,
                };
                handle_uid_store(tag, &args, mailbox, selected_folder.as_deref(), &mut reader).await;
            }
            CommandBody::Copy {
                ref sequence_set,
                mailbox: ref dest_mb,
                uid: true,
                ..
            } => {
                let dest_name = mailbox_name(dest_mb);
                handle_uid_copy(
                    tag,
                    sequence_set,
                    &dest_name,
                    mailbox,
                    selected_folder.as_deref(),
                    &mut reader,
                )
                .await;
            }
            CommandBody::Expunge => {
                handle_expunge(tag, mailbox, selected_folder.as_deref(), &mut reader).await;
            }
            CommandBody::Logout => {
                handle_logout(tag, &mut reader).await;
                break;
            }
            _ => complete(&mut reader, tag, "BAD", "Unknown command").await,
        }
    }
}
