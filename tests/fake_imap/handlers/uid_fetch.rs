//! UID FETCH command handler.
//!
//! Message bodies travel as **counted literals**: `{length}\r\n`
//! followed by exactly that many raw bytes.
//!
//! ```text
//! * <seq> FETCH (UID <uid> FLAGS (\Seen) BODY[HEADER] {<length>}
//! <exactly length bytes>)
//! ```
//!
//! The handler answers the data items the client asks for: `UID`,
//! `FLAGS`, `RFC822.SIZE`, `INTERNALDATE`, `ENVELOPE`, `BODYSTRUCTURE`
//! and `BODY[...]`/`BODY.PEEK[...]` sections (`HEADER`, `TEXT`, `1` or
//! the whole message). Every test message is a single `text/plain`
//! part.

use crate::fake_imap::io::{complete, write_bytes, write_line};
use crate::fake_imap::mailbox::{Mailbox, TestMessage};
use imap_codec::imap_types::sequence::SequenceSet;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

/// One piece of a FETCH response: protocol text or a literal payload.
enum Chunk {
    Text(String),
    Literal(Vec<u8>),
}

/// The data item names of the raw command line, upper-cased.
pub fn requested_items(line: &str) -> Vec<String> {
    let (Some(start), Some(end)) = (line.find('('), line.rfind(')')) else {
        return line
            .split_whitespace()
            .last()
            .map(|item| vec![item.to_ascii_uppercase()])
            .unwrap_or_default();
    };
    line[start + 1..end]
        .split_whitespace()
        .map(str::to_ascii_uppercase)
        .collect()
}

pub async fn handle_uid_fetch<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    sequence_set: &SequenceSet,
    items: &[String],
    mailbox: &Mailbox,
    selected_folder: Option<&str>,
    stream: &mut BufReader<S>,
) {
    let Some(folder_name) = selected_folder else {
        complete(stream, tag, "BAD", "No folder selected").await;
        return;
    };
    let Some(folder) = mailbox.get_folder(folder_name) else {
        complete(stream, tag, "BAD", "Folder not found").await;
        return;
    };

    for (seq, message) in folder.select_uids(sequence_set) {
        for chunk in fetch_response(seq, message, items) {
            let written = match chunk {
                Chunk::Text(text) => write_line(stream, &text).await,
                Chunk::Literal(bytes) => write_bytes(stream, &bytes).await,
            };
            if written.is_err() {
                return;
            }
        }
    }
    complete(stream, tag, "OK", "FETCH completed").await;
}

fn fetch_response(seq: usize, message: &TestMessage, items: &[String]) -> Vec<Chunk> {
    let mut head = format!("* {seq} FETCH (UID {}", message.uid);
    for item in items {
        match item.as_str() {
            "FLAGS" => head.push_str(&format!(" FLAGS {}", message.flag_list())),
            "RFC822.SIZE" => head.push_str(&format!(" RFC822.SIZE {}", message.raw.len())),
            "INTERNALDATE" => {
                if let Some(date) = internal_date(message) {
                    head.push_str(&format!(" INTERNALDATE \"{date}\""));
                }
            }
            "ENVELOPE" => head.push_str(&format!(" ENVELOPE {}", envelope(message))),
            "BODYSTRUCTURE" => head.push_str(&format!(" BODYSTRUCTURE {}", body_structure(message))),
            _ => {}
        }
    }

    // Sections go last, each as a literal.
    let mut chunks = vec![Chunk::Text(head)];
    for item in items {
        let Some(section) = item
            .strip_prefix("BODY.PEEK[")
            .or_else(|| item.strip_prefix("BODY["))
            .and_then(|rest| rest.strip_suffix(']'))
        else {
            continue;
        };
        let bytes = match section {
            "HEADER" => message.header(),
            "TEXT" | "1" => message.text(),
            "" => &message.raw,
            _ => continue,
        };
        chunks.push(Chunk::Text(format!(" BODY[{section}] {{{}}}\r\n", bytes.len())));
        chunks.push(Chunk::Literal(bytes.to_vec()));
    }
    chunks.push(Chunk::Text(")\r\n".to_string()));
    chunks
}

/// An IMAP nstring: quoted when plain ASCII, a literal otherwise.
fn nstring(value: Option<&str>) -> String {
    match value {
        None => "NIL".to_string(),
        Some(v) if v.is_ascii() && !v.contains(['\r', '\n']) => {
            format!("\"{}\"", v.replace('\\', "\\\\").replace('"', "\\\""))
        }
        Some(v) => format!("{{{}}}\r\n{v}", v.len()),
    }
}

/// `Name <mailbox@host>` or `mailbox@host` as an envelope address list.
fn address_list(value: Option<String>) -> String {
    let Some(value) = value else {
        return "NIL".to_string();
    };
    let (name, email) = match (value.find('<'), value.rfind('>')) {
        (Some(open), Some(close)) if open < close => (
            Some(value[..open].trim().trim_matches('"').to_string()).filter(|n| !n.is_empty()),
            value[open + 1..close].to_string(),
        ),
        _ => (None, value.trim().to_string()),
    };
    let (mailbox, host) = email.split_once('@').unwrap_or((email.as_str(), ""));
    format!(
        "(({} NIL {} {}))",
        nstring(name.as_deref()),
        nstring(Some(mailbox)),
        nstring(Some(host))
    )
}

fn envelope(message: &TestMessage) -> String {
    let header = |name: &str| message.header_value(name);
    let from = address_list(header("From"));
    format!(
        "({} {} {from} {from} {} {} {} NIL {} {})",
        nstring(header("Date").as_deref()),
        nstring(header("Subject").as_deref()),
        header("Reply-To").map_or_else(|| from.clone(), |r| address_list(Some(r))),
        address_list(header("To")),
        address_list(header("Cc")),
        nstring(header("In-Reply-To").as_deref()),
        nstring(header("Message-ID").as_deref()),
    )
}

fn body_structure(message: &TestMessage) -> String {
    let text = message.text();
    let lines = text.split(|b| *b == b'\n').count();
    format!(
        "(\"TEXT\" \"PLAIN\" (\"CHARSET\" \"UTF-8\") NIL NIL \"7BIT\" {} {lines})",
        text.len()
    )
}

fn internal_date(message: &TestMessage) -> Option<String> {
    let date = chrono::DateTime::parse_from_rfc2822(&message.header_value("Date")?).ok()?;
    Some(date.format("%d-%b-%Y %H:%M:%S %z").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::capture;
    use crate::fake_imap::mailbox::{MailboxBuilder, make_raw_message};
    use imap_codec::imap_types::sequence::{SeqOrUid, Sequence};
    use std::num::NonZeroU32;

    fn uid_set(uid: u32) -> SequenceSet {
        SequenceSet(
            vec![Sequence::Single(SeqOrUid::Value(NonZeroU32::new(uid).unwrap()))]
                .try_into()
                .unwrap(),
        )
    }

    fn mailbox() -> Mailbox {
        let raw = make_raw_message(
            "Alice <alice@example.com>",
            "bob@example.com",
            "Hello",
            "Body text",
            "Mon, 01 Jan 2024 10:00:00 +0000",
        );
        MailboxBuilder::new().folder("INBOX").message(42, true, &raw).build()
    }

    async fn run(line: &str, uid: u32, selected: Option<&str>) -> String {
        let mailbox = mailbox();
        let items = requested_items(line);
        capture(async |s| handle_uid_fetch("A1", &uid_set(uid), &items, &mailbox, selected, s).await).await
    }

    #[test]
    fn parses_item_lists() {
        assert_eq!(
            requested_items("A1 UID FETCH 1:* (UID flags BODY.PEEK[1])"),
            vec!["UID", "FLAGS", "BODY.PEEK[1]"]
        );
        assert_eq!(requested_items("A1 UID FETCH 4 UID"), vec!["UID"]);
    }

    #[tokio::test]
    async fn sections_are_sent_as_literals() {
        let output = run("A1 UID FETCH 42 (UID BODY.PEEK[TEXT])", 42, Some("INBOX")).await;

        assert!(output.starts_with("* 1 FETCH (UID 42 BODY[TEXT] {9}\r\nBody text)\r\n"));
        assert!(output.ends_with("A1 OK FETCH completed\r\n"));
    }

    #[tokio::test]
    async fn envelope_carries_addresses() {
        let output = run("A1 UID FETCH 42 (UID FLAGS ENVELOPE)", 42, Some("INBOX")).await;

        assert!(output.contains("FLAGS (\\Seen)"));
        assert!(output.contains("((\"Alice\" NIL \"alice\" \"example.com\"))"));
        assert!(output.contains("((NIL NIL \"bob\" \"example.com\"))"));
        assert!(output.contains("\"<test-Hello@fake.test>\""));
    }

    #[tokio::test]
    async fn body_structure_is_a_single_text_part() {
        let output = run("A1 UID FETCH 42 (UID BODYSTRUCTURE)", 42, Some("INBOX")).await;
        assert!(output.contains("BODYSTRUCTURE (\"TEXT\" \"PLAIN\" (\"CHARSET\" \"UTF-8\") NIL NIL \"7BIT\" 9 1)"));
    }

    #[tokio::test]
    async fn missing_uid_returns_only_ok() {
        let output = run("A1 UID FETCH 99 (UID)", 99, Some("INBOX")).await;
        assert_eq!(output, "A1 OK FETCH completed\r\n");
    }

    #[tokio::test]
    async fn no_folder_selected_returns_bad() {
        let output = run("A1 UID FETCH 42 (UID)", 42, None).await;
        assert!(output.contains("A1 BAD No folder selected"));
    }
}
