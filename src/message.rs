//! Normalised message records
//!
//! A [`Message`] is assembled from the header metadata, the decoded
//! attachments and the two body variants of one server message. The
//! record is plain data: it serialises to JSON (attachment content as
//! base64) and is what the cache stores.

use crate::embed::embed_inline_images;
use crate::encoding::{TransferEncoding, decode_mime_words, decode_transfer};
use crate::flag::MessageFlags;
use crate::mime::AttachmentPart;
use crate::transport::{HeaderInfo, RawAddress};
use chrono::DateTime;
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref PRIORITY: Regex =
        Regex::new(r"(?mi)^X-Priority:[ \t]*(\d)").expect("valid priority regex");
    static ref MESSAGE_ID: Regex = Regex::new(r"<[^<>\s]+>").expect("valid message-id regex");
}

/// Priority of a message without (or with an unusable) `X-Priority`.
pub const DEFAULT_PRIORITY: u8 = 3;

/// A mailbox address with its decoded display name.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address {
    /// `mailbox@host`, empty when the server could not parse it.
    pub email: String,
    pub name: String,
}

impl Address {
    #[must_use]
    pub fn from_raw(raw: &RawAddress) -> Self {
        let email = match (&raw.mailbox, &raw.host) {
            (Some(mailbox), Some(host)) => format!("{mailbox}@{host}"),
            _ => String::new(),
        };
        let name = raw
            .name
            .as_deref()
            .map(decode_mime_words)
            .unwrap_or_default();
        Self { email, name }
    }
}

fn addresses(raw: &[RawAddress]) -> Vec<Address> {
    raw.iter().map(Address::from_raw).collect()
}

/// One decoded attachment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub name: String,
    pub part_number: String,
    pub encoding: TransferEncoding,
    /// Size as announced in the body structure.
    pub size: u32,
    /// Content-ID, empty when absent.
    pub reference: String,
    pub disposition: String,
    pub subtype: String,
    #[serde(with = "base64_bytes")]
    pub content: Vec<u8>,
    /// Length of the decoded content.
    pub content_size: usize,
}

impl Attachment {
    /// Decode the raw bytes fetched for `part`.
    #[must_use]
    pub fn decode(part: AttachmentPart, raw: &[u8]) -> Self {
        let content = decode_transfer(raw, &part.encoding);
        Self {
            name: part.name,
            part_number: part.part,
            encoding: part.encoding,
            size: part.size,
            reference: part.reference,
            disposition: part.disposition,
            subtype: part.subtype,
            content_size: content.len(),
            content,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Body {
    pub html: String,
    pub plain: String,
}

/// A fully normalised message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub uid: u32,
    /// Sequence number in the folder when the record was returned.
    pub id: u32,
    pub from: Address,
    pub to: Vec<Address>,
    pub cc: Vec<Address>,
    pub bcc: Vec<Address>,
    pub reply_to: Vec<Address>,
    pub message_id: String,
    pub in_reply_to: String,
    pub references: Vec<String>,
    /// The Date header as sent.
    pub date: String,
    /// Unix timestamp of `date`, or of the internal date when the
    /// header is missing or unparsable.
    pub timestamp: i64,
    pub subject: String,
    pub priority: u8,
    pub flags: MessageFlags,
    pub size: u32,
    /// Downloadable attachments; inline parts are embedded into the
    /// HTML body instead.
    pub attachments: Vec<Attachment>,
    pub body: Body,
}

impl Message {
    /// Assemble the record, embedding inline images into the HTML body
    /// and keeping only `attachment`-disposition entries in the list.
    #[must_use]
    pub fn build(header: &HeaderInfo, attachments: Vec<Attachment>, mut body: Body) -> Self {
        if !body.html.is_empty() {
            body.html = embed_inline_images(&body.html, &attachments);
        }
        let attachments = attachments
            .into_iter()
            .filter(|a| a.disposition == "attachment")
            .collect();

        Self {
            uid: header.uid,
            id: header.seq,
            from: header.from.first().map(Address::from_raw).unwrap_or_default(),
            to: addresses(&header.to),
            cc: addresses(&header.cc),
            bcc: addresses(&header.bcc),
            reply_to: addresses(&header.reply_to),
            message_id: header.message_id.clone().unwrap_or_default(),
            in_reply_to: header.in_reply_to.clone().unwrap_or_default(),
            references: parse_references(&header.raw_header),
            date: header.date.clone().unwrap_or_default(),
            timestamp: timestamp(header),
            subject: header
                .subject
                .as_deref()
                .map(decode_mime_words)
                .unwrap_or_default(),
            priority: parse_priority(&header.raw_header),
            flags: MessageFlags::from_flags(&header.flags),
            size: header.size,
            attachments,
            body,
        }
    }
}

/// Read `X-Priority` from a raw header block; 1 to 5, else 3.
#[must_use]
pub fn parse_priority(raw_header: &str) -> u8 {
    PRIORITY
        .captures(raw_header)
        .and_then(|caps| caps[1].parse().ok())
        .filter(|p| (1..=5).contains(p))
        .unwrap_or(DEFAULT_PRIORITY)
}

/// Unfolded value of the first header called `name`.
#[must_use]
pub fn header_value(raw_header: &str, name: &str) -> Option<String> {
    let mut lines = raw_header.lines();
    while let Some(line) = lines.next() {
        let Some((key, value)) = line.split_once(':') else {
            continue;
        };
        if !key.trim().eq_ignore_ascii_case(name) || key.starts_with([' ', '\t']) {
            continue;
        }
        let mut value = value.trim().to_string();
        for cont in lines.by_ref() {
            if !cont.starts_with([' ', '\t']) {
                break;
            }
            value.push(' ');
            value.push_str(cont.trim());
        }
        return Some(value);
    }
    None
}

/// Message-ids listed in the `References` header, in order.
#[must_use]
pub fn parse_references(raw_header: &str) -> Vec<String> {
    header_value(raw_header, "References")
        .map(|value| {
            MESSAGE_ID
                .find_iter(&value)
                .map(|m| m.as_str().to_string())
                .collect()
        })
        .unwrap_or_default()
}

fn timestamp(header: &HeaderInfo) -> i64 {
    header
        .date
        .as_deref()
        .and_then(parse_date)
        .or_else(|| header.internal_date.map(|d| d.timestamp()))
        .unwrap_or_default()
}

fn parse_date(date: &str) -> Option<i64> {
    // Strip a trailing zone comment such as "(UTC)".
    let date = match date.rfind('(') {
        Some(idx) if date.trim_end().ends_with(')') => &date[..idx],
        _ => date,
    };
    DateTime::parse_from_rfc2822(date.trim())
        .ok()
        .map(|d| d.timestamp())
}

mod base64_bytes {
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let text = String::deserialize(deserializer)?;
        STANDARD.decode(text).map_err(serde::de::Error::custom)
    }
}
