//! Content-transfer-encoding and charset normalisation
//!
//! Every leaf of a MIME structure is transferred in one of the RFC 2045
//! encodings. [`decode_transfer`] undoes it; unknown encodings pass the
//! payload through untouched. Header text (subjects, display names,
//! attachment names) goes through [`decode_mime_words`], and body text
//! through [`to_utf8`].

use base64::engine::general_purpose::GeneralPurpose;
use base64::engine::{DecodePaddingMode, GeneralPurposeConfig};
use base64::{Engine, alphabet};
use encoding_rs::{Encoding, WINDOWS_1252};
use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::warn;

lazy_static! {
    static ref ENCODED_WORD: Regex =
        Regex::new(r"=\?([^?\s]+)\?([bBqQ])\?([^?\s]*)\?=").expect("valid encoded-word regex");
}

/// Base64 as found in the wild: padding optional, trailing bits ignored.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new()
        .with_decode_padding_mode(DecodePaddingMode::Indifferent)
        .with_decode_allow_trailing_bits(true),
);

/// The transfer encoding of one MIME leaf.
///
/// The numeric tags follow the classic body-structure numbering:
/// 0 7bit, 1 8bit, 2 binary, 3 base64, 4 quoted-printable, 5 other.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(into = "String", from = "String")]
pub enum TransferEncoding {
    #[default]
    SevenBit,
    EightBit,
    Binary,
    Base64,
    QuotedPrintable,
    Other(String),
}

impl TransferEncoding {
    #[must_use]
    pub const fn tag(&self) -> u8 {
        match self {
            Self::SevenBit => 0,
            Self::EightBit => 1,
            Self::Binary => 2,
            Self::Base64 => 3,
            Self::QuotedPrintable => 4,
            Self::Other(_) => 5,
        }
    }

    #[must_use]
    pub fn from_tag(tag: u8) -> Self {
        match tag {
            0 => Self::SevenBit,
            1 => Self::EightBit,
            2 => Self::Binary,
            3 => Self::Base64,
            4 => Self::QuotedPrintable,
            _ => Self::Other(String::new()),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        match self {
            Self::SevenBit => "7bit",
            Self::EightBit => "8bit",
            Self::Binary => "binary",
            Self::Base64 => "base64",
            Self::QuotedPrintable => "quoted-printable",
            Self::Other(name) => name,
        }
    }
}

impl From<&str> for TransferEncoding {
    fn from(s: &str) -> Self {
        match s.trim().to_ascii_lowercase().as_str() {
            "7bit" => Self::SevenBit,
            "8bit" => Self::EightBit,
            "binary" => Self::Binary,
            "base64" => Self::Base64,
            "quoted-printable" => Self::QuotedPrintable,
            _ => Self::Other(s.to_string()),
        }
    }
}

impl From<String> for TransferEncoding {
    fn from(s: String) -> Self {
        Self::from(s.as_str())
    }
}

impl From<TransferEncoding> for String {
    fn from(enc: TransferEncoding) -> Self {
        enc.as_str().to_string()
    }
}

impl fmt::Display for TransferEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Undo the transfer encoding of a fetched body part.
///
/// 7bit, 8bit, binary and unknown encodings are returned as-is. A
/// base64 payload that cannot be decoded is also returned as-is.
#[must_use]
pub fn decode_transfer(data: &[u8], encoding: &TransferEncoding) -> Vec<u8> {
    match encoding {
        TransferEncoding::Base64 => {
            let compact: Vec<u8> = data
                .iter()
                .copied()
                .filter(|b| !b.is_ascii_whitespace())
                .collect();
            LENIENT_BASE64.decode(&compact).unwrap_or_else(|e| {
                warn!("Undecodable base64 payload, passing through: {}", e);
                data.to_vec()
            })
        }
        TransferEncoding::QuotedPrintable => qp_decode(data),
        TransferEncoding::SevenBit
        | TransferEncoding::EightBit
        | TransferEncoding::Binary
        | TransferEncoding::Other(_) => data.to_vec(),
    }
}

/// Decode quoted-printable (RFC 2045 section 6.7).
///
/// Soft line breaks are removed for both CRLF and bare LF endings.
/// Invalid escapes are copied through verbatim.
#[must_use]
pub fn qp_decode(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len());
    let mut i = 0;
    while i < data.len() {
        if data[i] != b'=' {
            out.push(data[i]);
            i += 1;
            continue;
        }
        match (data.get(i + 1), data.get(i + 2)) {
            (Some(b'\r'), Some(b'\n')) => i += 3,
            (Some(b'\n'), _) => i += 2,
            (Some(&hi), Some(&lo)) => {
                if let (Some(hi), Some(lo)) = (hex_value(hi), hex_value(lo)) {
                    out.push((hi << 4) | lo);
                    i += 3;
                } else {
                    out.push(b'=');
                    i += 1;
                }
            }
            _ => {
                out.push(b'=');
                i += 1;
            }
        }
    }
    out
}

const fn hex_value(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

/// Decode every RFC 2047 encoded word in `text`.
///
/// Whitespace between two adjacent encoded words is dropped; all other
/// text, including words that fail to decode, is kept unchanged.
///
/// # Examples
///
/// ```
/// use imap_mailbox::decode_mime_words;
///
/// assert_eq!(decode_mime_words("=?ISO-8859-1?Q?Andr=E9?= Pirard"), "André Pirard");
/// assert_eq!(decode_mime_words("plain subject"), "plain subject");
/// ```
#[must_use]
pub fn decode_mime_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    let mut after_word = false;

    for caps in ENCODED_WORD.captures_iter(text) {
        let Some(word) = caps.get(0) else {
            continue;
        };
        let between = &text[last_end..word.start()];
        if let Some(decoded) = decode_word(&caps[1], &caps[2], &caps[3]) {
            if !(after_word && between.trim().is_empty()) {
                out.push_str(between);
            }
            out.push_str(&decoded);
            after_word = true;
        } else {
            out.push_str(between);
            out.push_str(word.as_str());
            after_word = false;
        }
        last_end = word.end();
    }
    out.push_str(&text[last_end..]);
    out
}

fn decode_word(charset: &str, encoding: &str, content: &str) -> Option<String> {
    // RFC 2231 allows a language suffix: =?utf-8*en?Q?...?=
    let charset = charset.split('*').next().unwrap_or(charset);
    let bytes = if encoding.eq_ignore_ascii_case("b") {
        LENIENT_BASE64.decode(content).ok()?
    } else {
        qp_decode(content.replace('_', " ").as_bytes())
    };
    let encoding = Encoding::for_label(charset.as_bytes())?;
    Some(encoding.decode_with_bom_removal(&bytes).0.into_owned())
}

/// Convert text bytes to a UTF-8 string.
///
/// The declared charset wins when `encoding_rs` knows it; otherwise
/// valid UTF-8 is kept and anything else is read as Windows-1252.
#[must_use]
pub fn to_utf8(data: &[u8], charset: Option<&str>) -> String {
    if let Some(encoding) = charset.and_then(|label| Encoding::for_label(label.trim().as_bytes())) {
        return encoding.decode_with_bom_removal(data).0.into_owned();
    }
    match std::str::from_utf8(data) {
        Ok(text) => text.to_string(),
        Err(_) => WINDOWS_1252.decode_without_bom_handling(data).0.into_owned(),
    }
}
