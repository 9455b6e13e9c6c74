//! Search criteria builder and sort keys
//!
//! Criteria fragments are collected on a [`Search`] value borrowed from
//! the session and consumed by [`Search::search`]. Because the builder
//! is moved into that call, fragments can never leak into a later
//! search.

use crate::encoding::decode_mime_words;
use crate::error::{Error, Result};
use crate::session::Session;
use crate::transport::{HeaderInfo, RawAddress, Transport};
use chrono::{DateTime, NaiveDate};
use std::fmt;
use std::str::FromStr;
use tracing::warn;

/// Ordering of search results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    /// Date header.
    #[default]
    Date,
    /// Internal (arrival) date.
    Arrival,
    From,
    Subject,
    To,
    Cc,
    Size,
}

impl SortKey {
    /// The RFC 5256 sort criterion.
    #[must_use]
    pub const fn as_imap_str(self) -> &'static str {
        match self {
            Self::Date => "DATE",
            Self::Arrival => "ARRIVAL",
            Self::From => "FROM",
            Self::Subject => "SUBJECT",
            Self::To => "TO",
            Self::Cc => "CC",
            Self::Size => "SIZE",
        }
    }
}

/// A comparable sort value extracted from one message's headers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
enum SortValue {
    Number(i64),
    Text(String),
}

/// RFC 5256 base subject: decoded, lowercased, reply and forward
/// prefixes removed.
fn base_subject(subject: Option<&str>) -> String {
    let mut subject = decode_mime_words(subject.unwrap_or_default())
        .trim()
        .to_lowercase();
    loop {
        let stripped = ["re:", "fwd:", "fw:"]
            .iter()
            .find_map(|prefix| subject.strip_prefix(prefix))
            .map(|rest| rest.trim_start().to_string());
        match stripped {
            Some(rest) => subject = rest,
            None => return subject,
        }
    }
}

fn first_address(list: &[RawAddress]) -> String {
    list.first()
        .map(|a| {
            format!(
                "{}@{}",
                a.mailbox.as_deref().unwrap_or_default(),
                a.host.as_deref().unwrap_or_default()
            )
            .to_lowercase()
        })
        .unwrap_or_default()
}

fn sort_value(header: &HeaderInfo, key: SortKey) -> SortValue {
    let arrival = header.internal_date.map_or(0, |d| d.timestamp());
    match key {
        SortKey::Date => SortValue::Number(
            header
                .date
                .as_deref()
                .and_then(|d| DateTime::parse_from_rfc2822(d.trim()).ok())
                .map_or(arrival, |d| d.timestamp()),
        ),
        SortKey::Arrival => SortValue::Number(arrival),
        SortKey::Size => SortValue::Number(i64::from(header.size)),
        SortKey::Subject => SortValue::Text(base_subject(header.subject.as_deref())),
        SortKey::From => SortValue::Text(first_address(&header.from)),
        SortKey::To => SortValue::Text(first_address(&header.to)),
        SortKey::Cc => SortValue::Text(first_address(&header.cc)),
    }
}

/// Order UIDs by `key` the way a server-side SORT would.
///
/// Equal keys keep ascending UID order in both directions.
#[must_use]
pub fn sort_headers(headers: &[HeaderInfo], key: SortKey, descending: bool) -> Vec<u32> {
    let mut keyed: Vec<(SortValue, u32)> = headers
        .iter()
        .map(|h| (sort_value(h, key), h.uid))
        .collect();
    keyed.sort_by(|(a, a_uid), (b, b_uid)| {
        let order = if descending { b.cmp(a) } else { a.cmp(b) };
        order.then(a_uid.cmp(b_uid))
    });
    keyed.into_iter().map(|(_, uid)| uid).collect()
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.as_imap_str().to_ascii_lowercase())
    }
}

impl FromStr for SortKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "date" => Ok(Self::Date),
            "arrival" => Ok(Self::Arrival),
            "from" => Ok(Self::From),
            "subject" => Ok(Self::Subject),
            "to" => Ok(Self::To),
            "cc" => Ok(Self::Cc),
            "size" => Ok(Self::Size),
            other => Err(Error::Parse(format!("Unknown sort key: {other}"))),
        }
    }
}

/// A date to match with `ON`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SearchDate {
    Date(NaiveDate),
    /// Unix timestamp, interpreted in UTC.
    Timestamp(i64),
    /// Already in IMAP date form (`1-Jul-2025`).
    Literal(String),
}

impl SearchDate {
    /// Render as an IMAP date (`d-Mon-yyyy`).
    ///
    /// # Errors
    ///
    /// Returns [`Error::Parse`] for a timestamp outside chrono's range.
    pub fn to_imap_date(&self) -> Result<String> {
        match self {
            Self::Date(date) => Ok(date.format("%-d-%b-%Y").to_string()),
            Self::Timestamp(ts) => DateTime::from_timestamp(*ts, 0)
                .map(|dt| dt.format("%-d-%b-%Y").to_string())
                .ok_or_else(|| Error::Parse(format!("Timestamp out of range: {ts}"))),
            Self::Literal(text) => Ok(text.clone()),
        }
    }
}

impl From<NaiveDate> for SearchDate {
    fn from(date: NaiveDate) -> Self {
        Self::Date(date)
    }
}

impl From<i64> for SearchDate {
    fn from(ts: i64) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<&str> for SearchDate {
    fn from(text: &str) -> Self {
        Self::Literal(text.to_string())
    }
}

/// Quote a search string, escaping `\` and `"`.
#[must_use]
pub fn quote(text: &str) -> String {
    format!("\"{}\"", text.replace('\\', "\\\\").replace('"', "\\\""))
}

/// Join criteria fragments with the explicit criteria; nothing at all
/// means `ALL`.
#[must_use]
pub fn build_query(fragments: &[String], criteria: &str) -> String {
    let criteria = criteria.trim();
    let mut parts: Vec<&str> = fragments.iter().map(String::as_str).collect();
    if !criteria.is_empty() {
        parts.push(criteria);
    }
    if parts.is_empty() {
        "ALL".to_string()
    } else {
        parts.join(" ")
    }
}

/// Pending search criteria bound to one session.
///
/// Created by [`Session::new_search`], [`Session::search_body`],
/// [`Session::search_subject`] or [`Session::search_on_date`].
#[must_use = "criteria are only applied by calling `search`"]
pub struct Search<'s, T: Transport> {
    session: &'s mut Session<T>,
    fragments: Vec<String>,
    /// First criterion that could not be rendered.
    invalid: Option<Error>,
}

impl<'s, T: Transport> Search<'s, T> {
    pub(crate) const fn new(session: &'s mut Session<T>) -> Self {
        Self {
            session,
            fragments: Vec::new(),
            invalid: None,
        }
    }

    pub fn body(mut self, text: &str) -> Self {
        self.fragments.push(format!("BODY {}", quote(text)));
        self
    }

    pub fn subject(mut self, text: &str) -> Self {
        self.fragments.push(format!("SUBJECT {}", quote(text)));
        self
    }

    /// Restrict to messages sent on `date`. An unrepresentable date
    /// makes [`Search::search`] fail.
    pub fn on_date(mut self, date: impl Into<SearchDate>) -> Self {
        match date.into().to_imap_date() {
            Ok(date) => self.fragments.push(format!("ON {}", quote(&date))),
            Err(e) => {
                warn!("Ignoring search date: {}", e);
                self.invalid.get_or_insert(e);
            }
        }
        self
    }

    /// The query this builder would send with `criteria`.
    #[must_use]
    pub fn query(&self, criteria: &str) -> String {
        build_query(&self.fragments, criteria)
    }

    /// Run the accumulated criteria plus `criteria` and return the
    /// matching UIDs ordered by `sort`.
    ///
    /// # Errors
    ///
    /// Returns an error if a criterion was invalid, the session is
    /// closed or the search fails.
    pub async fn search(self, criteria: &str, sort: SortKey, descending: bool) -> Result<Vec<u32>> {
        if let Some(e) = self.invalid {
            return self.session.track(Err(e));
        }
        let query = build_query(&self.fragments, criteria);
        self.session.sorted_uids(&query, sort, descending).await
    }
}
