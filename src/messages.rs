//! Reading and normalising messages
//!
//! The expensive reads (message records, attachments and the address
//! book) go through the session cache when it is active.

use crate::encoding::{decode_transfer, to_utf8};
use crate::error::{Error, Result};
use crate::message::{Address, Attachment, Body, Message};
use crate::mime::{BodyNode, attachment_parts, find_text_part};
use crate::session::Session;
use crate::transport::{HeaderInfo, Transport};
use crate::uid::UidSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Summary of the selected folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MailboxStatistics {
    pub folder: String,
    pub messages: usize,
    pub unread: usize,
    pub size: u64,
}

/// Every address seen in from/to/cc across all folders.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AddressBook {
    /// Email address to display name (empty when never given).
    pub contacts: BTreeMap<String, String>,
    /// Folders that could not be read and were left out.
    pub skipped_folders: Vec<String>,
}

impl AddressBook {
    /// Add an address; a non-empty name replaces an empty one.
    pub fn insert(&mut self, address: Address) {
        if address.email.is_empty() {
            return;
        }
        let name = self.contacts.entry(address.email).or_default();
        if name.is_empty() {
            *name = address.name;
        }
    }
}

/// A file name safe to join onto a directory.
fn file_name(name: &str, index: usize) -> String {
    let base = name.rsplit(['/', '\\']).next().unwrap_or_default().trim();
    if base.is_empty() || base == "." || base == ".." {
        format!("attachment-{index}")
    } else {
        base.to_string()
    }
}

impl<T: Transport> Session<T> {
    async fn sequence_number(&mut self, uid: u32) -> Result<Option<u32>> {
        let result = self.transport()?.sequence_number(uid).await;
        self.track(result)
    }

    async fn fetch_header(&mut self, uid: u32) -> Result<HeaderInfo> {
        let result = self.transport()?.fetch_header(uid).await;
        self.track(result)
    }

    async fn fetch_structure(&mut self, uid: u32) -> Result<BodyNode> {
        let result = self.transport()?.fetch_structure(uid).await;
        self.track(result)
    }

    async fn fetch_body(&mut self, uid: u32, part: &str) -> Result<Vec<u8>> {
        let result = self.transport()?.fetch_body(uid, part).await;
        self.track(result)
    }

    /// Decoded text of the first `text/{subtype}` body part, or empty.
    async fn text_body(&mut self, uid: u32, structure: &BodyNode, subtype: &str) -> Result<String> {
        let Some((part, leaf)) = find_text_part(structure, subtype) else {
            return Ok(String::new());
        };
        let raw = self.fetch_body(uid, &part).await?;
        let decoded = decode_transfer(&raw, &leaf.encoding);
        Ok(to_utf8(&decoded, leaf.charset()))
    }

    fn cached<V: serde::de::DeserializeOwned>(&mut self, key: Option<&String>) -> Option<V> {
        let key = key?;
        self.cache.as_mut()?.get(key)
    }

    fn store<V: Serialize>(&mut self, key: Option<&String>, value: &V) {
        if let (Some(cache), Some(key)) = (self.cache.as_mut(), key) {
            cache.put(key, value);
        }
    }

    /// The normalised record of one message in the current folder.
    ///
    /// Returns `Ok(None)` when `uid` does not exist in the folder.
    /// Cached records get the current sequence number, and are dropped
    /// once the message is gone from the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or a fetch fails.
    pub async fn get_message(&mut self, uid: u32) -> Result<Option<Message>> {
        let folder = self.cache_folder();
        let key = self.cache.as_ref().map(|c| c.message_key(&folder, uid));
        let cached = self.cached::<Message>(key.as_ref());

        let Some(seq) = self.sequence_number(uid).await? else {
            debug!("UID {} not found in {}", uid, folder);
            if cached.is_some() {
                self.evict_messages(&UidSet::from(uid));
            }
            return Ok(None);
        };
        if let Some(mut message) = cached {
            message.id = seq;
            return Ok(Some(message));
        }

        let header = self.fetch_header(uid).await?;
        let structure = self.fetch_structure(uid).await?;

        let mut attachments = Vec::new();
        for part in attachment_parts(&structure, None) {
            let raw = self.fetch_body(uid, &part.part).await?;
            attachments.push(Attachment::decode(part, &raw));
        }
        let body = Body {
            html: self.text_body(uid, &structure, "html").await?,
            plain: self.text_body(uid, &structure, "plain").await?,
        };

        let message = Message::build(&header, attachments, body);
        self.store(key.as_ref(), &message);
        Ok(Some(message))
    }

    /// Records for several UIDs, in input order.
    ///
    /// UIDs that do not exist in the current folder are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyUidSet`] for empty input, or the first
    /// fetch error.
    pub async fn get_messages(&mut self, uids: impl Into<UidSet>) -> Result<Vec<Message>> {
        let uids = uids.into().uids()?;
        let mut messages = Vec::with_capacity(uids.len());
        for uid in uids {
            match self.get_message(uid).await? {
                Some(message) => messages.push(message),
                None => debug!("Skipping missing UID {}", uid),
            }
        }
        Ok(messages)
    }

    /// One page of records. `page` is 1-based; a page past the end is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns the first fetch error.
    pub async fn paginate(&mut self, uids: &[u32], page: usize, per_page: usize) -> Result<Vec<Message>> {
        let start = page.saturating_sub(1).saturating_mul(per_page);
        if page == 0 || per_page == 0 || start >= uids.len() {
            return Ok(Vec::new());
        }
        let end = uids.len().min(start + per_page);
        self.get_messages(&uids[start..end]).await
    }

    /// The unmodified source of a message: header block followed by
    /// the body. `Ok(None)` when `uid` does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the fetch fails.
    pub async fn get_eml(&mut self, uid: u32) -> Result<Option<Vec<u8>>> {
        if self.sequence_number(uid).await?.is_none() {
            return Ok(None);
        }
        let result = self.transport()?.fetch_raw(uid).await;
        let raw = self.track(result)?;
        let mut eml = raw.header;
        eml.extend_from_slice(&raw.text);
        Ok(Some(eml))
    }

    /// One attachment (0-based, in part order) with decoded content.
    ///
    /// `Ok(None)` when the message or the index does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or a fetch fails.
    pub async fn get_attachment(&mut self, uid: u32, index: usize) -> Result<Option<Attachment>> {
        let folder = self.cache_folder();
        let key = self
            .cache
            .as_ref()
            .map(|c| c.attachment_key(&folder, uid, index));
        if let Some(attachment) = self.cached::<Attachment>(key.as_ref()) {
            return Ok(Some(attachment));
        }

        if self.sequence_number(uid).await?.is_none() {
            return Ok(None);
        }
        let structure = self.fetch_structure(uid).await?;
        let Some(part) = attachment_parts(&structure, Some(index)).into_iter().next() else {
            return Ok(None);
        };
        let raw = self.fetch_body(uid, &part.part).await?;
        let attachment = Attachment::decode(part, &raw);
        self.store(key.as_ref(), &attachment);
        Ok(Some(attachment))
    }

    /// Write one attachment into `dir` under its decoded file name and
    /// return the path written. `Ok(None)` when the message or the
    /// index does not exist.
    ///
    /// Directory components in the name are dropped; a name with
    /// nothing left becomes `attachment-{index}`.
    ///
    /// # Errors
    ///
    /// Returns an error if a fetch fails or the file cannot be written.
    pub async fn save_attachment(
        &mut self,
        uid: u32,
        index: usize,
        dir: impl AsRef<Path>,
    ) -> Result<Option<PathBuf>> {
        let Some(attachment) = self.get_attachment(uid, index).await? else {
            return Ok(None);
        };
        let path = dir.as_ref().join(file_name(&attachment.name, index));
        tokio::fs::write(&path, &attachment.content).await?;
        info!("Saved attachment {} of UID {} to {}", index, uid, path.display());
        Ok(Some(path))
    }

    /// Number of messages in the current folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the search fails.
    pub async fn count_messages(&mut self) -> Result<usize> {
        Ok(self.search_uids("ALL").await?.len())
    }

    /// Number of unseen messages, in `folder` when given, otherwise in
    /// the current folder.
    ///
    /// # Errors
    ///
    /// Returns an error if `folder` cannot be selected or the search
    /// fails.
    pub async fn count_unread_messages(&mut self, folder: Option<&str>) -> Result<usize> {
        match folder {
            Some(folder) => {
                self.in_folder(folder, async |s: &mut Self| {
                    Ok(s.search_uids("UNSEEN").await?.len())
                })
                .await
            }
            None => Ok(self.search_uids("UNSEEN").await?.len()),
        }
    }

    /// Total size in bytes of the messages in the current folder.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or a fetch fails.
    pub async fn get_mailbox_size(&mut self) -> Result<u64> {
        let uids = self.search_uids("ALL").await?;
        if uids.is_empty() {
            return Ok(0);
        }
        let result = self.transport()?.fetch_sizes(&UidSet::from(uids)).await;
        let sizes = self.track(result)?;
        Ok(sizes.into_iter().map(u64::from).sum())
    }

    /// # Errors
    ///
    /// Returns [`Error::Imap`] when no folder is selected, or the first
    /// transport error.
    pub async fn get_mailbox_statistics(&mut self) -> Result<MailboxStatistics> {
        let folder = self
            .current_folder()
            .ok_or_else(|| Error::Imap("No folder selected".into()))?
            .to_string();
        Ok(MailboxStatistics {
            messages: self.count_messages().await?,
            unread: self.count_unread_messages(None).await?,
            size: self.get_mailbox_size().await?,
            folder,
        })
    }

    async fn folder_addresses(&mut self) -> Result<Vec<Address>> {
        let mut found = Vec::new();
        for uid in self.search_uids("ALL").await? {
            let header = self.fetch_header(uid).await?;
            found.extend(
                header
                    .from
                    .iter()
                    .chain(&header.to)
                    .chain(&header.cc)
                    .map(Address::from_raw),
            );
        }
        Ok(found)
    }

    /// Collect every from/to/cc address of every folder.
    ///
    /// A folder that cannot be read is skipped and listed in
    /// [`AddressBook::skipped_folders`]. Only complete books are cached.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or LIST fails.
    pub async fn get_all_email_addresses(&mut self) -> Result<AddressBook> {
        let key = self.cache.as_ref().map(crate::cache::Cache::addresses_key);
        if let Some(book) = self.cached::<AddressBook>(key.as_ref()) {
            return Ok(book);
        }

        let mut book = AddressBook::default();
        for folder in self.folder_names().await? {
            let result = self
                .in_folder(&folder, async |s: &mut Self| s.folder_addresses().await)
                .await;
            match result {
                Ok(addresses) => addresses.into_iter().for_each(|a| book.insert(a)),
                Err(e) => {
                    warn!("Skipping folder {} in address book: {}", folder, e);
                    book.skipped_folders.push(folder);
                }
            }
        }
        info!(
            "Collected {} addresses ({} folders skipped)",
            book.contacts.len(),
            book.skipped_folders.len()
        );

        if book.skipped_folders.is_empty() {
            self.store(key.as_ref(), &book);
        }
        Ok(book)
    }
}
