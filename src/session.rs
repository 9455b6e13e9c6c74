//! Session lifecycle and folder management
//!
//! A [`Session`] exclusively owns one [`Transport`] together with the
//! name of the selected folder. Every operation takes `&mut self`, so
//! calls against one session never overlap.

use crate::cache::Cache;
use crate::config::{ImapConfig, MailboxAddress, TimeoutPhase};
use crate::connection::ImapTransport;
use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::folder::{Folder, FolderRole, build_hierarchy};
use crate::search::{Search, SearchDate, SortKey, build_query};
use crate::transport::{FlagAction, Quota, Selection, Transport};
use crate::uid::UidSet;
use std::time::Duration;
use tracing::{debug, info, warn};

const PHASES: [TimeoutPhase; 4] = [
    TimeoutPhase::Open,
    TimeoutPhase::Read,
    TimeoutPhase::Write,
    TimeoutPhase::Close,
];

/// A connected mailbox.
///
/// Dropping a session without calling [`Session::disconnect`] still
/// releases the transport; the pending error log is discarded first.
pub struct Session<T: Transport> {
    transport: Option<T>,
    config: ImapConfig,
    address: MailboxAddress,
    current_folder: Option<String>,
    pub(crate) cache: Option<Cache>,
    errors: Vec<String>,
}

impl Session<ImapTransport> {
    /// Connect to the configured server and log in.
    ///
    /// # Errors
    ///
    /// Returns the connection, TLS, login or timeout error of the
    /// attempt; its text is the equivalent of a last-error string.
    pub async fn connect(config: ImapConfig) -> Result<Self> {
        match ImapTransport::connect(&config).await {
            Ok(transport) => Ok(Self::with_transport(config, transport)),
            Err(e) => {
                warn!("Connection to {} failed: {}", config.address(), e);
                Err(e)
            }
        }
    }
}

impl<T: Transport> Session<T> {
    /// Wrap an already authenticated transport.
    ///
    /// The configured timeouts are applied to the transport and the
    /// cache is opened when active. No folder is selected yet.
    #[must_use]
    pub fn with_transport(config: ImapConfig, mut transport: T) -> Self {
        for phase in PHASES {
            transport.set_timeout(phase, config.timeouts.get(phase));
        }
        let cache = Cache::from_config(&config.cache);
        Self {
            transport: Some(transport),
            address: config.address(),
            config,
            current_folder: None,
            cache,
            errors: Vec::new(),
        }
    }

    /// Replace the configured cache, e.g. with a custom store.
    #[must_use]
    pub fn with_cache(mut self, cache: Cache) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ImapConfig {
        &self.config
    }

    #[must_use]
    pub const fn address(&self) -> &MailboxAddress {
        &self.address
    }

    #[must_use]
    pub fn current_folder(&self) -> Option<&str> {
        self.current_folder.as_deref()
    }

    #[must_use]
    pub const fn is_connected(&self) -> bool {
        self.transport.is_some()
    }

    #[must_use]
    pub const fn cache_active(&self) -> bool {
        self.cache.is_some()
    }

    /// The most recent transport error, if any.
    #[must_use]
    pub fn last_error(&self) -> Option<&str> {
        self.errors.last().map(String::as_str)
    }

    /// Drain all recorded transport errors, oldest first.
    pub fn errors(&mut self) -> Vec<String> {
        std::mem::take(&mut self.errors)
    }

    pub(crate) fn transport(&mut self) -> Result<&mut T> {
        self.transport.as_mut().ok_or(Error::NotConnected)
    }

    /// Record a failed transport call before handing the result back.
    pub(crate) fn track<R>(&mut self, result: Result<R>) -> Result<R> {
        if let Err(e) = &result {
            self.errors.push(e.to_string());
        }
        result
    }

    /// Close the session.
    ///
    /// With `expunge_on_disconnect`, the trash folder is emptied first.
    /// Calling this on a closed session does nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the server rejects the logout. The session
    /// is closed either way.
    pub async fn disconnect(&mut self) -> Result<()> {
        let Some(mut transport) = self.transport.take() else {
            return Ok(());
        };

        if self.config.expunge_on_disconnect {
            let trash = self.config.folders.name(FolderRole::Trash).to_string();
            let emptied = async {
                transport.select(&trash).await?;
                transport
                    .store_flags(&UidSet::all(), &[Flag::Deleted], FlagAction::Add)
                    .await?;
                transport.expunge().await
            }
            .await;
            if let Err(e) = emptied {
                warn!("Emptying {} before disconnect failed: {}", trash, e);
            }
        }

        self.errors.clear();
        self.current_folder = None;
        let result = transport.logout().await;
        info!("Disconnected from {}", self.address);
        result
    }

    /// Set the transport timeout of one protocol phase.
    pub fn set_timeout(&mut self, phase: TimeoutPhase, timeout: Duration) {
        self.config.timeouts.set(phase, timeout);
        if let Some(transport) = self.transport.as_mut() {
            transport.set_timeout(phase, timeout);
        }
    }

    #[must_use]
    pub fn timeout(&self, phase: TimeoutPhase) -> Duration {
        self.transport
            .as_ref()
            .map_or_else(|| self.config.timeouts.get(phase), |t| t.timeout(phase))
    }

    /// Liveness check.
    pub async fn ping(&mut self) -> bool {
        let Ok(transport) = self.transport() else {
            return false;
        };
        let result = transport.noop().await;
        self.track(result).is_ok()
    }

    // -- folders --

    /// Flat list of every folder path on the server.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or LIST fails.
    pub async fn folder_names(&mut self) -> Result<Vec<String>> {
        let result = self.transport()?.list("*").await;
        let mut names: Vec<String> = self.track(result)?.into_iter().map(|f| f.path).collect();
        names.sort();
        Ok(names)
    }

    /// The folder hierarchy, nested on the server's delimiter.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or LIST fails.
    pub async fn get_folders(&mut self) -> Result<Vec<Folder>> {
        let result = self.transport()?.list("*").await;
        let listed = self.track(result)?;
        let delimiter = listed
            .iter()
            .find_map(|f| f.delimiter.clone())
            .unwrap_or_else(|| ".".to_string());
        let paths: Vec<&str> = listed.iter().map(|f| f.path.as_str()).collect();
        Ok(build_hierarchy(&paths, &delimiter))
    }

    /// Select `folder`. The current folder only changes on success.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or SELECT fails.
    pub async fn select_folder(&mut self, folder: &str) -> Result<Selection> {
        let result = self.transport()?.select(folder).await;
        let selection = self.track(result)?;
        debug!("Selected {} ({} messages)", folder, selection.exists);
        self.current_folder = Some(folder.to_string());
        Ok(selection)
    }

    /// # Errors
    ///
    /// Returns an error if the session is closed or CREATE fails.
    pub async fn add_folder(&mut self, name: &str) -> Result<()> {
        let result = self.transport()?.create(name).await;
        self.track(result)
    }

    /// # Errors
    ///
    /// Returns an error if the session is closed or RENAME fails.
    pub async fn rename_folder(&mut self, name: &str, new_name: &str) -> Result<()> {
        let result = self.transport()?.rename(name, new_name).await;
        self.track(result)?;
        if self.current_folder.as_deref() == Some(name) {
            self.current_folder = Some(new_name.to_string());
        }
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the session is closed or DELETE fails.
    pub async fn remove_folder(&mut self, name: &str) -> Result<()> {
        let result = self.transport()?.delete(name).await;
        self.track(result)?;
        if self.current_folder.as_deref() == Some(name) {
            self.current_folder = None;
        }
        Ok(())
    }

    /// Resolve the server-side folder of a well-known role.
    ///
    /// An existing folder matching the configured name (ignoring case)
    /// wins; otherwise a folder with the configured name is created.
    ///
    /// # Errors
    ///
    /// Returns an error if listing or creating the folder fails.
    pub async fn get_default_folder(&mut self, role: FolderRole) -> Result<String> {
        let wanted = self.config.folders.name(role).to_string();
        let names = self.folder_names().await?;
        if let Some(existing) = names.into_iter().find(|n| n.eq_ignore_ascii_case(&wanted)) {
            return Ok(existing);
        }
        info!("Creating missing {} folder {}", role, wanted);
        self.add_folder(&wanted).await?;
        Ok(wanted)
    }

    /// Run `op` with `folder` selected, then reselect the folder that
    /// was selected before, or leave `folder` again when none was.
    ///
    /// The previous state is restored whether `op` succeeds or not,
    /// and also when `folder` itself cannot be selected.
    ///
    /// # Errors
    ///
    /// Returns the selection error for `folder`, or the error of `op`.
    pub async fn in_folder<R>(
        &mut self,
        folder: &str,
        op: impl AsyncFnOnce(&mut Self) -> Result<R>,
    ) -> Result<R> {
        let previous = self.current_folder.clone();
        if previous.as_deref() == Some(folder) {
            return op(&mut *self).await;
        }

        let result = match self.select_folder(folder).await {
            Ok(_) => op(&mut *self).await,
            Err(e) => Err(e),
        };

        match previous {
            Some(previous) => {
                if let Err(e) = self.select_folder(&previous).await {
                    warn!("Could not reselect {}: {}", previous, e);
                }
            }
            None => self.unselect().await,
        }
        result
    }

    /// Return to the authenticated state with no folder selected.
    async fn unselect(&mut self) {
        self.current_folder = None;
        let result = match self.transport() {
            Ok(transport) => transport.unselect().await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            warn!("Could not leave the temporary folder: {}", e);
        }
    }

    /// Storage quota governing the current folder (INBOX when none is
    /// selected), `Ok(None)` when the server reports none.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the server rejects
    /// the quota lookup.
    pub async fn get_quota(&mut self) -> Result<Option<Quota>> {
        let folder = self
            .current_folder
            .clone()
            .unwrap_or_else(|| "INBOX".to_string());
        let result = self.transport()?.quota(&folder).await;
        self.track(result)
    }

    // -- search --

    /// Start a search with no criteria yet.
    pub fn new_search(&mut self) -> Search<'_, T> {
        Search::new(self)
    }

    /// Start a search with a body-text criterion.
    pub fn search_body(&mut self, text: &str) -> Search<'_, T> {
        Search::new(self).body(text)
    }

    /// Start a search with a subject criterion.
    pub fn search_subject(&mut self, text: &str) -> Search<'_, T> {
        Search::new(self).subject(text)
    }

    /// Start a search for messages sent on one day.
    pub fn search_on_date(&mut self, date: impl Into<SearchDate>) -> Search<'_, T> {
        Search::new(self).on_date(date)
    }

    /// UIDs in the current folder matching `criteria` (empty means
    /// `ALL`), ordered by `sort`.
    ///
    /// # Errors
    ///
    /// Returns an error if the session is closed or the search fails.
    pub async fn search(&mut self, criteria: &str, sort: SortKey, descending: bool) -> Result<Vec<u32>> {
        let query = build_query(&[], criteria);
        self.sorted_uids(&query, sort, descending).await
    }

    pub(crate) async fn sorted_uids(&mut self, query: &str, sort: SortKey, descending: bool) -> Result<Vec<u32>> {
        debug!("Searching {} sorted by {}", query, sort);
        let result = self.transport()?.sort(sort, descending, query).await;
        self.track(result)
    }

    /// Unsorted UIDs matching `criteria`.
    pub(crate) async fn search_uids(&mut self, criteria: &str) -> Result<Vec<u32>> {
        let result = self.transport()?.search(criteria).await;
        self.track(result)
    }

    // -- cache --

    /// Cache key folder component: the selected folder, or empty.
    pub(crate) fn cache_folder(&self) -> String {
        self.current_folder.clone().unwrap_or_default()
    }

    /// Drop cached records of `uids` in the current folder. Sets that
    /// cannot be expanded (`1:*`, huge ranges) drop the whole folder.
    pub(crate) fn evict_messages(&mut self, uids: &UidSet) {
        let folder = self.cache_folder();
        let Some(cache) = self.cache.as_mut() else {
            return;
        };
        match uids.uids() {
            Ok(uids) => {
                for uid in uids {
                    cache.evict_message(&folder, uid);
                }
            }
            Err(e) => {
                debug!("Evicting every cached record of {}: {}", folder, e);
                cache.evict_folder(&folder);
            }
        }
    }
}

impl<T: Transport> Drop for Session<T> {
    fn drop(&mut self) {
        self.errors.clear();
        if self.transport.take().is_some() {
            debug!("Session to {} dropped without disconnect", self.address);
        }
    }
}

impl<T: Transport> std::fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("address", &self.address)
            .field("current_folder", &self.current_folder)
            .field("connected", &self.transport.is_some())
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}
