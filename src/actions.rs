//! Flag changes, moves and deletion

use crate::error::{Error, Result};
use crate::flag::Flag;
use crate::folder::FolderRole;
use crate::session::Session;
use crate::transport::{FlagAction, Transport};
use crate::uid::UidSet;
use tracing::{debug, info};

impl<T: Transport> Session<T> {
    async fn store_flag(&mut self, uids: UidSet, flag: Flag, action: FlagAction) -> Result<()> {
        if uids.is_empty() {
            return Err(Error::EmptyUidSet);
        }
        debug!("{:?} {} on {}", action, flag, uids);
        let result = self.transport()?.store_flags(&uids, &[flag], action).await;
        self.track(result)?;
        self.evict_messages(&uids);
        Ok(())
    }

    /// Add `flag` to every message in `uids`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyUidSet`] for empty input, or the STORE
    /// error.
    pub async fn message_setflag(&mut self, uids: impl Into<UidSet>, flag: Flag) -> Result<()> {
        self.store_flag(uids.into(), flag, FlagAction::Add).await
    }

    /// Remove `flag` from every message in `uids`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyUidSet`] for empty input, or the STORE
    /// error.
    pub async fn message_clearflag(&mut self, uids: impl Into<UidSet>, flag: Flag) -> Result<()> {
        self.store_flag(uids.into(), flag, FlagAction::Remove).await
    }

    /// # Errors
    ///
    /// See [`Session::message_setflag`].
    pub async fn mark_as_read(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_setflag(uids, Flag::Seen).await
    }

    /// # Errors
    ///
    /// See [`Session::message_clearflag`].
    pub async fn mark_as_unread(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_clearflag(uids, Flag::Seen).await
    }

    /// # Errors
    ///
    /// See [`Session::message_setflag`].
    pub async fn mark_as_answered(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_setflag(uids, Flag::Answered).await
    }

    /// # Errors
    ///
    /// See [`Session::message_clearflag`].
    pub async fn mark_as_unanswered(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_clearflag(uids, Flag::Answered).await
    }

    /// # Errors
    ///
    /// See [`Session::message_setflag`].
    pub async fn mark_as_flagged(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_setflag(uids, Flag::Flagged).await
    }

    /// # Errors
    ///
    /// See [`Session::message_clearflag`].
    pub async fn mark_as_unflagged(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_clearflag(uids, Flag::Flagged).await
    }

    /// Set `\Deleted` without expunging.
    ///
    /// # Errors
    ///
    /// See [`Session::message_setflag`].
    pub async fn mark_as_deleted(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_setflag(uids, Flag::Deleted).await
    }

    /// # Errors
    ///
    /// See [`Session::message_clearflag`].
    pub async fn mark_as_undeleted(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_clearflag(uids, Flag::Deleted).await
    }

    /// # Errors
    ///
    /// See [`Session::message_setflag`].
    pub async fn mark_as_draft(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_setflag(uids, Flag::Draft).await
    }

    /// # Errors
    ///
    /// See [`Session::message_clearflag`].
    pub async fn mark_as_undraft(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.message_clearflag(uids, Flag::Draft).await
    }

    /// Move `uids` from the current folder to `target`, then expunge.
    ///
    /// Nothing is expunged when the move fails.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptyUidSet`] for empty input, or the move or
    /// expunge error.
    pub async fn move_messages(&mut self, uids: impl Into<UidSet>, target: &str) -> Result<()> {
        let uids = uids.into();
        if uids.is_empty() {
            return Err(Error::EmptyUidSet);
        }
        let result = self.transport()?.move_messages(&uids, target).await;
        self.track(result)?;
        self.evict_messages(&uids);

        let result = self.transport()?.expunge().await;
        self.track(result)?;
        info!("Moved {} to {}", uids, target);
        Ok(())
    }

    async fn move_to_role(&mut self, uids: UidSet, role: FolderRole) -> Result<()> {
        let target = self.get_default_folder(role).await?;
        self.move_messages(uids, &target).await
    }

    /// # Errors
    ///
    /// See [`Session::move_messages`].
    pub async fn move_to_inbox(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.move_to_role(uids.into(), FolderRole::Inbox).await
    }

    /// # Errors
    ///
    /// See [`Session::move_messages`].
    pub async fn move_to_trash(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.move_to_role(uids.into(), FolderRole::Trash).await
    }

    /// # Errors
    ///
    /// See [`Session::move_messages`].
    pub async fn move_to_draft(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.move_to_role(uids.into(), FolderRole::Drafts).await
    }

    /// # Errors
    ///
    /// See [`Session::move_messages`].
    pub async fn move_to_spam(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.move_to_role(uids.into(), FolderRole::Spam).await
    }

    /// # Errors
    ///
    /// See [`Session::move_messages`].
    pub async fn move_to_sent(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.move_to_role(uids.into(), FolderRole::Sent).await
    }

    /// Delete messages by moving them to the trash folder.
    ///
    /// # Errors
    ///
    /// See [`Session::move_messages`].
    pub async fn delete_messages(&mut self, uids: impl Into<UidSet>) -> Result<()> {
        self.move_to_trash(uids).await
    }

    /// Empty the current folder.
    ///
    /// In the trash or spam folder messages are removed for good;
    /// anywhere else they are moved to the trash.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Imap`] when no folder is selected, or the first
    /// transport error.
    pub async fn purge(&mut self) -> Result<()> {
        let current = self
            .current_folder()
            .ok_or_else(|| Error::Imap("No folder selected".into()))?
            .to_string();
        let uids = self.search_uids("ALL").await?;
        if uids.is_empty() {
            debug!("Nothing to purge in {}", current);
            return Ok(());
        }
        let uids = UidSet::from(uids);

        let names = &self.config().folders;
        let deletes_for_good = [FolderRole::Trash, FolderRole::Spam]
            .into_iter()
            .any(|role| current.eq_ignore_ascii_case(names.name(role)));
        if deletes_for_good {
            self.store_flag(uids, Flag::Deleted, FlagAction::Add).await?;
            let result = self.transport()?.expunge().await;
            self.track(result)?;
            info!("Purged {}", current);
            Ok(())
        } else {
            let trash = self.get_default_folder(FolderRole::Trash).await?;
            self.move_messages(uids, &trash).await
        }
    }

    /// Store a sent message in the sent folder, marked as read.
    ///
    /// # Errors
    ///
    /// Returns an error if resolving the sent folder or APPEND fails.
    pub async fn save_message_in_sent(&mut self, content: &[u8]) -> Result<()> {
        let sent = self.get_default_folder(FolderRole::Sent).await?;
        let result = self.transport()?.append(&sent, &[Flag::Seen], content).await;
        self.track(result)?;
        info!("Saved {} bytes to {}", content.len(), sent);
        Ok(())
    }
}
