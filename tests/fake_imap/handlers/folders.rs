//! Folder commands: LIST, SELECT/EXAMINE, UNSELECT/CLOSE, CREATE,
//! DELETE, RENAME and GETQUOTAROOT.
//!
//! LIST answers one line per folder (RFC 3501 Section 7.2.2):
//!
//! ```text
//! * LIST (\HasNoChildren) "/" "INBOX"
//! A0002 OK LIST completed
//! ```
//!
//! SELECT reports the folder size with `* N EXISTS` and returns the
//! selected folder name so the session loop can track it.
//!
//! GETQUOTAROOT reports a single root whose STORAGE usage is the size
//! of every message in KiB, against a limit of [`QUOTA_LIMIT_KIB`].

use crate::fake_imap::io::{complete, write_line};
use crate::fake_imap::mailbox::{Folder, Mailbox};
use std::sync::Mutex;
use tokio::io::{AsyncRead, AsyncWrite, BufReader};

pub async fn handle_list<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) {
    for folder in &mailbox.folders {
        let line = format!("* LIST (\\HasNoChildren) \"/\" \"{}\"\r\n", folder.name);
        if write_line(stream, &line).await.is_err() {
            return;
        }
    }
    complete(stream, tag, "OK", "LIST completed").await;
}

/// Returns the selected folder name, or `None` if it does not exist.
pub async fn handle_select<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) -> Option<String> {
    let Some(folder) = mailbox.get_folder(folder_name) else {
        complete(stream, tag, "NO", "Folder not found").await;
        return None;
    };

    let lines = [
        "* FLAGS (\\Seen \\Answered \\Flagged \\Deleted \\Draft)\r\n".to_string(),
        format!("* {} EXISTS\r\n", folder.messages.len()),
        "* 0 RECENT\r\n".to_string(),
        "* OK [UIDVALIDITY 1]\r\n".to_string(),
        format!("* OK [UIDNEXT {}]\r\n", folder.max_uid() + 1),
    ];
    for line in lines {
        if write_line(stream, &line).await.is_err() {
            return None;
        }
    }
    complete(stream, tag, "OK", "[READ-WRITE] SELECT completed").await;
    Some(folder.name.clone())
}

/// UNSELECT or CLOSE. Nothing is expunged: the client only closes
/// after EXAMINE.
pub async fn handle_unselect<S: AsyncRead + AsyncWrite + Unpin>(tag: &str, stream: &mut BufReader<S>) {
    complete(stream, tag, "OK", "Returned to authenticated state").await;
}

pub const QUOTA_LIMIT_KIB: u64 = 1024 * 1024;

pub async fn handle_get_quota_root<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    folder_name: &str,
    mailbox: &Mailbox,
    stream: &mut BufReader<S>,
) {
    let bytes: u64 = mailbox
        .folders
        .iter()
        .flat_map(|f| &f.messages)
        .map(|m| m.raw.len() as u64)
        .sum();
    let lines = [
        format!("* QUOTAROOT \"{folder_name}\" \"\"\r\n"),
        format!("* QUOTA \"\" (STORAGE {} {QUOTA_LIMIT_KIB})\r\n", bytes.div_ceil(1024)),
    ];
    for line in lines {
        if write_line(stream, &line).await.is_err() {
            return;
        }
    }
    complete(stream, tag, "OK", "GETQUOTAROOT completed").await;
}

pub async fn handle_create<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    name: &str,
    mailbox: &Mutex<Mailbox>,
    stream: &mut BufReader<S>,
) {
    let created = {
        let mut mb = mailbox.lock().unwrap();
        if mb.get_folder(name).is_some() {
            false
        } else {
            mb.folders.push(Folder {
                name: name.to_string(),
                messages: Vec::new(),
            });
            true
        }
    };
    if created {
        complete(stream, tag, "OK", "CREATE completed").await;
    } else {
        complete(stream, tag, "NO", "Folder already exists").await;
    }
}

pub async fn handle_delete<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    name: &str,
    mailbox: &Mutex<Mailbox>,
    stream: &mut BufReader<S>,
) {
    let removed = {
        let mut mb = mailbox.lock().unwrap();
        let before = mb.folders.len();
        mb.folders.retain(|f| f.name != name);
        mb.folders.len() < before
    };
    if removed {
        complete(stream, tag, "OK", "DELETE completed").await;
    } else {
        complete(stream, tag, "NO", "Folder not found").await;
    }
}

pub async fn handle_rename<S: AsyncRead + AsyncWrite + Unpin>(
    tag: &str,
    from: &str,
    to: &str,
    mailbox: &Mutex<Mailbox>,
    stream: &mut BufReader<S>,
) {
    let renamed = {
        let mut mb = mailbox.lock().unwrap();
        if mb.get_folder(to).is_some() {
            false
        } else if let Some(folder) = mb.get_folder_mut(from) {
            folder.name = to.to_string();
            true
        } else {
            false
        }
    };
    if renamed {
        complete(stream, tag, "OK", "RENAME completed").await;
    } else {
        complete(stream, tag, "NO", "Cannot rename").await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fake_imap::io::capture;
    use crate::fake_imap::mailbox::{MailboxBuilder, make_raw_message};

    fn raw() -> Vec<u8> {
        make_raw_message("a@b.com", "c@d.com", "Test", "Body", "Mon, 01 Jan 2024 10:00:00 +0000")
    }

    #[tokio::test]
    async fn quota_root_counts_every_folder() {
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .message(1, false, &vec![b'x'; 1500])
            .folder("Sent")
            .message(1, true, &vec![b'y'; 600])
            .build();
        let output = capture(async |s| handle_get_quota_root("Q1", "INBOX", &mailbox, s).await).await;

        assert!(output.starts_with("* QUOTAROOT \"INBOX\" \"\"\r\n"));
        assert!(output.contains(&format!("(STORAGE 3 {QUOTA_LIMIT_KIB})")));
        assert!(output.ends_with("Q1 OK GETQUOTAROOT completed\r\n"));
    }

    #[tokio::test]
    async fn lists_all_folders() {
        let mailbox = MailboxBuilder::new().folder("INBOX").folder("Sent").build();
        let output = capture(async |s| handle_list("A1", &mailbox, s).await).await;

        assert!(output.contains("* LIST (\\HasNoChildren) \"/\" \"INBOX\""));
        assert!(output.contains("\"Sent\""));
        assert!(output.ends_with("A1 OK LIST completed\r\n"));
    }

    #[tokio::test]
    async fn selects_existing_folder() {
        let raw = raw();
        let mailbox = MailboxBuilder::new()
            .folder("INBOX")
            .message(5, true, &raw)
            .message(10, false, &raw)
            .build();

        let mut selected = None;
        let output = capture(async |s| selected = handle_select("A1", "INBOX", &mailbox, s).await).await;

        assert_eq!(selected.as_deref(), Some("INBOX"));
        assert!(output.contains("* 2 EXISTS"));
        assert!(output.contains("* OK [UIDNEXT 11]"));
        assert!(output.contains("A1 OK [READ-WRITE] SELECT completed"));
    }

    #[tokio::test]
    async fn select_of_missing_folder_is_rejected() {
        let mailbox = MailboxBuilder::new().folder("INBOX").build();

        let mut selected = Some(String::new());
        let output = capture(async |s| selected = handle_select("A1", "Nope", &mailbox, s).await).await;

        assert!(selected.is_none());
        assert!(output.contains("A1 NO Folder not found"));
    }

    #[tokio::test]
    async fn create_rename_delete_update_the_mailbox() {
        let mailbox = Mutex::new(MailboxBuilder::new().folder("INBOX").build());

        let output = capture(async |s| handle_create("A1", "Work", &mailbox, s).await).await;
        assert!(output.contains("A1 OK"));
        let output = capture(async |s| handle_create("A2", "Work", &mailbox, s).await).await;
        assert!(output.contains("A2 NO"));

        capture(async |s| handle_rename("A3", "Work", "Jobs", &mailbox, s).await).await;
        assert!(mailbox.lock().unwrap().get_folder("Jobs").is_some());

        capture(async |s| handle_delete("A4", "Jobs", &mailbox, s).await).await;
        assert_eq!(mailbox.lock().unwrap().folders.len(), 1);
    }
}
