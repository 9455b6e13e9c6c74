#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

//! CLI for browsing an IMAP mailbox

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use imap_mailbox::{Flag, ImapConfig, ImapTransport, Message, Session, SortKey};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mailbox-cli")]
#[command(about = "Browse and organise an IMAP mailbox")]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Output as JSON
    #[arg(long, global = true)]
    json: bool,
}

#[derive(Subcommand)]
enum Command {
    /// List available IMAP folders
    Folders,

    /// Show storage quota usage
    Quota,

    /// Count messages in a folder
    Count {
        #[arg(long, default_value = "INBOX")]
        folder: String,
    },

    /// List messages, one page at a time
    List {
        /// Folder to list from
        #[arg(long, default_value = "INBOX")]
        folder: String,

        /// Page number, starting at 1
        #[arg(long, default_value = "1")]
        page: usize,

        /// Messages per page
        #[arg(long, default_value = "20")]
        per_page: usize,

        /// Sort key (date, arrival, from, subject, to, cc, size)
        #[arg(long, default_value = "date")]
        sort: SortKey,

        /// Oldest first
        #[arg(long)]
        ascending: bool,
    },

    /// Show a single message by UID
    Show {
        uid: u32,

        #[arg(long, default_value = "INBOX")]
        folder: String,
    },

    /// Search messages
    Search {
        /// Extra IMAP search criteria (e.g. "UNSEEN")
        #[arg(default_value = "")]
        criteria: String,

        /// Subject contains
        #[arg(long)]
        subject: Option<String>,

        /// Body contains
        #[arg(long)]
        body: Option<String>,

        /// Sent on this day (YYYY-MM-DD)
        #[arg(long, value_parser = parse_date)]
        on: Option<NaiveDate>,

        #[arg(long, default_value = "INBOX")]
        folder: String,

        /// Maximum number of results
        #[arg(long, default_value = "50")]
        limit: usize,
    },

    /// Print the raw source of a message
    Eml {
        uid: u32,

        #[arg(long, default_value = "INBOX")]
        folder: String,
    },

    /// Move a message to another folder
    Move {
        uid: u32,

        /// Target folder
        target: String,

        /// Source folder
        #[arg(long, default_value = "INBOX")]
        folder: String,
    },

    /// Set or clear a flag (seen, answered, flagged, deleted, draft)
    Flag {
        uid: u32,

        flag: String,

        /// Clear the flag instead of setting it
        #[arg(long)]
        clear: bool,

        #[arg(long, default_value = "INBOX")]
        folder: String,
    },
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").map_err(|e| format!("Invalid date '{s}': {e}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let config = ImapConfig::from_env()?;
    let mut session = Session::connect(config).await?;

    let result = run(&mut session, &args).await;
    if let Err(e) = session.disconnect().await {
        tracing::warn!("Logout failed: {}", e);
    }
    result
}

async fn run(session: &mut Session<ImapTransport>, args: &Args) -> anyhow::Result<()> {
    match &args.command {
        Command::Folders => cmd_folders(session, args).await,
        Command::Quota => cmd_quota(session, args).await,
        Command::Count { folder } => cmd_count(session, args, folder).await,
        Command::List {
            folder,
            page,
            per_page,
            sort,
            ascending,
        } => {
            session.select_folder(folder).await?;
            let uids = session.search("", *sort, !ascending).await?;
            let messages = session.paginate(&uids, *page, *per_page).await?;
            print_messages(args, &messages)
        }
        Command::Show { uid, folder } => {
            session.select_folder(folder).await?;
            let message = session
                .get_message(*uid)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No message with UID {uid} in {folder}"))?;
            if args.json {
                println!("{}", serde_json::to_string_pretty(&message)?);
            } else {
                print_message_detail(&message);
            }
            Ok(())
        }
        Command::Search {
            criteria,
            subject,
            body,
            on,
            folder,
            limit,
        } => {
            session.select_folder(folder).await?;
            let mut search = session.new_search();
            if let Some(subject) = subject {
                search = search.subject(subject);
            }
            if let Some(body) = body {
                search = search.body(body);
            }
            if let Some(on) = on {
                search = search.on_date(*on);
            }
            let uids = search.search(criteria, SortKey::Date, true).await?;
            let messages = session.paginate(&uids, 1, *limit).await?;
            print_messages(args, &messages)
        }
        Command::Eml { uid, folder } => {
            session.select_folder(folder).await?;
            let eml = session
                .get_eml(*uid)
                .await?
                .ok_or_else(|| anyhow::anyhow!("No message with UID {uid} in {folder}"))?;
            print!("{}", String::from_utf8_lossy(&eml));
            Ok(())
        }
        Command::Move { uid, target, folder } => {
            session.select_folder(folder).await?;
            session.move_messages(*uid, target).await?;
            println!("Moved {uid} from {folder} to {target}");
            Ok(())
        }
        Command::Flag {
            uid,
            flag,
            clear,
            folder,
        } => {
            session.select_folder(folder).await?;
            let flag = Flag::parse(flag);
            if *clear {
                session.message_clearflag(*uid, flag.clone()).await?;
                println!("Cleared {flag} on {uid}");
            } else {
                session.message_setflag(*uid, flag.clone()).await?;
                println!("Set {flag} on {uid}");
            }
            Ok(())
        }
    }
}

async fn cmd_folders(session: &mut Session<ImapTransport>, args: &Args) -> anyhow::Result<()> {
    if args.json {
        let folders = session.get_folders().await?;
        println!("{}", serde_json::to_string_pretty(&folders)?);
    } else {
        for folder in session.folder_names().await? {
            println!("{folder}");
        }
    }
    Ok(())
}

async fn cmd_quota(session: &mut Session<ImapTransport>, args: &Args) -> anyhow::Result<()> {
    let quota = session.get_quota().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&quota)?);
    } else if let Some(quota) = quota {
        println!(
            "Storage: {} KiB of {} KiB ({}%)",
            quota.usage,
            quota.limit,
            quota.percent_used()
        );
    } else {
        println!("No storage quota reported.");
    }
    Ok(())
}

async fn cmd_count(session: &mut Session<ImapTransport>, args: &Args, folder: &str) -> anyhow::Result<()> {
    session.select_folder(folder).await?;
    let stats = session.get_mailbox_statistics().await?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
    } else {
        println!(
            "{}: {} message(s), {} unread, {} bytes",
            stats.folder, stats.messages, stats.unread, stats.size
        );
    }
    Ok(())
}

fn print_messages(args: &Args, messages: &[Message]) -> anyhow::Result<()> {
    if args.json {
        println!("{}", serde_json::to_string_pretty(messages)?);
    } else {
        print_message_table(messages);
    }
    Ok(())
}

fn print_message_table(messages: &[Message]) {
    if messages.is_empty() {
        println!("No messages found.");
        return;
    }

    let header = format!("{:<8} {:<26} {:<30} {}", "UID", "Date", "From", "Subject");
    println!("{header}");
    println!("{}", "-".repeat(100));

    for message in messages {
        println!(
            "{:<8} {:<26} {:<30} {}",
            message.uid,
            truncate(&message.date, 25),
            truncate(&display_address(&message.from), 28),
            truncate(&message.subject, 40),
        );
    }

    println!("\n{} message(s)", messages.len());
}

fn display_address(address: &imap_mailbox::Address) -> String {
    if address.name.is_empty() {
        address.email.clone()
    } else {
        format!("{} <{}>", address.name, address.email)
    }
}

fn join_addresses(addresses: &[imap_mailbox::Address]) -> String {
    addresses
        .iter()
        .map(display_address)
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_message_detail(message: &Message) {
    println!("UID:     {}", message.uid);
    println!("Date:    {}", message.date);
    println!("From:    {}", display_address(&message.from));
    println!("To:      {}", join_addresses(&message.to));
    if !message.cc.is_empty() {
        println!("CC:      {}", join_addresses(&message.cc));
    }
    println!("Subject: {}", message.subject);
    println!("Msg-ID:  {}", message.message_id);
    if !message.in_reply_to.is_empty() {
        println!("Reply-To-ID: {}", message.in_reply_to);
    }

    println!("\n--- Body ---\n");
    if message.body.plain.is_empty() {
        println!("{}", message.body.html);
    } else {
        println!("{}", message.body.plain);
    }

    if !message.attachments.is_empty() {
        println!("\n--- Attachments ---");
        for a in &message.attachments {
            println!("  {} ({} bytes)", a.name, a.content_size);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let truncated: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{truncated}...")
    }
}
