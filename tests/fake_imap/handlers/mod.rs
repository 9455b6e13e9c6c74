//! IMAP command handlers for the fake server, grouped by concern.

mod folders;
mod session;
mod uid_fetch;

pub use changes::{StoreArgs, handle_expunge, handle_uid_copy, handle_uid_store};
pub use folders::{
    handle_create, handle_delete, handle_get_quota_root, handle_list, handle_rename, handle_select,
    handle_unselect,
};
pub use session::{handle_capability, handle_login, handle_logout, handle_noop};
pub use uid_fetch::{handle_uid_fetch, requested_items};
pub use uid_search::handle_uid_search;
