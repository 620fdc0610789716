//! Source-specific watchers. Each one turns arrivals from a single origin into
//! action artifacts under `Needs_Action/`.

pub mod file_drop;
pub mod filter;
pub mod folder;
pub mod inbox;
pub mod mailbox;

pub use file_drop::FileDropWatcher;
pub use inbox::InboxWatcher;
pub use mailbox::MailboxWatcher;
