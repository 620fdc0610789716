pub mod dedup;
pub mod error;
pub mod signal;
pub mod state;
pub mod watcher;

pub use error::WatchError;
pub use signal::{FileSignal, MailMessage, Priority, Signal};
pub use watcher::{Lifecycle, Watcher, WatcherPhase};
