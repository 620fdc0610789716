pub mod events;
pub mod mail;
pub mod message;
pub mod watcher;
