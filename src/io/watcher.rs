use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::path::{Path, PathBuf};
use tokio::sync::mpsc::{self, Receiver, Sender};

use crate::core::error::WatchError;
use crate::io::events::FsEvent;

const CHANNEL_CAPACITY: usize = 256;

/// Non-recursive change notifications for one directory.
///
/// The subscription can be dropped and re-registered in place, which is how
/// watchers recover from a backend error.
pub struct FsSubscription {
    dir: PathBuf,
    watcher: Option<RecommendedWatcher>,
    tx: Sender<FsEvent>,
    rx: Receiver<FsEvent>,
}

impl FsSubscription {
    pub fn subscribe(dir: &Path) -> Result<Self, WatchError> {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        let mut sub = Self {
            dir: dir.to_path_buf(),
            watcher: None,
            tx,
            rx,
        };
        sub.register()?;
        Ok(sub)
    }

    pub fn is_active(&self) -> bool {
        self.watcher.is_some()
    }

    fn register(&mut self) -> Result<(), WatchError> {
        let tx = self.tx.clone();
        let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
            let event = match res {
                Ok(event) => FsEvent::from_notify(event),
                Err(e) => Some(FsEvent::Error(format!("Watch error: {e}"))),
            };
            if let Some(event) = event {
                // Runs on the backend's own thread, never inside the runtime.
                let _ = tx.blocking_send(event);
            }
        })?;
        watcher.watch(&self.dir, RecursiveMode::NonRecursive)?;
        self.watcher = Some(watcher);
        Ok(())
    }

    /// Drops the current registration and registers again.
    pub fn resubscribe(&mut self) -> Result<(), WatchError> {
        self.unsubscribe();
        self.register()
    }

    pub fn unsubscribe(&mut self) {
        if let Some(mut watcher) = self.watcher.take() {
            let _ = watcher.unwatch(&self.dir);
        }
    }

    /// Waits for the next event. Pending when nothing is registered.
    pub async fn next(&mut self) -> Option<FsEvent> {
        self.rx.recv().await
    }

    /// Next queued event without waiting.
    pub fn try_next(&mut self) -> Option<FsEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for FsSubscription {
    fn drop(&mut self) {
        self.unsubscribe();
    }
}
