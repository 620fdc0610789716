//! Event-driven machinery shared by the directory watchers.

use anyhow::{Context, Result};
use chrono::Local;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::core::error::WatchError;
use crate::core::signal::{FileSignal, Signal};
use crate::core::watcher::{Lifecycle, Watcher};
use crate::io::events::FsEvent;
use crate::io::watcher::FsSubscription;
use crate::watchers::filter::is_transient;

const MAX_SETTLE_ROUNDS: usize = 40;

pub struct FolderSource {
    dir: PathBuf,
    retry: Duration,
    settle: Duration,
    subscription: Option<FsSubscription>,
    pub(crate) lifecycle: Lifecycle,
}

impl FolderSource {
    pub fn new(name: &'static str, dir: PathBuf, retry: Duration, settle: Duration) -> Self {
        Self {
            dir,
            retry,
            settle,
            subscription: None,
            lifecycle: Lifecycle::new(name),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn is_subscribed(&self) -> bool {
        self.subscription.as_ref().is_some_and(FsSubscription::is_active)
    }

    /// Registers the directory, reusing a suspended subscription if there is one.
    pub fn subscribe(&mut self) -> Result<(), WatchError> {
        match self.subscription.as_mut() {
            Some(sub) => sub.resubscribe(),
            None => {
                self.subscription = Some(FsSubscription::subscribe(&self.dir)?);
                Ok(())
            }
        }
    }

    /// Stops notifications but keeps the subscription for a later `subscribe`.
    pub fn suspend(&mut self) {
        if let Some(sub) = self.subscription.as_mut() {
            sub.unsubscribe();
        }
    }

    pub fn unsubscribe(&mut self) {
        if let Some(mut sub) = self.subscription.take() {
            sub.unsubscribe();
        }
    }

    async fn next_event(&mut self) -> Option<FsEvent> {
        match self.subscription.as_mut() {
            Some(sub) => sub.next().await,
            None => std::future::pending().await,
        }
    }

    /// Arrivals already queued on the subscription, without waiting for new ones.
    pub async fn pending_arrivals(&mut self) -> Vec<FileSignal> {
        let mut events = Vec::new();
        if let Some(sub) = self.subscription.as_mut() {
            while let Some(event) = sub.try_next() {
                events.push(event);
            }
        }
        let (name, settle) = (self.lifecycle.name(), self.settle);
        let mut files = Vec::new();
        for event in events {
            if let Some(file) = arrival(name, settle, event).await {
                files.push(file);
            }
        }
        files
    }
}

/// Turns a notification into a file arrival, or `None` when it should be ignored.
pub async fn arrival(watcher: &'static str, settle: Duration, event: FsEvent) -> Option<FileSignal> {
    let path = match event {
        FsEvent::Created { is_dir: true, .. } => return None,
        FsEvent::Created { path, .. } => path,
        FsEvent::Modified(path) => {
            debug!(watcher, path = %path.display(), "modification ignored");
            return None;
        }
        FsEvent::Removed(_) | FsEvent::Error(_) => return None,
    };
    let name = path.file_name()?.to_string_lossy().to_string();
    if is_transient(&name) {
        debug!(watcher, %name, "skipping transient file");
        return None;
    }
    match settled_size(&path, settle).await {
        Ok(Some(size)) => FileSignal::new(&path, size, Local::now()),
        Ok(None) => None,
        Err(e) => {
            warn!(watcher, error = %e, "file vanished before transfer");
            None
        }
    }
}

async fn stat(path: &Path) -> Result<std::fs::Metadata, WatchError> {
    tokio::fs::metadata(path)
        .await
        .map_err(|e| WatchError::transient(path, e))
}

/// Waits until the file stops growing. `Ok(None)` means it is a directory.
async fn settled_size(path: &Path, settle: Duration) -> Result<Option<u64>, WatchError> {
    let meta = stat(path).await?;
    if meta.is_dir() {
        return Ok(None);
    }
    let mut last = meta.len();
    if settle.is_zero() {
        return Ok(Some(last));
    }
    for _ in 0..MAX_SETTLE_ROUNDS {
        tokio::time::sleep(settle).await;
        let now = stat(path).await?.len();
        if now == last {
            break;
        }
        last = now;
    }
    Ok(Some(last))
}

/// A watcher driven by notifications on one directory.
pub trait FolderWatch: Watcher {
    fn source(&mut self) -> &mut FolderSource;

    fn to_signal(file: FileSignal) -> Signal;
}

/// Handles notifications one at a time until `cancel` fires.
///
/// A backend error drops the subscription; it is registered again after the
/// watcher's check interval, and keeps retrying at that pace while it fails.
pub async fn run_event_loop<W: FolderWatch>(watcher: &mut W, cancel: CancellationToken) -> Result<()> {
    let name = watcher.name();
    let dir = watcher.source().dir().to_path_buf();
    watcher
        .source()
        .subscribe()
        .with_context(|| format!("Failed to watch {}", dir.display()))?;
    watcher.source().lifecycle.start();
    info!(watcher = name, dir = %dir.display(), "watching folder");

    loop {
        if !watcher.source().is_subscribed() {
            let retry = watcher.source().retry;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(retry) => {}
            }
            match watcher.source().subscribe() {
                Ok(()) => info!(watcher = name, "resubscribed"),
                Err(e) => error!(watcher = name, error = %e, "resubscribe failed"),
            }
            continue;
        }

        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = watcher.source().next_event() => event,
        };
        match event {
            Some(FsEvent::Error(message)) => {
                error!(watcher = name, %message, "notification backend failed");
                watcher.source().suspend();
            }
            Some(event) => {
                let settle = watcher.source().settle;
                let arrived = tokio::select! {
                    _ = cancel.cancelled() => break,
                    file = arrival(name, settle, event) => file,
                };
                let Some(file) = arrived else {
                    continue;
                };
                let signal = W::to_signal(file);
                watcher.create_action_file(&signal).await;
            }
            None => break,
        }
    }

    watcher.source().unsubscribe();
    watcher.source().lifecycle.stop();
    Ok(())
}
