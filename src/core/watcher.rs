//! The lifecycle every source-specific watcher shares.

use anyhow::Result;
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::core::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherPhase {
    Created,
    Running,
    /// A polling watcher whose last fetch failed. It keeps looping.
    Failed,
    Stopped,
}

/// Tracks and logs phase transitions for one watcher instance.
#[derive(Debug)]
pub struct Lifecycle {
    name: &'static str,
    phase: WatcherPhase,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            phase: WatcherPhase::Created,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn phase(&self) -> WatcherPhase {
        self.phase
    }

    pub fn start(&mut self) {
        if self.phase != WatcherPhase::Running {
            info!(watcher = self.name, "watcher running");
        }
        self.phase = WatcherPhase::Running;
    }

    pub fn fail(&mut self) {
        if self.phase != WatcherPhase::Stopped {
            warn!(watcher = self.name, "watcher degraded, will retry next tick");
            self.phase = WatcherPhase::Failed;
        }
    }

    pub fn recover(&mut self) {
        if self.phase == WatcherPhase::Failed {
            info!(watcher = self.name, "watcher recovered");
            self.phase = WatcherPhase::Running;
        }
    }

    pub fn stop(&mut self) {
        if self.phase != WatcherPhase::Stopped {
            info!(watcher = self.name, "watcher stopped");
        }
        self.phase = WatcherPhase::Stopped;
    }
}

#[async_trait]
pub trait Watcher: Send {
    fn name(&self) -> &'static str;

    fn phase(&self) -> WatcherPhase;

    /// Signals not yet turned into artifacts. Never touches the vault.
    async fn check_for_updates(&mut self) -> Vec<Signal>;

    /// Transfers any file and writes the artifact. Failures are logged and yield `None`.
    async fn create_action_file(&mut self, signal: &Signal) -> Option<PathBuf>;

    /// Called once a polling tick has handled all of its signals.
    async fn finish_tick(&mut self) {}

    /// Runs until `cancel` fires, then releases subscriptions and sessions.
    async fn start_watching(&mut self, cancel: CancellationToken) -> Result<()>;
}

/// Tick loop for polling watchers.
///
/// Each tick checks for updates and creates every artifact before sleeping, so
/// ticks never overlap. Returns once `cancel` fires, at the latest after the
/// current tick.
pub async fn run_polling_loop<W>(watcher: &mut W, interval: Duration, cancel: &CancellationToken)
where
    W: Watcher + ?Sized,
{
    while !cancel.is_cancelled() {
        let signals = tokio::select! {
            _ = cancel.cancelled() => break,
            signals = watcher.check_for_updates() => signals,
        };
        for signal in &signals {
            watcher.create_action_file(signal).await;
        }
        watcher.finish_tick().await;
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = tokio::time::sleep(interval) => {}
        }
    }
}
