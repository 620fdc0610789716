//! Watches the vault's `Inbox/`. New files are moved into `Needs_Action/`
//! next to a metadata artifact describing them.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifact::{names, ActionArtifact};
use crate::core::error::WatchError;
use crate::core::signal::{FileSignal, Signal};
use crate::core::state::InboxConfig;
use crate::core::watcher::{Watcher, WatcherPhase};
use crate::vault::Vault;
use crate::watchers::folder::{run_event_loop, FolderSource, FolderWatch};

const NAME: &str = "inbox";

pub struct InboxWatcher {
    vault: Vault,
    source: FolderSource,
}

impl InboxWatcher {
    pub fn new(vault: Vault, check_interval: Duration, settle: Duration) -> Result<Self> {
        vault
            .ensure_layout()
            .with_context(|| format!("Failed to prepare vault at {}", vault.root().display()))?;
        Ok(Self {
            source: FolderSource::new(NAME, vault.inbox(), check_interval, settle),
            vault,
        })
    }

    pub fn from_config(vault: Vault, config: &InboxConfig) -> Result<Self> {
        Self::new(
            vault,
            Duration::from_secs(config.check_interval_secs),
            Duration::from_millis(config.settle_ms),
        )
    }

    fn transfer(vault: &Vault, file: &FileSignal) -> Result<PathBuf, WatchError> {
        let needs_action = vault.needs_action();
        vault.move_file(&file.path, &needs_action.join(&file.name))?;
        ActionArtifact::inbox_file(file).persist(vault, &needs_action.join(names::inbox_meta(&file.name)))
    }
}

#[async_trait]
impl Watcher for InboxWatcher {
    fn name(&self) -> &'static str {
        NAME
    }

    fn phase(&self) -> WatcherPhase {
        self.source.lifecycle.phase()
    }

    async fn check_for_updates(&mut self) -> Vec<Signal> {
        self.source
            .pending_arrivals()
            .await
            .into_iter()
            .map(Signal::InboxFile)
            .collect()
    }

    async fn create_action_file(&mut self, signal: &Signal) -> Option<PathBuf> {
        let Signal::InboxFile(file) = signal else {
            warn!(watcher = NAME, id = %signal.id(), "not an inbox file");
            return None;
        };
        let vault = self.vault.clone();
        let file = file.clone();
        let result = tokio::task::spawn_blocking(move || {
            let meta = Self::transfer(&vault, &file);
            (file, meta)
        })
        .await;
        match result {
            Ok((file, Ok(meta))) => {
                info!(watcher = NAME, name = %file.name, "moved file from Inbox to Needs_Action");
                Some(meta)
            }
            Ok((file, Err(e))) => {
                error!(watcher = NAME, name = %file.name, error = %e, "failed to process inbox file");
                None
            }
            Err(e) => {
                error!(watcher = NAME, error = %e, "transfer task panicked");
                None
            }
        }
    }

    async fn start_watching(&mut self, cancel: CancellationToken) -> Result<()> {
        run_event_loop(self, cancel).await
    }
}

impl FolderWatch for InboxWatcher {
    fn source(&mut self) -> &mut FolderSource {
        &mut self.source
    }

    fn to_signal(file: FileSignal) -> Signal {
        Signal::InboxFile(file)
    }
}
