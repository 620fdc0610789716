//! Watches an external drop folder. New files are copied into `Needs_Action/`
//! and described by a sibling metadata artifact; the original stays put.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::artifact::{names, ActionArtifact};
use crate::core::error::WatchError;
use crate::core::signal::{FileSignal, Signal};
use crate::core::state::DropConfig;
use crate::core::watcher::{Watcher, WatcherPhase};
use crate::vault::Vault;
use crate::watchers::folder::{run_event_loop, FolderSource, FolderWatch};

const NAME: &str = "file_drop";

pub struct FileDropWatcher {
    vault: Vault,
    source: FolderSource,
}

impl FileDropWatcher {
    pub fn new(vault: Vault, folder: PathBuf, check_interval: Duration, settle: Duration) -> Result<Self> {
        std::fs::create_dir_all(vault.needs_action())
            .with_context(|| format!("Failed to create {}", vault.needs_action().display()))?;
        let folder = vault.resolve(&folder);
        Ok(Self {
            source: FolderSource::new(NAME, folder, check_interval, settle),
            vault,
        })
    }

    pub fn from_config(vault: Vault, config: &DropConfig) -> Result<Self> {
        let folder = config
            .folder
            .clone()
            .context("drop watcher enabled but no [drop] folder configured")?;
        Self::new(
            vault,
            folder,
            Duration::from_secs(config.check_interval_secs),
            Duration::from_millis(config.settle_ms),
        )
    }

    fn transfer(vault: &Vault, file: &FileSignal) -> Result<PathBuf, WatchError> {
        let needs_action = vault.needs_action();
        vault.copy_file(&file.path, &needs_action.join(names::drop_copy(&file.name)))?;
        ActionArtifact::file_drop(file).persist(vault, &needs_action.join(names::drop_meta(&file.name)))
    }
}

#[async_trait]
impl Watcher for FileDropWatcher {
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
            .map(Signal::DroppedFile)
            .collect()
    }

    async fn create_action_file(&mut self, signal: &Signal) -> Option<PathBuf> {
        let Signal::DroppedFile(file) = signal else {
            warn!(watcher = NAME, id = %signal.id(), "not a dropped file");
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
                info!(watcher = NAME, name = %file.name, "created metadata file for dropped file");
                Some(meta)
            }
            Ok((file, Err(e))) => {
                error!(watcher = NAME, name = %file.name, error = %e, "failed to process dropped file");
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

impl FolderWatch for FileDropWatcher {
    fn source(&mut self) -> &mut FolderSource {
        &mut self.source
    }

    fn to_signal(file: FileSignal) -> Signal {
        Signal::DroppedFile(file)
    }
}
