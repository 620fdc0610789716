use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::core::dedup::DEFAULT_CAPACITY;

/// Per-vault settings directory, next to `Needs_Action/`.
pub const INTAKE_DIR: &str = ".intake";
pub const CONFIG_FILE: &str = "config.toml";

#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
#[serde(default)]
pub struct IntakeConfig {
    pub drop: DropConfig,
    pub inbox: InboxConfig,
    pub mail: MailConfig,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct DropConfig {
    pub enabled: bool,
    /// External folder to watch. Relative paths resolve against the vault root.
    pub folder: Option<PathBuf>,
    pub check_interval_secs: u64,
    pub settle_ms: u64,
}

impl Default for DropConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            folder: None,
            check_interval_secs: 10,
            settle_ms: 250,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct InboxConfig {
    pub enabled: bool,
    pub check_interval_secs: u64,
    pub settle_ms: u64,
}

impl Default for InboxConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            check_interval_secs: 10,
            settle_ms: 250,
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct MailConfig {
    pub enabled: bool,
    pub account: String,
    pub server: String,
    pub port: u16,
    pub mailbox: String,
    pub check_interval_secs: u64,
    /// Upper bound on any single network call.
    pub timeout_secs: u64,
    pub dedup_capacity: usize,
    /// When set, seen message ids survive restarts.
    pub dedup_state: Option<PathBuf>,
}

impl Default for MailConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            account: String::new(),
            server: "imap.gmail.com".to_string(),
            port: 993,
            mailbox: "INBOX".to_string(),
            check_interval_secs: 120,
            timeout_secs: 60,
            dedup_capacity: DEFAULT_CAPACITY,
            dedup_state: None,
        }
    }
}

impl MailConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

impl IntakeConfig {
    pub fn path_for_vault(root: &Path) -> PathBuf {
        root.join(INTAKE_DIR).join(CONFIG_FILE)
    }

    /// Missing file means defaults; a file that does not parse is an error.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        toml::from_str(&raw).with_context(|| format!("Invalid config {}", path.display()))
    }

    pub fn load_for_vault(root: &Path) -> Result<Self> {
        Self::load(&Self::path_for_vault(root))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let toml = toml::to_string_pretty(self)?;
        fs::write(path, toml)?;
        Ok(())
    }
}
