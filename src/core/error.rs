use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Failures a watcher can hit while turning a signal into an artifact.
///
/// None of these stop a running watcher: adapters log them and move on.
/// Only construction-time failures (surfaced as `anyhow::Error`) reach the caller.
#[derive(Debug, Error)]
pub enum WatchError {
    #[error("mail session unavailable: {0}")]
    Connectivity(String),

    #[error("{op} timed out after {after:?}")]
    Timeout { op: &'static str, after: Duration },

    #[error("file {} unavailable: {source}", path.display())]
    TransientFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed signal {id}: {reason}")]
    MalformedSignal { id: String, reason: String },

    #[error("vault write to {} failed: {source}", path.display())]
    Vault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("filesystem subscription failed: {0}")]
    Subscription(#[from] notify::Error),
}

impl WatchError {
    pub fn transient(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::TransientFile {
            path: path.into(),
            source,
        }
    }

    pub fn malformed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedSignal {
            id: id.into(),
            reason: reason.into(),
        }
    }

    /// Errors that call for tearing down and rebuilding the mail session.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Connectivity(_) | Self::Timeout { .. })
    }
}
