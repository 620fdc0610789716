//! The shared document tree watchers read from and write into.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use crate::core::error::WatchError;

pub const NEEDS_ACTION_DIR: &str = "Needs_Action";
pub const INBOX_DIR: &str = "Inbox";

/// Writes `data` next to `path` and renames it into place, so readers polling
/// the directory never see a partial file.
pub fn write_atomic(path: &Path, data: &[u8]) -> io::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no parent"))?;
    fs::create_dir_all(parent)?;
    let mut tmp = tempfile::NamedTempFile::new_in(parent)?;
    tmp.write_all(data)?;
    tmp.flush()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

impl Vault {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn needs_action(&self) -> PathBuf {
        self.root.join(NEEDS_ACTION_DIR)
    }

    pub fn inbox(&self) -> PathBuf {
        self.root.join(INBOX_DIR)
    }

    /// Resolves a vault-relative path. Absolute paths pass through untouched.
    pub fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.root.join(path)
        }
    }

    pub fn ensure_layout(&self) -> io::Result<()> {
        fs::create_dir_all(self.needs_action())?;
        fs::create_dir_all(self.inbox())?;
        Ok(())
    }

    pub fn write(&self, path: &Path, text: &str) -> Result<PathBuf, WatchError> {
        let full = self.resolve(path);
        write_atomic(&full, text.as_bytes()).map_err(|source| WatchError::Vault {
            path: full.clone(),
            source,
        })?;
        Ok(full)
    }

    pub fn read(&self, path: &Path) -> Option<String> {
        fs::read_to_string(self.resolve(path)).ok()
    }

    pub fn size(&self, path: &Path) -> io::Result<u64> {
        Ok(fs::metadata(self.resolve(path))?.len())
    }

    /// Copies `src` to `dst` through a temporary sibling of `dst`. The source is left in place.
    pub fn copy_file(&self, src: &Path, dst: &Path) -> Result<PathBuf, WatchError> {
        let src = self.resolve(src);
        let dst = self.resolve(dst);
        let parent = dst.parent().unwrap_or(&self.root).to_path_buf();

        let mut reader = fs::File::open(&src).map_err(|e| WatchError::transient(&src, e))?;
        let vault_err = |source: io::Error| WatchError::Vault {
            path: dst.clone(),
            source,
        };
        fs::create_dir_all(&parent).map_err(vault_err)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&parent).map_err(vault_err)?;
        io::copy(&mut reader, &mut tmp).map_err(|e| WatchError::transient(&src, e))?;
        tmp.flush().map_err(vault_err)?;
        tmp.persist(&dst).map_err(|e| vault_err(e.error))?;
        Ok(dst)
    }

    /// Moves `src` to `dst`. Falls back to copy + remove when a rename cannot
    /// cross filesystems.
    pub fn move_file(&self, src: &Path, dst: &Path) -> Result<PathBuf, WatchError> {
        let src = self.resolve(src);
        let dst = self.resolve(dst);
        if let Some(parent) = dst.parent() {
            fs::create_dir_all(parent).map_err(|source| WatchError::Vault {
                path: dst.clone(),
                source,
            })?;
        }
        match fs::rename(&src, &dst) {
            Ok(()) => Ok(dst),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Err(WatchError::transient(&src, e)),
            Err(_) => {
                self.copy_file(&src, &dst)?;
                fs::remove_file(&src).map_err(|e| WatchError::transient(&src, e))?;
                Ok(dst)
            }
        }
    }
}
