//! Per-watcher record of signal ids that already produced an artifact.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};

use crate::vault::write_atomic;

pub const DEFAULT_CAPACITY: usize = 10_000;

#[derive(Debug, Serialize, Deserialize, Default)]
struct SeenFile {
    ids: Vec<String>,
}

#[derive(Debug)]
pub struct DedupTracker {
    seen: HashSet<String>,
    // Insertion order, oldest first. Drives eviction and the on-disk order.
    order: VecDeque<String>,
    capacity: usize,
    state_path: Option<PathBuf>,
    dirty: bool,
}

impl DedupTracker {
    pub fn new(capacity: usize) -> Self {
        Self {
            seen: HashSet::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
            state_path: None,
            dirty: false,
        }
    }

    /// Tracker backed by a JSON file. A missing file starts empty.
    pub fn persisted(capacity: usize, path: &Path) -> Result<Self> {
        let mut tracker = Self::new(capacity);
        if path.exists() {
            let raw = fs::read_to_string(path)
                .with_context(|| format!("Failed to read dedup state {}", path.display()))?;
            let file: SeenFile = serde_json::from_str(&raw)
                .with_context(|| format!("Corrupt dedup state {}", path.display()))?;
            for id in file.ids {
                tracker.mark_seen(&id);
            }
        }
        tracker.state_path = Some(path.to_path_buf());
        tracker.dirty = false;
        Ok(tracker)
    }

    pub fn has_seen(&self, id: &str) -> bool {
        self.seen.contains(id)
    }

    /// Returns false if the id was already present.
    pub fn mark_seen(&mut self, id: &str) -> bool {
        if !self.seen.insert(id.to_string()) {
            return false;
        }
        self.order.push_back(id.to_string());
        while self.order.len() > self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.seen.remove(&oldest);
            }
        }
        self.dirty = true;
        true
    }

    /// Forgets ids the source no longer reports. An id outside `live` cannot be
    /// listed again unless the source flags it outstanding once more.
    pub fn retain_live(&mut self, live: &[String]) {
        let live: HashSet<&str> = live.iter().map(String::as_str).collect();
        let before = self.order.len();
        self.order.retain(|id| live.contains(id.as_str()));
        if self.order.len() != before {
            self.seen.retain(|id| live.contains(id.as_str()));
            self.dirty = true;
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// True once another `mark_seen` would evict an id.
    pub fn is_full(&self) -> bool {
        self.order.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    /// Writes the seen set if it changed since the last flush. No-op for in-memory trackers.
    pub fn flush(&mut self) -> Result<()> {
        let Some(path) = &self.state_path else {
            return Ok(());
        };
        if !self.dirty {
            return Ok(());
        }
        let file = SeenFile {
            ids: self.order.iter().cloned().collect(),
        };
        let json = serde_json::to_string_pretty(&file)?;
        write_atomic(path, json.as_bytes())?;
        self.dirty = false;
        Ok(())
    }
}

impl Default for DedupTracker {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}
