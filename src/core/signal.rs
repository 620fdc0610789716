use chrono::{DateTime, Local};
use std::path::{Path, PathBuf};

/// A file that showed up in a watched directory.
///
/// Identified by its path at detection time; nothing about it is remembered
/// across restarts.
#[derive(Debug, Clone, PartialEq)]
pub struct FileSignal {
    pub path: PathBuf,
    pub name: String,
    pub size_bytes: u64,
    pub detected_at: DateTime<Local>,
}

impl FileSignal {
    pub fn new(path: &Path, size_bytes: u64, detected_at: DateTime<Local>) -> Option<Self> {
        let name = path.file_name()?.to_string_lossy().to_string();
        Some(Self {
            path: path.to_path_buf(),
            name,
            size_bytes,
            detected_at,
        })
    }

    /// Directory the file arrived in.
    pub fn origin(&self) -> &Path {
        self.path.parent().unwrap_or_else(|| Path::new(""))
    }
}

/// A unit of external work detected by a watcher.
#[derive(Debug, Clone, PartialEq)]
pub enum Signal {
    DroppedFile(FileSignal),
    InboxFile(FileSignal),
    /// An unread message, referenced by the id the mail store assigned.
    /// The full message is fetched when the artifact is created.
    Mail { id: String },
}

impl Signal {
    /// Stable identifier used in logs.
    pub fn id(&self) -> String {
        match self {
            Signal::DroppedFile(f) | Signal::InboxFile(f) => f.path.display().to_string(),
            Signal::Mail { id } => id.clone(),
        }
    }
}

const HIGH_PRIORITY_KEYWORDS: [&str; 7] = [
    "urgent",
    "asap",
    "immediate",
    "critical",
    "emergency",
    "payment",
    "invoice",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Priority {
    High,
    Medium,
}

impl Priority {
    /// Case-insensitive keyword match against the subject line.
    pub fn classify(subject: &str) -> Self {
        let subject = subject.to_lowercase();
        if HIGH_PRIORITY_KEYWORDS.iter().any(|k| subject.contains(k)) {
            Priority::High
        } else {
            Priority::Medium
        }
    }
}

impl std::fmt::Display for Priority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Priority::High => write!(f, "high"),
            Priority::Medium => write!(f, "medium"),
        }
    }
}

/// A fetched and decoded mail message.
#[derive(Debug, Clone, PartialEq)]
pub struct MailMessage {
    pub id: String,
    pub sender: String,
    pub subject: String,
    /// `Date` header as sent, or the fetch time when the header is missing.
    pub received: String,
    pub body: String,
}

impl MailMessage {
    pub fn priority(&self) -> Priority {
        Priority::classify(&self.subject)
    }
}
