//! Markdown action records written into `Needs_Action/`.
//!
//! Every artifact is a front-matter header, a one-line summary, one metadata
//! section and a checklist of suggested actions. Rendering is a pure function of
//! the artifact's fields: timestamps are captured on the signal, not here.

pub mod front_matter;

use chrono::{DateTime, Local, SecondsFormat};
use std::fmt::Write;
use std::path::{Path, PathBuf};

pub use front_matter::{parse_front_matter, FrontMatter};

use crate::core::error::WatchError;
use crate::core::signal::{FileSignal, MailMessage};
use crate::vault::Vault;

pub const STATUS_PENDING: &str = "pending";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    FileDrop,
    InboxFile,
    Email,
    TestItem,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::FileDrop => "file_drop",
            ArtifactKind::InboxFile => "inbox_file",
            ArtifactKind::Email => "email",
            ArtifactKind::TestItem => "test_item",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    pub title: String,
    pub body: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ActionArtifact {
    pub kind: ArtifactKind,
    pub front_matter: FrontMatter,
    pub summary: String,
    pub section: Section,
    pub checklist: Vec<String>,
}

const FILE_CHECKLIST: [&str; 3] = [
    "Review file contents",
    "Determine appropriate action",
    "Process or forward as needed",
];

const EMAIL_CHECKLIST: [&str; 3] = [
    "Reply to sender",
    "Forward to relevant party",
    "Archive after processing",
];

const TEST_CHECKLIST: [&str; 3] = [
    "Review this test item",
    "Process according to the vault handbook",
    "Move to Done when completed",
];

pub fn timestamp(at: &DateTime<Local>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Secs, false)
}

impl ActionArtifact {
    pub fn file_drop(file: &FileSignal) -> Self {
        Self::for_file(
            ArtifactKind::FileDrop,
            file,
            format!("New file dropped for processing: {}", file.name),
            "Dropped at",
        )
    }

    pub fn inbox_file(file: &FileSignal) -> Self {
        Self::for_file(
            ArtifactKind::InboxFile,
            file,
            format!("New file received in Inbox: {}", file.name),
            "Received at",
        )
    }

    fn for_file(kind: ArtifactKind, file: &FileSignal, summary: String, at_label: &str) -> Self {
        let received = timestamp(&file.detected_at);
        let front_matter = FrontMatter::new()
            .with("type", kind.as_str())
            .with("original_name", &file.name)
            .with("size", file.size_bytes)
            .with("received", &received)
            .with("status", STATUS_PENDING);
        let body = format!(
            "- Size: {} bytes\n- Location: {}\n- {}: {}",
            file.size_bytes,
            file.origin().display(),
            at_label,
            received
        );
        Self {
            kind,
            front_matter,
            summary,
            section: Section {
                title: "File Information".to_string(),
                body,
            },
            checklist: FILE_CHECKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn email(message: &MailMessage) -> Self {
        let front_matter = FrontMatter::new()
            .with("type", ArtifactKind::Email.as_str())
            .with("from", &message.sender)
            .with("subject", &message.subject)
            .with("received", &message.received)
            .with("priority", message.priority())
            .with("status", STATUS_PENDING);
        Self {
            kind: ArtifactKind::Email,
            front_matter,
            summary: format!("Email from {}: {}", message.sender, message.subject),
            section: Section {
                title: "Email Content".to_string(),
                body: message.body.trim_end().to_string(),
            },
            checklist: EMAIL_CHECKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn test_item(created: &DateTime<Local>) -> Self {
        let created = timestamp(created);
        Self {
            kind: ArtifactKind::TestItem,
            front_matter: FrontMatter::new()
                .with("type", ArtifactKind::TestItem.as_str())
                .with("created", &created)
                .with("status", STATUS_PENDING),
            summary: "Test item written to check vault access.".to_string(),
            section: Section {
                title: "Details".to_string(),
                body: format!("- Created at: {created}\n- Purpose: Verify write access"),
            },
            checklist: TEST_CHECKLIST.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn render(&self) -> String {
        let mut out = self.front_matter.render();
        let _ = write!(
            out,
            "\n{}\n\n## {}\n{}\n\n## Suggested Actions\n",
            self.summary, self.section.title, self.section.body
        );
        for item in &self.checklist {
            let _ = writeln!(out, "- [ ] {item}");
        }
        out
    }

    /// Writes the rendered artifact to `path`, all-or-nothing.
    pub fn persist(&self, vault: &Vault, path: &Path) -> Result<PathBuf, WatchError> {
        vault.write(path, &self.render())
    }
}

/// Deterministic artifact names, so a re-delivered signal overwrites in place.
pub mod names {
    pub fn drop_copy(name: &str) -> String {
        format!("FILE_DROP_{name}")
    }

    pub fn drop_meta(name: &str) -> String {
        format!("META_FILE_DROP_{name}.md")
    }

    pub fn inbox_meta(name: &str) -> String {
        format!("META_{name}.md")
    }

    pub fn email(id: &str) -> String {
        let safe: String = id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        format!("EMAIL_{safe}.md")
    }

    pub const PROBE: &str = "TEST_intake_probe.md";
}
