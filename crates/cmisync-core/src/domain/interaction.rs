//! User-actionable conflicts
//!
//! When a resolution strategy cannot proceed without the user (the quota is
//! exhausted, the server flagged a file as malware, both sides renamed the
//! same object differently) it produces an [`InteractionDetail`]. The
//! orchestrator wraps it in an `InteractionNeeded` queue event which the
//! notification port eventually receives.

use std::fmt;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// How serious an interaction is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Fatal => "fatal",
        };
        f.write_str(s)
    }
}

/// Known classes of user-actionable conflicts
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InteractionKind {
    /// The remote storage quota is exhausted
    QuotaExceeded,
    /// The server rejected content as infected
    VirusDetected,
    /// Both sides renamed or moved the object to different targets
    ConflictingRename,
    /// Any other problem that needs the user
    General,
}

/// Structured description of a problem the user must resolve
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractionDetail {
    pub kind: InteractionKind,
    pub severity: Severity,
    /// One-line summary suitable for a notification title
    pub title: String,
    /// Human readable explanation
    pub description: String,
    /// Server message or error chain, for bug reports
    pub technical_details: String,
    /// Local paths affected by the problem
    pub affected_paths: Vec<PathBuf>,
}

impl InteractionDetail {
    /// Creates a general interaction with warning severity
    pub fn new(title: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            kind: InteractionKind::General,
            severity: Severity::Warning,
            title: title.into(),
            description: description.into(),
            technical_details: String::new(),
            affected_paths: Vec::new(),
        }
    }

    /// The remote repository refused the write because the quota is full
    pub fn quota_exceeded(technical_details: impl Into<String>) -> Self {
        Self {
            kind: InteractionKind::QuotaExceeded,
            severity: Severity::Warning,
            title: "Storage quota exceeded".to_string(),
            description: "The remote repository has no space left for this file. \
                          Free some space on the server, then synchronization resumes."
                .to_string(),
            technical_details: technical_details.into(),
            affected_paths: Vec::new(),
        }
    }

    /// The server's content scanner rejected the file
    pub fn virus_detected(technical_details: impl Into<String>) -> Self {
        Self {
            kind: InteractionKind::VirusDetected,
            severity: Severity::Fatal,
            title: "Virus detected".to_string(),
            description: "The server rejected this file because it was flagged as \
                          malicious. The file was not uploaded."
                .to_string(),
            technical_details: technical_details.into(),
            affected_paths: Vec::new(),
        }
    }

    pub fn with_kind(mut self, kind: InteractionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = severity;
        self
    }

    pub fn with_technical_details(mut self, details: impl Into<String>) -> Self {
        self.technical_details = details.into();
        self
    }

    /// Adds an affected path (duplicates are ignored)
    pub fn with_path(mut self, path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        if !self.affected_paths.contains(&path) {
            self.affected_paths.push(path);
        }
        self
    }
}
