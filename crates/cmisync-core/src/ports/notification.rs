//! Notification service port (driven/secondary port)
//!
//! Receives the user-actionable problems raised by resolution strategies.
//! Implementations may show a desktop notification, write to a status file,
//! or forward the detail to a UI.
//!
//! ## Design Notes
//!
//! - Notifications are fire-and-forget: the drain loop logs a delivery
//!   failure and moves on, since the conflict will be raised again on the
//!   next sync.
//! - [`Notification`] is the flattened, display-oriented form of an
//!   [`InteractionDetail`].

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::domain::interaction::{InteractionDetail, InteractionKind, Severity};

// ============================================================================
// Notification struct and NotificationPriority enum
// ============================================================================

/// Priority level for a notification
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationPriority {
    Low,
    #[default]
    Normal,
    High,
    /// Persists until acknowledged
    Critical,
}

impl From<Severity> for NotificationPriority {
    fn from(severity: Severity) -> Self {
        match severity {
            Severity::Info => NotificationPriority::Low,
            Severity::Warning => NotificationPriority::High,
            Severity::Fatal => NotificationPriority::Critical,
        }
    }
}

impl std::fmt::Display for NotificationPriority {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            NotificationPriority::Low => "low",
            NotificationPriority::Normal => "normal",
            NotificationPriority::High => "high",
            NotificationPriority::Critical => "critical",
        };
        write!(f, "{}", s)
    }
}

/// A notification to display to the user
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub priority: NotificationPriority,
    /// Category for grouping (e.g. "quota", "virus", "conflict")
    pub category: String,
    /// Server message or error chain, shown on demand
    pub details: String,
    pub paths: Vec<PathBuf>,
}

impl Notification {
    /// Creates a new notification with the given title and body
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            body: body.into(),
            priority: NotificationPriority::Normal,
            category: String::new(),
            details: String::new(),
            paths: Vec::new(),
        }
    }

    pub fn with_priority(mut self, priority: NotificationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = category.into();
        self
    }
}

impl From<&InteractionDetail> for Notification {
    fn from(detail: &InteractionDetail) -> Self {
        let category = match detail.kind {
            InteractionKind::QuotaExceeded => "quota",
            InteractionKind::VirusDetected => "virus",
            InteractionKind::ConflictingRename => "conflict",
            InteractionKind::General => "sync",
        };
        Self {
            title: detail.title.clone(),
            body: detail.description.clone(),
            priority: detail.severity.into(),
            category: category.to_string(),
            details: detail.technical_details.clone(),
            paths: detail.affected_paths.clone(),
        }
    }
}

// ============================================================================
// INotificationService trait
// ============================================================================

/// Port trait for surfacing problems to the user
#[async_trait::async_trait]
pub trait INotificationService: Send + Sync {
    /// Delivers a notification
    ///
    /// # Arguments
    /// * `notification` - The notification content and metadata
    async fn notify(&self, notification: &Notification) -> anyhow::Result<()>;
}
