//! Ignore rules and the event filter
//!
//! The [`EventFilter`] runs before every other handler and drops events for
//! objects that must never be synchronized:
//!
//! - names matching an ignore pattern (configured or built-in temp files)
//! - hidden names when configured
//! - paths outside the sync root
//! - objects whose mapping, or any mapped ancestor, is flagged as ignored
//!
//! A rename into an ignored name is rewritten to a delete of the old path,
//! and a rename out of one to a create of the new path.

use std::collections::HashSet;
use std::path::{Component, Path};
use std::sync::Arc;

use async_trait::async_trait;
use cmisync_core::config::FiltersConfig;
use cmisync_core::domain::{FsChange, FsChangeKind, QueueEvent, RemoteId, SyncEvent};
use cmisync_core::ports::IMetaDataStorage;
use glob::Pattern;
use tracing::{debug, warn};

use crate::metrics::SyncMetrics;
use crate::queue::{priority, Dispatch, SyncEventHandler};
use crate::SyncError;

/// Why an event was dropped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterReason {
    IgnoredName,
    Hidden,
    OutsideRoot,
    IgnoredObject,
}

impl FilterReason {
    pub fn name(self) -> &'static str {
        match self {
            Self::IgnoredName => "ignored_name",
            Self::Hidden => "hidden",
            Self::OutsideRoot => "outside_root",
            Self::IgnoredObject => "ignored_object",
        }
    }
}

// ============================================================================
// IgnoreRules
// ============================================================================

/// Compiled name-based ignore rules
#[derive(Debug, Clone)]
pub struct IgnoreRules {
    patterns: Vec<Pattern>,
    ignore_hidden: bool,
}

impl IgnoreRules {
    /// Temporary files written by office suites and editors
    pub const BUILTIN: [&'static str; 4] = ["~$*", "*.tmp", "*.swp", ".~lock.*"];

    /// Compiles the built-in patterns plus `patterns`
    ///
    /// # Errors
    /// Returns [`SyncError::InvalidPattern`] for the first pattern that does
    /// not compile
    pub fn new(patterns: &[String], ignore_hidden: bool) -> Result<Self, SyncError> {
        let compiled = Self::BUILTIN
            .iter()
            .copied()
            .chain(patterns.iter().map(String::as_str))
            .map(|p| {
                Pattern::new(p).map_err(|e| SyncError::InvalidPattern {
                    pattern: p.to_string(),
                    reason: e.msg.to_string(),
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            patterns: compiled,
            ignore_hidden,
        })
    }

    pub fn from_config(filters: &FiltersConfig) -> Result<Self, SyncError> {
        Self::new(&filters.ignored_names, filters.ignore_hidden)
    }

    pub fn check_name(&self, name: &str) -> Option<FilterReason> {
        if self.patterns.iter().any(|p| p.matches(name)) {
            return Some(FilterReason::IgnoredName);
        }
        if self.ignore_hidden && name.starts_with('.') {
            return Some(FilterReason::Hidden);
        }
        None
    }

    /// Checks every component of a path relative to the sync root
    pub fn check_relative(&self, relative: &Path) -> Option<FilterReason> {
        relative.components().find_map(|component| match component {
            Component::Normal(name) => self.check_name(&name.to_string_lossy()),
            Component::ParentDir => Some(FilterReason::OutsideRoot),
            _ => None,
        })
    }
}

// ============================================================================
// EventFilter
// ============================================================================

pub struct EventFilter {
    rules: IgnoreRules,
    store: Arc<dyn IMetaDataStorage>,
    metrics: Option<Arc<SyncMetrics>>,
}

impl EventFilter {
    pub fn new(rules: IgnoreRules, store: Arc<dyn IMetaDataStorage>) -> Self {
        Self {
            rules,
            store,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<SyncMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Name and root checks of a local path
    pub fn check_path(&self, path: &Path) -> Option<FilterReason> {
        match path.strip_prefix(self.store.sync_root()) {
            Ok(relative) => self.rules.check_relative(relative),
            Err(_) => Some(FilterReason::OutsideRoot),
        }
    }

    /// Whether the mapping at `path` or at any ancestor is flagged ignored
    async fn ignored_by_path(&self, path: &Path) -> anyhow::Result<bool> {
        let root = self.store.sync_root();
        for ancestor in path.ancestors() {
            if !ancestor.starts_with(root) {
                break;
            }
            if let Some(mapped) = self.store.get_by_path(ancestor).await? {
                if mapped.ignored {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Whether the mapping of `remote_id` or of any mapped parent is ignored
    async fn ignored_by_remote_id(&self, remote_id: &RemoteId) -> anyhow::Result<bool> {
        let mut visited = HashSet::new();
        let mut next = Some(remote_id.clone());

        while let Some(id) = next.take() {
            if !visited.insert(id.clone()) {
                break;
            }
            let Some(mapped) = self.store.get_by_remote_id(&id).await? else {
                break;
            };
            if mapped.ignored {
                return Ok(true);
            }
            next = mapped.parent_id;
        }
        Ok(false)
    }

    /// Store failures never drop an event
    fn lookup_ok(result: anyhow::Result<bool>) -> bool {
        match result {
            Ok(ignored) => ignored,
            Err(err) => {
                warn!(error = %format!("{err:#}"), "Ignore lookup failed, keeping event");
                false
            }
        }
    }

    async fn check_fs_change(&self, change: &FsChange) -> Option<FilterReason> {
        if let Some(reason) = self.check_path(&change.path) {
            return Some(reason);
        }
        if Self::lookup_ok(self.ignored_by_path(&change.path).await) {
            return Some(FilterReason::IgnoredObject);
        }
        None
    }

    async fn check_sync_event(&self, event: &SyncEvent) -> Option<FilterReason> {
        if let Some(path) = event.local_path() {
            if let Some(reason) = self.check_path(path) {
                return Some(reason);
            }
            if Self::lookup_ok(self.ignored_by_path(path).await) {
                return Some(FilterReason::IgnoredObject);
            }
        }
        if let Some(remote) = event.remote_object() {
            if let Some(reason) = self.rules.check_name(&remote.name) {
                return Some(reason);
            }
            if Self::lookup_ok(self.ignored_by_remote_id(&remote.id).await) {
                return Some(FilterReason::IgnoredObject);
            }
        }
        None
    }

    /// Rewrites renames that cross the ignore boundary
    ///
    /// Endpoints outside the root pass through unchanged; the local
    /// transformer degrades those.
    fn rewrite_rename(&self, change: FsChange) -> Result<FsChange, FilterReason> {
        let Some(old_path) = change.old_path.clone() else {
            return Ok(change);
        };
        let ignored = |path: &Path| match self.check_path(path) {
            Some(FilterReason::OutsideRoot) | None => None,
            reason => reason,
        };

        match (ignored(&old_path), ignored(&change.path)) {
            (Some(_), Some(reason)) => Err(reason),
            (None, Some(_)) => {
                debug!(path = %old_path.display(), "Renamed to an ignored name, treating as delete");
                Ok(FsChange::deleted(old_path))
            }
            (Some(_), None) => {
                debug!(path = %change.path.display(), "Renamed from an ignored name, treating as create");
                Ok(FsChange::created(change.path, change.is_dir))
            }
            (None, None) => Ok(change),
        }
    }

    fn dropped(&self, reason: FilterReason, what: &str) -> Dispatch {
        debug!(reason = reason.name(), event = what, "Filtered event");
        if let Some(metrics) = &self.metrics {
            metrics.record_filtered(reason.name());
        }
        Dispatch::Handled
    }
}

#[async_trait]
impl SyncEventHandler for EventFilter {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn priority(&self) -> i32 {
        priority::FILTER
    }

    async fn handle(&self, event: QueueEvent) -> Result<Dispatch, SyncError> {
        match event {
            QueueEvent::Fs(change) if change.kind == FsChangeKind::Renamed => {
                match self.rewrite_rename(change) {
                    Err(reason) => Ok(self.dropped(reason, "fs_rename")),
                    Ok(change) if change.kind == FsChangeKind::Renamed => {
                        let moved_out_of_ignored = match &change.old_path {
                            Some(old) => Self::lookup_ok(self.ignored_by_path(old).await),
                            None => false,
                        };
                        if moved_out_of_ignored {
                            return Ok(self.dropped(FilterReason::IgnoredObject, "fs_rename"));
                        }
                        Ok(Dispatch::NotHandled(QueueEvent::Fs(change)))
                    }
                    Ok(change) => match self.check_fs_change(&change).await {
                        Some(reason) => Ok(self.dropped(reason, "fs_rename")),
                        None => Ok(Dispatch::NotHandled(QueueEvent::Fs(change))),
                    },
                }
            }
            QueueEvent::Fs(change) => match self.check_fs_change(&change).await {
                Some(reason) => Ok(self.dropped(reason, "fs")),
                None => Ok(Dispatch::NotHandled(QueueEvent::Fs(change))),
            },
            QueueEvent::Sync(event) => match self.check_sync_event(&event).await {
                Some(reason) => Ok(self.dropped(reason, "sync")),
                None => Ok(Dispatch::NotHandled(QueueEvent::Sync(event))),
            },
            other => Ok(Dispatch::NotHandled(other)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(hidden: bool) -> IgnoreRules {
        IgnoreRules::new(&["*.bak".to_string(), "node_modules".to_string()], hidden).unwrap()
    }

    #[test]
    fn test_builtin_temp_files_ignored() {
        let rules = rules(false);
        assert_eq!(rules.check_name("~$report.docx"), Some(FilterReason::IgnoredName));
        assert_eq!(rules.check_name("upload.tmp"), Some(FilterReason::IgnoredName));
        assert_eq!(rules.check_name(".notes.txt.swp"), Some(FilterReason::IgnoredName));
        assert_eq!(rules.check_name(".~lock.sheet.ods#"), Some(FilterReason::IgnoredName));
        assert_eq!(rules.check_name("report.docx"), None);
    }

    #[test]
    fn test_configured_patterns() {
        let rules = rules(false);
        assert_eq!(rules.check_name("old.bak"), Some(FilterReason::IgnoredName));
        assert_eq!(rules.check_name("node_modules"), Some(FilterReason::IgnoredName));
        assert_eq!(rules.check_name("modules"), None);
    }

    #[test]
    fn test_hidden_only_when_enabled() {
        assert_eq!(rules(false).check_name(".profile"), None);
        assert_eq!(rules(true).check_name(".profile"), Some(FilterReason::Hidden));
    }

    #[test]
    fn test_any_component_matches() {
        let rules = rules(false);
        assert_eq!(
            rules.check_relative(Path::new("src/node_modules/lib/index.js")),
            Some(FilterReason::IgnoredName)
        );
        assert_eq!(rules.check_relative(Path::new("src/lib/index.js")), None);
        assert_eq!(
            rules.check_relative(Path::new("../elsewhere")),
            Some(FilterReason::OutsideRoot)
        );
    }

    #[test]
    fn test_invalid_pattern_rejected() {
        let err = IgnoreRules::new(&["[".to_string()], false).unwrap_err();
        assert!(matches!(err, SyncError::InvalidPattern { ref pattern, .. } if pattern == "["));
    }
}
