//! Terminal handlers of the drain loop
//!
//! - [`InteractionHandler`] turns interaction requests into user notifications
//! - [`FullSyncRequests`] records that a full resynchronization was requested

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use cmisync_core::domain::QueueEvent;
use cmisync_core::ports::{INotificationService, Notification};
use tracing::{info, warn};

use crate::queue::{priority, Dispatch, SyncEventHandler};
use crate::SyncError;

/// Forwards [`QueueEvent::InteractionNeeded`] to the notification service
///
/// A failing notification backend is logged; the request is still consumed
/// so it cannot loop.
pub struct InteractionHandler {
    notifier: Arc<dyn INotificationService>,
}

impl InteractionHandler {
    pub fn new(notifier: Arc<dyn INotificationService>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl SyncEventHandler for InteractionHandler {
    fn name(&self) -> &'static str {
        "interaction"
    }

    fn priority(&self) -> i32 {
        priority::INTERACTION
    }

    async fn handle(&self, event: QueueEvent) -> Result<Dispatch, SyncError> {
        let QueueEvent::InteractionNeeded(request) = event else {
            return Ok(Dispatch::NotHandled(event));
        };

        let notification = Notification::from(&request.detail);
        if let Err(err) = self.notifier.notify(&notification).await {
            warn!(title = %notification.title, error = %format!("{err:#}"), "Failed to notify user");
        }
        Ok(Dispatch::Handled)
    }
}

/// Latches full-sync requests for the component that runs full crawls
#[derive(Debug, Clone, Default)]
pub struct FullSyncRequests {
    requested: Arc<AtomicBool>,
}

impl FullSyncRequests {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }

    /// Returns whether a request was pending and clears it
    pub fn take(&self) -> bool {
        self.requested.swap(false, Ordering::SeqCst)
    }
}

#[async_trait]
impl SyncEventHandler for FullSyncRequests {
    fn name(&self) -> &'static str {
        "full_sync_requests"
    }

    fn priority(&self) -> i32 {
        priority::FULL_SYNC
    }

    async fn handle(&self, event: QueueEvent) -> Result<Dispatch, SyncError> {
        match event {
            QueueEvent::StartNextSync { full_sync: true } => {
                if !self.requested.swap(true, Ordering::SeqCst) {
                    info!("Full synchronization requested");
                }
                Ok(Dispatch::Handled)
            }
            other => Ok(Dispatch::NotHandled(other)),
        }
    }
}
