//! Change scheduler - turns raw watcher output into settled queue events
//!
//! The [`ChangeScheduler`] sits between the [`FileWatcher`](super::watcher::FileWatcher)
//! and the [`EventQueue`]. It feeds raw [`FsChange`]s through a
//! [`DebouncedChangeQueue`] and forwards each settled change as a
//! [`QueueEvent::Fs`].
//!
//! ## Flow
//!
//! ```text
//! FileWatcher ──→ mpsc::UnboundedReceiver ──→ ChangeScheduler ──→ EventQueue
//!                                                  │
//!                                          DebouncedChangeQueue
//! ```
//!
//! The scheduler never reads the metadata store. It only re-stats settled
//! paths to fill in the directory flag the OS notification did not carry.

use std::time::Duration;

use cmisync_core::domain::{FsChange, FsChangeKind, QueueEvent};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::queue::EventQueue;
use crate::watcher::DebouncedChangeQueue;

/// Debounces raw filesystem changes and enqueues the settled ones
pub struct ChangeScheduler {
    change_rx: mpsc::UnboundedReceiver<FsChange>,
    pending: DebouncedChangeQueue,
    queue: EventQueue,
    /// How often the debounced queue is checked for settled changes
    poll_interval: Duration,
}

impl ChangeScheduler {
    /// Creates a new `ChangeScheduler`
    ///
    /// # Arguments
    /// * `change_rx` - Receiver fed by the file watcher
    /// * `queue` - Event queue settled changes are pushed to
    /// * `debounce_delay` - How long a path must be quiet before it is forwarded
    pub fn new(
        change_rx: mpsc::UnboundedReceiver<FsChange>,
        queue: EventQueue,
        debounce_delay: Duration,
    ) -> Self {
        let poll_interval = (debounce_delay / 2).max(Duration::from_millis(10));
        info!(
            debounce_ms = debounce_delay.as_millis() as u64,
            poll_ms = poll_interval.as_millis() as u64,
            "Creating change scheduler"
        );

        Self {
            change_rx,
            pending: DebouncedChangeQueue::new(debounce_delay),
            queue,
            poll_interval,
        }
    }

    /// Main loop of the scheduler
    ///
    /// Stops on cancellation or when the watcher side of the channel closes.
    /// In the latter case pending changes are flushed without waiting for
    /// them to settle.
    pub async fn run(mut self, shutdown: CancellationToken) {
        info!("Change scheduler starting");
        let mut poll_timer = tokio::time::interval(self.poll_interval);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }

                change = self.change_rx.recv() => match change {
                    Some(change) => self.pending.push(change),
                    None => {
                        info!("Change channel closed, flushing pending changes");
                        let remaining = self.pending.drain();
                        self.forward(remaining).await;
                        break;
                    }
                },

                _ = poll_timer.tick() => {
                    let settled = self.pending.poll();
                    self.forward(settled).await;
                }
            }
        }

        info!("Change scheduler stopped");
    }

    async fn forward(&self, changes: Vec<FsChange>) {
        if changes.is_empty() {
            return;
        }
        info!(count = changes.len(), "Settled local changes ready");

        for mut change in changes {
            if change.kind != FsChangeKind::Deleted {
                if let Ok(metadata) = tokio::fs::metadata(&change.path).await {
                    change.is_dir = metadata.is_dir();
                }
            }
            debug!(path = %change.path.display(), kind = ?change.kind, is_dir = change.is_dir, "Settled");
            self.queue.push(QueueEvent::Fs(change));
        }
    }
}
