//! Event queue and the single drain loop of a synchronized tree
//!
//! Producers (watcher scheduler, poll timer, handlers themselves) only push
//! [`QueueEvent`]s. The [`EventLoop`] pops them one at a time and offers each
//! to the registered [`SyncEventHandler`]s in descending priority order until
//! one of them consumes it.
//!
//! ## Design Notes
//!
//! - Exactly one loop runs per tree, so handlers never race on the metadata
//!   store.
//! - A handler that cannot deal with an event hands it back through
//!   [`Dispatch::NotHandled`] so ownership (and the boxed sync event's
//!   identity) is preserved for the next handler.
//! - Handler errors are logged and the loop keeps draining.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cmisync_core::domain::QueueEvent;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::SyncError;

/// Handler priorities, highest first
pub mod priority {
    pub const FILTER: i32 = 1000;
    pub const LOCAL_TRANSFORMER: i32 = 500;
    pub const REMOTE_POLLER: i32 = 400;
    pub const MECHANISM: i32 = 100;
    pub const INTERACTION: i32 = 50;
    pub const FULL_SYNC: i32 = 10;
}

// ============================================================================
// EventQueue
// ============================================================================

/// Cloneable producer side of the queue
#[derive(Debug, Clone)]
pub struct EventQueue {
    tx: mpsc::UnboundedSender<QueueEvent>,
}

impl EventQueue {
    /// Creates a queue and the receiver an [`EventLoop`] drains
    pub fn new() -> (Self, mpsc::UnboundedReceiver<QueueEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Appends an event; a closed queue only logs
    pub fn push(&self, event: QueueEvent) {
        let name = event.name();
        if self.tx.send(event).is_err() {
            warn!(event = name, "Event queue closed, dropping event");
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

// ============================================================================
// SyncEventHandler
// ============================================================================

/// Result of offering an event to a handler
#[derive(Debug)]
pub enum Dispatch {
    /// The handler consumed the event
    Handled,
    /// The handler passes the event on, unchanged
    NotHandled(QueueEvent),
}

/// A component registered on the drain loop
#[async_trait]
pub trait SyncEventHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Higher priorities see events first
    fn priority(&self) -> i32;

    /// Consumes the event or hands it back
    ///
    /// # Errors
    /// An error means the event was consumed but could not be processed.
    async fn handle(&self, event: QueueEvent) -> Result<Dispatch, SyncError>;
}

// ============================================================================
// EventLoop
// ============================================================================

/// Sequential consumer of one tree's queue
pub struct EventLoop {
    rx: mpsc::UnboundedReceiver<QueueEvent>,
    handlers: Vec<Arc<dyn SyncEventHandler>>,
    shutdown: CancellationToken,
}

impl EventLoop {
    pub fn new(rx: mpsc::UnboundedReceiver<QueueEvent>, shutdown: CancellationToken) -> Self {
        Self {
            rx,
            handlers: Vec::new(),
            shutdown,
        }
    }

    /// Registers a handler, keeping the list sorted by descending priority
    ///
    /// Handlers with equal priority keep their registration order.
    pub fn add_handler(&mut self, handler: Arc<dyn SyncEventHandler>) {
        debug!(handler = handler.name(), priority = handler.priority(), "Registering handler");
        self.handlers.push(handler);
        self.handlers.sort_by_key(|h| std::cmp::Reverse(h.priority()));
    }

    pub fn handler_names(&self) -> Vec<&'static str> {
        self.handlers.iter().map(|h| h.name()).collect()
    }

    /// Offers one event to the handlers
    ///
    /// Returns whether any handler consumed it.
    ///
    /// # Errors
    /// Returns the error of the handler that consumed the event.
    pub async fn dispatch(&self, event: QueueEvent) -> Result<bool, SyncError> {
        let mut event = event;
        for handler in &self.handlers {
            match handler.handle(event).await? {
                Dispatch::Handled => return Ok(true),
                Dispatch::NotHandled(returned) => event = returned,
            }
        }
        debug!(event = event.name(), "No handler consumed event");
        Ok(false)
    }

    /// Drains the queue until cancellation or until every producer is gone
    pub async fn run(mut self) {
        info!(handlers = self.handlers.len(), "Event loop starting");

        loop {
            let event = tokio::select! {
                biased;
                _ = self.shutdown.cancelled() => {
                    info!("Shutdown signal received");
                    break;
                }
                event = self.rx.recv() => match event {
                    Some(event) => event,
                    None => {
                        info!("Event queue closed");
                        break;
                    }
                },
            };

            let name = event.name();
            if let Err(e) = self.dispatch(event).await {
                error!(event = name, error = %e, "Event handling failed");
            }
        }

        info!("Event loop stopped");
    }
}

/// Spawns the timer that triggers remote polls every `interval`
pub fn spawn_poll_timer(
    queue: EventQueue,
    interval: Duration,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // The first tick fires immediately; the initial sync is requested separately
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = ticker.tick() => queue.push(QueueEvent::StartNextSync { full_sync: false }),
                _ = shutdown.cancelled() => break,
            }
            if queue.is_closed() {
                break;
            }
        }
        debug!("Poll timer stopped");
    })
}
