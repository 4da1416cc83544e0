//! Event Bus - distribution of pool lifecycle events
//!
//! The coordinator, the physical pools and the deployers publish
//! [`PoolEvent`]s here; any number of consumers (daemon audit log, admin
//! tooling, tests) subscribe and each receive every event emitted after they
//! subscribed.
//!
//! # Usage
//!
//! ```ignore
//! let event_bus = EventBus::new();
//! let sender = event_bus.sender();
//! let mut audit = event_bus.subscribe();
//!
//! sender.emit(PoolEvent::PoolDeployed { ... });
//!
//! while let Some(event) = audit.recv().await { ... }
//! ```

use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::PoolEvent;

/// Default channel capacity for the event bus
pub const DEFAULT_CAPACITY: usize = 256;

/// Central hub for pool event distribution
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Get a sender for emitting events
    ///
    /// The sender can be cloned and shared across tasks.
    pub fn sender(&self) -> EventSender {
        EventSender::new(self.sender.clone())
    }

    /// Subscribe to receive events emitted from now on
    pub fn subscribe(&self) -> EventReceiver {
        EventReceiver::new(self.sender.subscribe())
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Used by pools and the coordinator to emit events
#[derive(Clone)]
pub struct EventSender {
    sender: broadcast::Sender<PoolEvent>,
}

impl EventSender {
    fn new(sender: broadcast::Sender<PoolEvent>) -> Self {
        Self { sender }
    }

    /// Emit a pool event
    ///
    /// Returns the number of receivers that received the event.
    /// Returns 0 if there are no subscribers (not an error).
    pub fn emit(&self, event: PoolEvent) -> usize {
        let type_name = event.type_name();
        match self.sender.send(event) {
            Ok(count) => {
                debug!(
                    event_type = type_name,
                    receivers = count,
                    "[EventBus] Emitted event"
                );
                count
            }
            Err(_) => {
                debug!(event_type = type_name, "[EventBus] No receivers for event");
                0
            }
        }
    }

    /// Emit event and log if no receivers
    pub fn emit_or_warn(&self, event: PoolEvent) {
        let type_name = event.type_name();
        if self.emit(event) == 0 {
            warn!(
                event_type = type_name,
                "[EventBus] Event emitted but no receivers listening"
            );
        }
    }

    pub fn has_subscribers(&self) -> bool {
        self.sender.receiver_count() > 0
    }
}

/// Used by consumers to receive pool events
pub struct EventReceiver {
    receiver: broadcast::Receiver<PoolEvent>,
}

impl EventReceiver {
    fn new(receiver: broadcast::Receiver<PoolEvent>) -> Self {
        Self { receiver }
    }

    /// Receive the next event
    ///
    /// Returns `None` once every sender is gone. Lag is logged and skipped.
    pub async fn recv(&mut self) -> Option<PoolEvent> {
        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(
                        skipped_events = skipped,
                        "[EventBus] Receiver lagged, skipped {} events",
                        skipped
                    );
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!("[EventBus] Channel closed");
                    return None;
                }
            }
        }
    }

    /// Try to receive an event without blocking
    pub fn try_recv(&mut self) -> Option<PoolEvent> {
        match self.receiver.try_recv() {
            Ok(event) => Some(event),
            Err(broadcast::error::TryRecvError::Lagged(skipped)) => {
                warn!(
                    skipped_events = skipped,
                    "[EventBus] Receiver lagged on try_recv"
                );
                self.receiver.try_recv().ok()
            }
            Err(_) => None,
        }
    }

    /// Drain everything currently buffered
    pub fn drain(&mut self) -> Vec<PoolEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.try_recv() {
            events.push(event);
        }
        events
    }
}

/// Shared event bus for process-wide use
pub type SharedEventBus = Arc<EventBus>;

pub fn create_shared_event_bus() -> SharedEventBus {
    Arc::new(EventBus::new())
}
