//! Broadcast Synchronizer
//!
//! Best-effort fan-out to connected observers. An observer that cannot be
//! reached is dropped from the registry; the others still get the event.

use thiserror::Error;
use tokio::sync::mpsc;

use crate::events::ShelfEvent;

/// Observer registry key
pub type ObserverId = u64;

/// The observer's connection is gone
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
#[error("Observer disconnected")]
pub struct ObserverGone;

/// A connected real-time viewer
pub trait Observer: Send {
    /// Hand one serialized event to the observer without blocking
    fn deliver(&self, message: &str) -> Result<(), ObserverGone>;
}

/// Observer backed by an unbounded channel (one per WebSocket client)
#[derive(Debug, Clone)]
pub struct ChannelObserver {
    tx: mpsc::UnboundedSender<String>,
}

impl ChannelObserver {
    pub fn new(tx: mpsc::UnboundedSender<String>) -> Self {
        Self { tx }
    }

    /// Observer plus the receiving end for the connection task
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<String>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }
}

impl Observer for ChannelObserver {
    fn deliver(&self, message: &str) -> Result<(), ObserverGone> {
        self.tx.send(message.to_string()).map_err(|_| ObserverGone)
    }
}

/// Broadcast Synchronizer
#[derive(Default)]
pub struct Broadcaster {
    observers: Vec<(ObserverId, Box<dyn Observer>)>,
    next_id: ObserverId,
}

impl Broadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an observer, delivering `initial` to it first.
    ///
    /// Returns `None` if the observer is already unreachable.
    pub fn register(&mut self, observer: Box<dyn Observer>, initial: &ShelfEvent) -> Option<ObserverId> {
        let message = match initial.to_message() {
            Ok(message) => message,
            Err(e) => {
                log::error!("[Broadcast] Failed to serialize {}: {}", initial.kind(), e);
                return None;
            }
        };
        if observer.deliver(&message).is_err() {
            log::warn!("[Broadcast] Observer disconnected before initial state");
            return None;
        }
        self.next_id += 1;
        let id = self.next_id;
        self.observers.push((id, observer));
        log::info!(
            "[Broadcast] Observer {} connected ({} total)",
            id,
            self.observers.len()
        );
        Some(id)
    }

    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.observers.len();
        self.observers.retain(|(observer_id, _)| *observer_id != id);
        let removed = self.observers.len() < before;
        if removed {
            log::info!(
                "[Broadcast] Observer {} disconnected ({} total)",
                id,
                self.observers.len()
            );
        }
        removed
    }

    /// Deliver an event to every observer; returns how many received it
    pub fn broadcast(&mut self, event: &ShelfEvent) -> usize {
        let message = match event.to_message() {
            Ok(message) => message,
            Err(e) => {
                log::error!("[Broadcast] Failed to serialize {}: {}", event.kind(), e);
                return 0;
            }
        };

        let before = self.observers.len();
        self.observers.retain(|(id, observer)| match observer.deliver(&message) {
            Ok(()) => true,
            Err(ObserverGone) => {
                log::info!("[Broadcast] Dropping unreachable observer {}", id);
                false
            }
        });
        let delivered = self.observers.len();
        log::debug!(
            "[Broadcast] {} delivered to {}/{} observers",
            event.kind(),
            delivered,
            before
        );
        delivered
    }

    pub fn len(&self) -> usize {
        self.observers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observers.is_empty()
    }
}
