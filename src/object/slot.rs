//! Per-event delivery slots.

use tokio::sync::{mpsc, Mutex};

/// Queue that hands decoded events of one kind to application code.
///
/// Publishing never blocks: the dispatch loop must not stall on a consumer
/// that is slow to read an unrelated object's events. Each published value
/// is received by exactly one consumer.
pub struct EventSlot<T> {
    tx: mpsc::UnboundedSender<T>,
    rx: Mutex<mpsc::UnboundedReceiver<T>>,
}

impl<T: Send> EventSlot<T> {
    /// Create an empty slot.
    pub fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self {
            tx,
            rx: Mutex::new(rx),
        }
    }

    /// Hand a value to the next waiting (or future) consumer.
    pub fn publish(&self, value: T) {
        // The receiver lives as long as the slot, so this cannot fail.
        let _ = self.tx.send(value);
    }

    /// Wait for the next value.
    ///
    /// Returns `None` only if the slot is being torn down. Callers needing a
    /// bounded wait wrap this in `tokio::time::timeout`.
    pub async fn recv(&self) -> Option<T> {
        self.rx.lock().await.recv().await
    }

    /// Take the next value if one is already queued.
    pub fn try_recv(&self) -> Option<T> {
        self.rx.try_lock().ok()?.try_recv().ok()
    }
}

impl<T: Send> Default for EventSlot<T> {
    fn default() -> Self {
        Self::new()
    }
}
