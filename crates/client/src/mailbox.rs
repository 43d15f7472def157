//! Single-slot mailbox: last write wins while the consumer is busy

use parking_lot::Mutex;
use tokio::sync::Notify;

/// Holds at most one pending item
///
/// Posting while an item is already waiting replaces it, so a busy consumer
/// only ever sees the most recent item once it comes back.
#[derive(Debug)]
pub struct Mailbox<T> {
    slot: Mutex<Option<T>>,
    notify: Notify,
}

impl<T> Mailbox<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            notify: Notify::new(),
        }
    }

    /// Store `item`, returning the item it displaced, if any
    pub fn post(&self, item: T) -> Option<T> {
        let displaced = self.slot.lock().replace(item);
        self.notify.notify_one();
        displaced
    }

    pub fn take(&self) -> Option<T> {
        self.slot.lock().take()
    }

    pub fn is_empty(&self) -> bool {
        self.slot.lock().is_none()
    }

    /// Wait for the next item
    ///
    /// Cancel safe: an item is only removed when this future completes.
    pub async fn recv(&self) -> T {
        loop {
            if let Some(item) = self.take() {
                return item;
            }
            self.notify.notified().await;
        }
    }
}

impl<T> Default for Mailbox<T> {
    fn default() -> Self {
        Self::new()
    }
}
