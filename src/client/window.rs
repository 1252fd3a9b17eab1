// ABOUTME: Tracks messages awaiting submit_sm_resp per connection and enforces the window size
// ABOUTME: Each tracked message owns an expiry timer that fires independently of capacity

use crate::client::types::OutboundMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::debug;

struct Entry {
    message: OutboundMessage,
    expiry: JoinHandle<()>,
}

/// Outstanding messages of one connection, keyed by message id.
///
/// Without a window size (or with a size of zero) the window is inert:
/// nothing is tracked and `await_capacity` returns at once.
pub struct UnackedWindow {
    connection_id: String,
    capacity: Option<usize>,
    expiry: Duration,
    entries: Mutex<HashMap<String, Entry>>,
    released: Notify,
}

impl UnackedWindow {
    pub fn new(connection_id: impl Into<String>, capacity: Option<usize>, expiry: Duration) -> Self {
        Self {
            connection_id: connection_id.into(),
            capacity: capacity.filter(|&size| size > 0),
            expiry,
            entries: Mutex::new(HashMap::new()),
            released: Notify::new(),
        }
    }

    pub fn capacity(&self) -> Option<usize> {
        self.capacity
    }

    /// Track `message` and (re-)arm its expiry timer.
    ///
    /// When the timer fires `on_expired` is called with the connection id and
    /// the message. The entry is left in place; whoever handles the expiry
    /// decides whether to `release` it.
    pub fn admit<F>(&self, message: OutboundMessage, on_expired: F)
    where
        F: FnOnce(String, OutboundMessage) + Send + 'static,
    {
        if self.capacity.is_none() {
            return;
        }

        let connection_id = self.connection_id.clone();
        let expired = message.clone();
        let expiry = self.expiry;
        let timer = tokio::spawn(async move {
            tokio::time::sleep(expiry).await;
            debug!(connection_id = %connection_id, "Message {} expired unacknowledged", expired.id);
            on_expired(connection_id, expired);
        });

        let previous = self.entries.lock().insert(
            message.id.clone(),
            Entry {
                message,
                expiry: timer,
            },
        );
        if let Some(previous) = previous {
            previous.expiry.abort();
        }
    }

    /// Stop tracking `message_id`. Unknown ids are ignored.
    pub fn release(&self, message_id: &str) {
        let removed = self.entries.lock().remove(message_id);
        if let Some(entry) = removed {
            entry.expiry.abort();
            self.released.notify_waiters();
        }
    }

    /// Wait until fewer than `capacity` messages are outstanding.
    pub async fn await_capacity(&self) {
        let Some(capacity) = self.capacity else {
            return;
        };

        loop {
            // Register before checking so a release between the check and the
            // await is not missed.
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.entries.lock().len() < capacity {
                return;
            }
            notified.await;
        }
    }

    /// Drop every entry and cancel every timer.
    pub fn clear(&self) {
        let drained: Vec<Entry> = self.entries.lock().drain().map(|(_, entry)| entry).collect();
        for entry in &drained {
            entry.expiry.abort();
        }
        self.released.notify_waiters();
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, message_id: &str) -> bool {
        self.entries.lock().contains_key(message_id)
    }

    /// Messages currently outstanding, in no particular order.
    pub fn outstanding(&self) -> Vec<OutboundMessage> {
        self.entries
            .lock()
            .values()
            .map(|entry| entry.message.clone())
            .collect()
    }
}

impl Drop for UnackedWindow {
    fn drop(&mut self) {
        for entry in self.entries.get_mut().values() {
            entry.expiry.abort();
        }
    }
}

impl std::fmt::Debug for UnackedWindow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnackedWindow")
            .field("connection_id", &self.connection_id)
            .field("capacity", &self.capacity)
            .field("outstanding", &self.len())
            .finish()
    }
}
