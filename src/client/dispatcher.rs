// ABOUTME: Feeds inbound messages to the registry through one ordered queue per connection id
// ABOUTME: Messages for one connection leave in arrival order; a slow connection never blocks another

use crate::client::registry::ConnectionRegistry;
use crate::client::types::{InboundMessage, OutboundMessage};
use std::collections::HashMap;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tracing::{debug, error};

/// Ingestion front of the gateway.
///
/// Each connection id gets a worker task draining its own queue, so sends
/// through one connection are strictly sequential while different
/// connections proceed independently. Call [`Dispatcher::finish`] before
/// draining the registry so queued messages are not lost.
pub struct Dispatcher {
    registry: ConnectionRegistry,
    queues: HashMap<String, mpsc::UnboundedSender<OutboundMessage>>,
    workers: JoinSet<()>,
}

impl Dispatcher {
    pub fn new(registry: ConnectionRegistry) -> Self {
        Self {
            registry,
            queues: HashMap::new(),
            workers: JoinSet::new(),
        }
    }

    /// Queue `inbound` behind earlier messages for the same connection.
    pub fn submit(&mut self, inbound: InboundMessage) {
        let InboundMessage {
            connection_id,
            message,
        } = inbound;

        let Dispatcher {
            registry,
            queues,
            workers,
        } = self;
        let queue = queues.entry(connection_id.clone()).or_insert_with(|| {
            debug!(connection_id = %connection_id, "Starting delivery worker");
            let (tx, rx) = mpsc::unbounded_channel();
            workers.spawn(deliver(registry.clone(), connection_id.clone(), rx));
            tx
        });
        if let Err(unsent) = queue.send(message) {
            error!(connection_id = %connection_id, "Message {} not queued", unsent.0.id);
        }
    }

    /// Number of connections with a delivery worker
    pub fn connections(&self) -> usize {
        self.queues.len()
    }

    /// Close every queue and wait until the workers have sent what was queued.
    pub async fn finish(self) {
        let Dispatcher {
            queues,
            mut workers,
            ..
        } = self;
        drop(queues);

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!("Delivery worker failed: {}", e);
            }
        }
    }
}

async fn deliver(
    registry: ConnectionRegistry,
    connection_id: String,
    mut queue: mpsc::UnboundedReceiver<OutboundMessage>,
) {
    while let Some(message) = queue.recv().await {
        let message_id = message.id.clone();
        let inbound = InboundMessage {
            connection_id: connection_id.clone(),
            message,
        };
        if let Err(e) = registry.send(inbound).await {
            error!(connection_id = %connection_id, "Message {} not sent: {}", message_id, e);
        }
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("connections", &self.connections())
            .field("workers", &self.workers.len())
            .finish()
    }
}
