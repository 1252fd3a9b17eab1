// ABOUTME: Typed gateway events published on a broadcast channel shared by sessions and the registry
// ABOUTME: Publishing never blocks; lagging subscribers lose the oldest events

use crate::client::types::{OutboundMessage, SubmitAck};
use crate::datatypes::DeliverSm;
use tokio::sync::broadcast;
use tracing::trace;

const DEFAULT_CAPACITY: usize = 1024;

/// Everything a session reports to the outside world.
#[derive(Debug, Clone)]
pub enum GatewayEvent {
    /// All links of the session are bound
    Connected { connection_id: String },
    /// A link failed after binding; the session is being closed
    Error { connection_id: String, error: String },
    /// The session finished closing
    Closed { connection_id: String },
    /// A part of `message` was accepted by the SMSC
    SendSuccess {
        connection_id: String,
        message: OutboundMessage,
        ack: SubmitAck,
    },
    /// A part of `message` was rejected; the session is being closed
    SendFailure {
        connection_id: String,
        message: OutboundMessage,
        ack: SubmitAck,
    },
    /// `message` stayed unacknowledged past the expiry period
    SendExpired {
        connection_id: String,
        message: OutboundMessage,
    },
    /// A deliver_sm (usually a delivery receipt), forwarded verbatim
    DeliveryReceipt {
        connection_id: String,
        pdu: Box<DeliverSm>,
    },
}

impl GatewayEvent {
    pub fn connection_id(&self) -> &str {
        match self {
            GatewayEvent::Connected { connection_id }
            | GatewayEvent::Error { connection_id, .. }
            | GatewayEvent::Closed { connection_id }
            | GatewayEvent::SendSuccess { connection_id, .. }
            | GatewayEvent::SendFailure { connection_id, .. }
            | GatewayEvent::SendExpired { connection_id, .. }
            | GatewayEvent::DeliveryReceipt { connection_id, .. } => connection_id,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            GatewayEvent::Connected { .. } => "connected",
            GatewayEvent::Error { .. } => "error",
            GatewayEvent::Closed { .. } => "closed",
            GatewayEvent::SendSuccess { .. } => "send_success",
            GatewayEvent::SendFailure { .. } => "send_failure",
            GatewayEvent::SendExpired { .. } => "send_expired",
            GatewayEvent::DeliveryReceipt { .. } => "delivery_receipt",
        }
    }
}

/// Cloneable handle to the gateway's event channel.
#[derive(Debug, Clone)]
pub struct EventBus {
    tx: broadcast::Sender<GatewayEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Publish to every current subscriber. Returns how many received it.
    pub fn publish(&self, event: GatewayEvent) -> usize {
        trace!(
            connection_id = %event.connection_id(),
            "Publishing {} event",
            event.name()
        );
        self.tx.send(event).unwrap_or(0)
    }

    /// Receive every event published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
