// ABOUTME: Supporting types for gateway client operations: bind credentials and message payloads
// ABOUTME: Provides the outbound/inbound message shapes and the acknowledgment detail carried by events

use crate::datatypes::{CommandStatus, InterfaceVersion};
use serde::{Deserialize, Serialize};

/// SMPP bind operation credentials
///
/// Contains authentication information and bind type for establishing
/// one link with the SMSC.
#[derive(Debug, Clone)]
pub struct BindCredentials {
    /// System identifier for authentication
    pub system_id: String,
    /// Password for authentication
    pub password: String,
    /// System type (optional, sent empty when absent)
    pub system_type: Option<String>,
    /// Type of bind operation to perform
    pub bind_type: BindType,
    /// SMPP interface version to use
    pub interface_version: InterfaceVersion,
}

impl BindCredentials {
    pub fn new(
        bind_type: BindType,
        system_id: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            system_id: system_id.into(),
            password: password.into(),
            system_type: None,
            bind_type,
            interface_version: InterfaceVersion::SmppV34,
        }
    }

    /// Create new bind credentials for transmitter session
    pub fn transmitter(system_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(BindType::Transmitter, system_id, password)
    }

    /// Create new bind credentials for receiver session
    pub fn receiver(system_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(BindType::Receiver, system_id, password)
    }

    /// Create new bind credentials for transceiver session
    pub fn transceiver(system_id: impl Into<String>, password: impl Into<String>) -> Self {
        Self::new(BindType::Transceiver, system_id, password)
    }

    /// Set system type
    pub fn with_system_type(mut self, system_type: impl Into<String>) -> Self {
        self.system_type = Some(system_type.into());
        self
    }
}

/// Type of SMPP bind operation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BindType {
    /// Bind as transmitter (can send submit_sm)
    Transmitter,
    /// Bind as receiver (can receive deliver_sm)
    Receiver,
    /// Bind as transceiver (both transmitter and receiver capabilities)
    Transceiver,
}

impl BindType {
    pub fn can_send(&self) -> bool {
        matches!(self, BindType::Transmitter | BindType::Transceiver)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BindType::Transmitter => "transmitter",
            BindType::Receiver => "receiver",
            BindType::Transceiver => "transceiver",
        }
    }
}

/// One message to deliver to a handset.
///
/// `id` is the unit the unacknowledged window tracks, however many parts
/// the text is split into. The queue payload names the destination `phone`
/// and the text `message`; both spellings are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub id: String,
    pub sender: String,
    #[serde(alias = "phone")]
    pub destination: String,
    #[serde(alias = "message")]
    pub text: String,
}

impl OutboundMessage {
    pub fn new(
        id: impl Into<String>,
        sender: impl Into<String>,
        destination: impl Into<String>,
        text: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            sender: sender.into(),
            destination: destination.into(),
            text: text.into(),
        }
    }
}

/// A unit of work handed to the gateway: the message plus the connection it
/// must leave through.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InboundMessage {
    pub connection_id: String,
    pub message: OutboundMessage,
}

/// The SMSC's answer to one submitted part.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitAck {
    pub sequence_number: u32,
    pub command_status: CommandStatus,
    /// SMSC-assigned message id; empty when the part was rejected.
    pub message_id: String,
}

impl SubmitAck {
    pub fn is_ok(&self) -> bool {
        self.command_status.is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outbound_message_accepts_queue_field_names() {
        let json = r#"{"id":"m1","sender":"ACME","phone":"447700900123","message":"hi"}"#;
        let message: OutboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(
            message,
            OutboundMessage::new("m1", "ACME", "447700900123", "hi")
        );
    }

    #[test]
    fn inbound_message_from_json_line() {
        let json = r#"{"connection_id":"c1","message":{"id":"m2","sender":"ACME","destination":"1","text":"x"}}"#;
        let inbound: InboundMessage = serde_json::from_str(json).unwrap();
        assert_eq!(inbound.connection_id, "c1");
        assert_eq!(inbound.message.destination, "1");
    }

    #[test]
    fn bind_type_capabilities() {
        assert!(BindType::Transceiver.can_send());
        assert!(BindType::Transmitter.can_send());
        assert!(!BindType::Receiver.can_send());

        let credentials = BindCredentials::receiver("id", "pw").with_system_type("VMA");
        assert_eq!(credentials.bind_type, BindType::Receiver);
        assert_eq!(credentials.system_type.as_deref(), Some("VMA"));
    }
}
