// ABOUTME: Gateway client error types covering bind, submit, registry and transport failures
// ABOUTME: Provides structured error reporting with automatic conversion from I/O and codec errors

use crate::codec::{CodecError, Frame};
use crate::datatypes::CommandStatus;
use std::io;
use thiserror::Error;

/// Error type for gateway client operations
///
/// Protocol-level outcomes of a submission (negative acknowledgment, expiry)
/// are reported as events, not as errors; an `SmppError` is what a caller of
/// `connect`, `send` or `find_or_create` sees.
#[derive(Debug, Error)]
pub enum SmppError {
    /// I/O error during network operations (connection, read, write)
    #[error("Connection error: {0}")]
    Connection(#[from] io::Error),

    /// Malformed or unencodable PDU
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// No bind response arrived within the bind deadline
    #[error("Bind timeout")]
    BindTimeout,

    /// The SMSC answered with a non-zero command_status
    #[error("Protocol error: {status}")]
    ProtocolStatus {
        status: CommandStatus,
        response: Box<Frame>,
    },

    /// The connection id failed recently and is quarantined
    #[error("Connection {0} is cached as broken")]
    BrokenConnection(String),

    /// The profile names a bind mode this client does not support
    #[error("Invalid connection mode: {mode} for connection with id: {connection_id}")]
    InvalidMode { connection_id: String, mode: String },

    /// No profile is configured for the connection id
    #[error("Unknown connection id: {0}")]
    UnknownConnection(String),

    /// The registry is draining and accepts no new work
    #[error("Registry is shutting down")]
    ShuttingDown,

    /// Operation timeout
    #[error("Operation timeout")]
    Timeout,

    /// Unexpected PDU received (wrong response type for request)
    #[error("Unexpected PDU: expected {expected}, got {actual}")]
    UnexpectedPdu { expected: String, actual: String },

    /// Connection closed unexpectedly
    #[error("Connection closed unexpectedly")]
    ConnectionClosed,

    /// Session not in correct state for operation
    #[error("Invalid session state: {0}")]
    InvalidState(String),
}

impl SmppError {
    /// Status carried by a protocol error, if any.
    pub fn command_status(&self) -> Option<CommandStatus> {
        match self {
            SmppError::ProtocolStatus { status, .. } => Some(*status),
            _ => None,
        }
    }
}

/// Result type alias for gateway operations
pub type SmppResult<T> = Result<T, SmppError>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::BindTransceiverResponse;

    #[test]
    fn protocol_status_display_names_the_status() {
        let err = SmppError::ProtocolStatus {
            status: CommandStatus::InvalidPassword,
            response: Box::new(Frame::BindTransceiverResp(BindTransceiverResponse::error(
                1,
                CommandStatus::InvalidPassword,
            ))),
        };
        assert_eq!(err.to_string(), "Protocol error: InvalidPassword (0x0000000e)");
        assert_eq!(err.command_status(), Some(CommandStatus::InvalidPassword));
    }

    #[test]
    fn invalid_mode_display() {
        let err = SmppError::InvalidMode {
            connection_id: "c1".into(),
            mode: "rx_only".into(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid connection mode: rx_only for connection with id: c1"
        );
        assert_eq!(err.command_status(), None);
    }
}
