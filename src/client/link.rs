// ABOUTME: One TCP connection to an SMSC bound with a single capability (transmitter, receiver, transceiver)
// ABOUTME: Owns the read loop that correlates responses by sequence number and the keep-alive task

use crate::client::builder::SessionOptions;
use crate::client::error::{SmppError, SmppResult};
use crate::client::keepalive;
use crate::client::profile::ConnectionProfile;
use crate::client::types::{BindCredentials, BindType, OutboundMessage, SubmitAck};
use crate::codec::{CodecError, Frame};
use crate::connection::{Connection, FrameReader, FrameWriter};
use crate::datatypes::{
    BindReceiver, BindTransceiver, BindTransmitter, CommandId, CommandStatus, DeliverSm,
    DeliverSmResponse, EnquireLink, EnquireLinkResponse, GenericNack, SubmitSm, Unbind,
    UnbindResponse,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;
use tokio::io::{ReadHalf, WriteHalf};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Largest sequence number before wrapping back to 1
const MAX_SEQUENCE_NUMBER: u32 = 0x7FFF_FFFF;

/// Sequence number of the bind request; everything after starts at 2
const BIND_SEQUENCE_NUMBER: u32 = 1;

/// What a link reports to the session that owns it.
#[derive(Debug)]
pub(crate) enum LinkEvent {
    /// submit_sm_resp, or generic_nack, for a submitted part
    SubmitResponse {
        message: OutboundMessage,
        ack: SubmitAck,
    },
    /// deliver_sm received and already answered
    Delivered(Box<DeliverSm>),
    /// The SMSC unbound the link; unbind_resp was sent
    PeerUnbound,
    /// Read error, EOF or keep-alive failure
    Failed(String),
}

enum Pending {
    Reply(oneshot::Sender<Frame>),
    Submit(OutboundMessage),
}

struct LinkShared {
    connection_id: String,
    bind_type: BindType,
    writer: tokio::sync::Mutex<FrameWriter<WriteHalf<TcpStream>>>,
    sequence: AtomicU32,
    pending: Mutex<HashMap<u32, Pending>>,
    closing: AtomicBool,
    peer_unbound: AtomicBool,
}

/// Removes a request's pending entry however the wait ends.
struct PendingGuard<'a> {
    shared: &'a LinkShared,
    sequence_number: u32,
}

impl Drop for PendingGuard<'_> {
    fn drop(&mut self) {
        self.shared.pending.lock().remove(&self.sequence_number);
    }
}

impl LinkShared {
    fn next_sequence(&self) -> u32 {
        self.sequence
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| {
                Some(if n >= MAX_SEQUENCE_NUMBER { 1 } else { n + 1 })
            })
            .unwrap_or_else(|n| n)
    }

    async fn write(&self, frame: &Frame) -> SmppResult<()> {
        self.writer
            .lock()
            .await
            .write_frame(frame)
            .await
            .map_err(|e| match e {
                CodecError::Io(io) => SmppError::Connection(io),
                other => SmppError::Codec(other),
            })
    }

    /// Send a request and wait for the response carrying its sequence number.
    /// Callers bound the wait with a timeout.
    async fn request(&self, frame: Frame) -> SmppResult<Frame> {
        let sequence_number = frame.sequence_number();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .insert(sequence_number, Pending::Reply(tx));
        let _guard = PendingGuard {
            shared: self,
            sequence_number,
        };

        self.write(&frame).await?;
        rx.await.map_err(|_| SmppError::ConnectionClosed)
    }

    async fn enquire_link(&self) -> SmppResult<()> {
        let request = Frame::EnquireLink(EnquireLink::new(self.next_sequence()));
        let response = self.request(request).await?;
        if response.command_status().is_ok() {
            Ok(())
        } else {
            Err(SmppError::ProtocolStatus {
                status: response.command_status(),
                response: Box::new(response),
            })
        }
    }

    fn take_pending(&self, sequence_number: u32) -> Option<Pending> {
        self.pending.lock().remove(&sequence_number)
    }

    /// Handle one inbound PDU.
    async fn dispatch(&self, frame: Frame, events: &mpsc::UnboundedSender<LinkEvent>) -> SmppResult<()> {
        let sequence_number = frame.sequence_number();

        match frame {
            Frame::SubmitSmResp(resp) => match self.take_pending(sequence_number) {
                Some(Pending::Submit(message)) => {
                    let ack = SubmitAck {
                        sequence_number,
                        command_status: resp.command_status,
                        message_id: resp.message_id,
                    };
                    let _ = events.send(LinkEvent::SubmitResponse { message, ack });
                }
                Some(Pending::Reply(tx)) => {
                    let _ = tx.send(Frame::SubmitSmResp(resp));
                }
                None => warn!(
                    connection_id = %self.connection_id,
                    "Unsolicited submit_sm_resp (sequence {})", sequence_number
                ),
            },
            Frame::GenericNack(nack) => match self.take_pending(sequence_number) {
                Some(Pending::Submit(message)) => {
                    // A nack never means success, whatever status it carries
                    let command_status = if nack.command_status.is_ok() {
                        CommandStatus::UnknownError
                    } else {
                        nack.command_status
                    };
                    let ack = SubmitAck {
                        sequence_number,
                        command_status,
                        message_id: String::new(),
                    };
                    let _ = events.send(LinkEvent::SubmitResponse { message, ack });
                }
                Some(Pending::Reply(tx)) => {
                    let _ = tx.send(Frame::GenericNack(nack));
                }
                None => warn!(
                    connection_id = %self.connection_id,
                    "generic_nack {} for unknown sequence {}", nack.command_status, sequence_number
                ),
            },
            Frame::DeliverSm(pdu) => {
                self.write(&Frame::DeliverSmResp(DeliverSmResponse::new(sequence_number)))
                    .await?;
                let _ = events.send(LinkEvent::Delivered(pdu));
            }
            Frame::EnquireLink(_) => {
                self.write(&Frame::EnquireLinkResp(EnquireLinkResponse::new(
                    sequence_number,
                )))
                .await?;
            }
            Frame::Unbind(_) => {
                info!(connection_id = %self.connection_id, "SMSC unbound the {} link", self.bind_type.as_str());
                self.write(&Frame::UnbindResp(UnbindResponse::new(sequence_number)))
                    .await?;
                self.peer_unbound.store(true, Ordering::SeqCst);
                let _ = events.send(LinkEvent::PeerUnbound);
            }
            other if other.is_response() => match self.take_pending(sequence_number) {
                Some(Pending::Reply(tx)) => {
                    let _ = tx.send(other);
                }
                Some(Pending::Submit(message)) => {
                    warn!(
                        connection_id = %self.connection_id,
                        "{:?} answered submit_sm (sequence {})", other.command_id(), sequence_number
                    );
                    self.pending
                        .lock()
                        .insert(sequence_number, Pending::Submit(message));
                }
                None => debug!(
                    connection_id = %self.connection_id,
                    "Ignoring unsolicited {:?}", other.command_id()
                ),
            },
            // alert_notification has no response PDU
            other if other.command_id() == CommandId::AlertNotification => {
                debug!(connection_id = %self.connection_id, "Ignoring alert_notification");
            }
            other => {
                warn!(
                    connection_id = %self.connection_id,
                    "Rejecting unsupported request {:?}", other.command_id()
                );
                self.write(&Frame::GenericNack(GenericNack::invalid_command_id(
                    sequence_number,
                )))
                .await?;
            }
        }

        Ok(())
    }
}

/// A bound connection to the SMSC.
///
/// Dropping a link aborts its tasks and thereby closes the socket without an
/// unbind; `close` is the orderly path.
pub struct Link {
    shared: Arc<LinkShared>,
    smsc_system_id: String,
    reader: JoinHandle<()>,
    keep_alive: JoinHandle<()>,
}

impl Link {
    /// Connect to the profile's SMSC and bind with `bind_type`.
    ///
    /// Once bound, inbound traffic and keep-alive failures are reported on
    /// `events`.
    pub(crate) async fn open(
        profile: &ConnectionProfile,
        bind_type: BindType,
        options: &SessionOptions,
        events: mpsc::UnboundedSender<LinkEvent>,
    ) -> SmppResult<Link> {
        let address = profile.address();
        debug!(connection_id = %profile.id, "Connecting {} link to {}", bind_type.as_str(), address);

        let socket = tokio::time::timeout(options.connect_timeout, TcpStream::connect(&address))
            .await
            .map_err(|_| SmppError::Timeout)??;
        let mut connection = Connection::new(socket);

        let credentials = BindCredentials::new(bind_type, &profile.system_id, &profile.password);
        let smsc_system_id =
            tokio::time::timeout(options.bind_timeout, bind(&mut connection, &credentials))
                .await
                .map_err(|_| SmppError::BindTimeout)??;

        info!(
            connection_id = %profile.id,
            "Bound {} link to {} ({})",
            bind_type.as_str(),
            address,
            smsc_system_id
        );

        let (reader, writer) = connection.into_split();
        let shared = Arc::new(LinkShared {
            connection_id: profile.id.clone(),
            bind_type,
            writer: tokio::sync::Mutex::new(writer),
            sequence: AtomicU32::new(BIND_SEQUENCE_NUMBER + 1),
            pending: Mutex::new(HashMap::new()),
            closing: AtomicBool::new(false),
            peer_unbound: AtomicBool::new(false),
        });

        let reader = tokio::spawn(read_loop(shared.clone(), reader, events.clone()));

        let keep_alive = {
            let shared = shared.clone();
            let config = options.keep_alive.clone();
            tokio::spawn(async move {
                let status = keepalive::run(config, || {
                    let shared = shared.clone();
                    async move { shared.enquire_link().await }
                })
                .await;

                if !shared.closing.load(Ordering::SeqCst) {
                    let _ = events.send(LinkEvent::Failed(format!(
                        "{} consecutive enquire_link failures",
                        status.consecutive_failures
                    )));
                }
            })
        };

        Ok(Link {
            shared,
            smsc_system_id,
            reader,
            keep_alive,
        })
    }

    pub fn bind_type(&self) -> BindType {
        self.shared.bind_type
    }

    /// system_id the SMSC reported in its bind response
    pub fn smsc_system_id(&self) -> &str {
        &self.smsc_system_id
    }

    pub fn is_alive(&self) -> bool {
        !self.shared.closing.load(Ordering::SeqCst) && !self.reader.is_finished()
    }

    /// Write one submit_sm; its response is reported as
    /// `LinkEvent::SubmitResponse`. Returns the sequence number used.
    pub(crate) async fn submit(&self, mut pdu: SubmitSm, message: OutboundMessage) -> SmppResult<u32> {
        if !self.is_alive() {
            return Err(SmppError::ConnectionClosed);
        }

        let sequence_number = self.shared.next_sequence();
        pdu.sequence_number = sequence_number;
        self.shared
            .pending
            .lock()
            .insert(sequence_number, Pending::Submit(message));

        if let Err(e) = self.shared.write(&Frame::SubmitSm(Box::new(pdu))).await {
            self.shared.take_pending(sequence_number);
            return Err(e);
        }
        Ok(sequence_number)
    }

    /// Unbind (unless the SMSC already did or the socket is gone), then stop
    /// the tasks and shut the socket. Idempotent.
    pub(crate) async fn close(&self, unbind_timeout: Duration) {
        if self.shared.closing.swap(true, Ordering::SeqCst) {
            return;
        }

        if !self.shared.peer_unbound.load(Ordering::SeqCst) && !self.reader.is_finished() {
            let unbind = Frame::Unbind(Unbind::new(self.shared.next_sequence()));
            match tokio::time::timeout(unbind_timeout, self.shared.request(unbind)).await {
                Ok(Ok(_)) => debug!(connection_id = %self.shared.connection_id, "Unbind acknowledged"),
                Ok(Err(e)) => debug!(connection_id = %self.shared.connection_id, "Unbind failed: {}", e),
                Err(_) => debug!(connection_id = %self.shared.connection_id, "No unbind_resp in time"),
            }
        }

        self.keep_alive.abort();
        self.reader.abort();

        let shutdown = async { self.shared.writer.lock().await.shutdown().await };
        if let Ok(Err(e)) = tokio::time::timeout(unbind_timeout, shutdown).await {
            debug!(connection_id = %self.shared.connection_id, "Socket shutdown failed: {}", e);
        }
        self.shared.pending.lock().clear();
    }
}

impl Drop for Link {
    fn drop(&mut self) {
        self.keep_alive.abort();
        self.reader.abort();
    }
}

impl std::fmt::Debug for Link {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Link")
            .field("connection_id", &self.shared.connection_id)
            .field("bind_type", &self.shared.bind_type)
            .field("smsc_system_id", &self.smsc_system_id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

fn bind_request(credentials: &BindCredentials) -> Frame {
    let system_type = credentials.system_type.clone().unwrap_or_default();

    match credentials.bind_type {
        BindType::Transmitter => {
            let mut pdu = BindTransmitter::new(
                BIND_SEQUENCE_NUMBER,
                &credentials.system_id,
                &credentials.password,
            );
            pdu.system_type = system_type;
            pdu.interface_version = credentials.interface_version;
            Frame::BindTransmitter(pdu)
        }
        BindType::Receiver => {
            let mut pdu = BindReceiver::new(
                BIND_SEQUENCE_NUMBER,
                &credentials.system_id,
                &credentials.password,
            );
            pdu.system_type = system_type;
            pdu.interface_version = credentials.interface_version;
            Frame::BindReceiver(pdu)
        }
        BindType::Transceiver => {
            let mut pdu = BindTransceiver::new(
                BIND_SEQUENCE_NUMBER,
                &credentials.system_id,
                &credentials.password,
            );
            pdu.system_type = system_type;
            pdu.interface_version = credentials.interface_version;
            Frame::BindTransceiver(pdu)
        }
    }
}

fn bound_system_id(frame: &Frame) -> Option<&str> {
    match frame {
        Frame::BindTransmitterResp(resp) => Some(&resp.system_id),
        Frame::BindReceiverResp(resp) => Some(&resp.system_id),
        Frame::BindTransceiverResp(resp) => Some(&resp.system_id),
        _ => None,
    }
}

/// Send the bind request and wait for its response. Returns the SMSC's
/// system_id.
async fn bind<S>(connection: &mut Connection<S>, credentials: &BindCredentials) -> SmppResult<String>
where
    S: tokio::io::AsyncRead + tokio::io::AsyncWrite,
{
    let request = bind_request(credentials);
    let expected = request.command_id().response();
    connection.write_frame(&request).await?;

    loop {
        let frame = connection
            .read_frame()
            .await?
            .ok_or(SmppError::ConnectionClosed)?;

        if frame.sequence_number() == BIND_SEQUENCE_NUMBER && frame.is_response() {
            let status = frame.command_status();
            if !status.is_ok() {
                return Err(SmppError::ProtocolStatus {
                    status,
                    response: Box::new(frame),
                });
            }
            if Some(frame.command_id()) != expected {
                return Err(SmppError::UnexpectedPdu {
                    expected: format!("{expected:?}"),
                    actual: format!("{:?}", frame.command_id()),
                });
            }
            return Ok(bound_system_id(&frame).unwrap_or_default().to_string());
        }

        match frame {
            Frame::EnquireLink(ping) => {
                connection
                    .write_frame(&EnquireLinkResponse::new(ping.sequence_number))
                    .await?;
            }
            other => debug!("Ignoring {:?} while binding", other.command_id()),
        }
    }
}

async fn read_loop(
    shared: Arc<LinkShared>,
    mut reader: FrameReader<ReadHalf<TcpStream>>,
    events: mpsc::UnboundedSender<LinkEvent>,
) {
    let reason = loop {
        match reader.read_frame().await {
            Ok(Some(frame)) => {
                if let Err(e) = shared.dispatch(frame, &events).await {
                    break format!("write failed: {e}");
                }
                if shared.peer_unbound.load(Ordering::SeqCst) {
                    return;
                }
            }
            Ok(None) => break "connection closed by SMSC".to_string(),
            Err(e) => break format!("read failed: {e}"),
        }
    };

    if shared.closing.load(Ordering::SeqCst) {
        debug!(connection_id = %shared.connection_id, "Read loop ended while closing: {}", reason);
    } else {
        warn!(
            connection_id = %shared.connection_id,
            "{} link failed: {}",
            shared.bind_type.as_str(),
            reason
        );
        let _ = events.send(LinkEvent::Failed(reason));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datatypes::{BindTransceiverResponse, BindTransmitterResponse};

    fn credentials() -> BindCredentials {
        BindCredentials::transceiver("gateway", "secret")
    }

    #[test]
    fn bind_request_leaves_system_type_empty() {
        match bind_request(&credentials()) {
            Frame::BindTransceiver(pdu) => {
                assert_eq!(pdu.system_id, "gateway");
                assert_eq!(pdu.password.as_deref(), Some("secret"));
                assert_eq!(pdu.system_type, "");
                assert_eq!(pdu.sequence_number, BIND_SEQUENCE_NUMBER);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn bind_returns_smsc_system_id() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = Connection::new(client);
        let mut server = Connection::new(server);

        let smsc = tokio::spawn(async move {
            let request = server.read_frame().await.unwrap().unwrap();
            assert_eq!(request.command_id(), CommandId::BindTransceiver);
            // a ping before the response must be answered
            server.write_frame(&EnquireLink::new(77)).await.unwrap();
            let pong = server.read_frame().await.unwrap().unwrap();
            assert_eq!(pong.command_id(), CommandId::EnquireLinkResp);
            server
                .write_frame(&BindTransceiverResponse::new(request.sequence_number(), "SMSC"))
                .await
                .unwrap();
        });

        let system_id = bind(&mut client, &credentials()).await.unwrap();
        assert_eq!(system_id, "SMSC");
        smsc.await.unwrap();
    }

    #[tokio::test]
    async fn bind_rejection_carries_response() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = Connection::new(client);
        let mut server = Connection::new(server);

        tokio::spawn(async move {
            let request = server.read_frame().await.unwrap().unwrap();
            server
                .write_frame(&BindTransceiverResponse::error(
                    request.sequence_number(),
                    CommandStatus::InvalidPassword,
                ))
                .await
                .unwrap();
        });

        match bind(&mut client, &credentials()).await {
            Err(SmppError::ProtocolStatus { status, response }) => {
                assert_eq!(status, CommandStatus::InvalidPassword);
                assert_eq!(response.command_id(), CommandId::BindTransceiverResp);
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn bind_with_mismatched_response_type_fails() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = Connection::new(client);
        let mut server = Connection::new(server);

        tokio::spawn(async move {
            let request = server.read_frame().await.unwrap().unwrap();
            server
                .write_frame(&BindTransmitterResponse::new(request.sequence_number(), "SMSC"))
                .await
                .unwrap();
        });

        assert!(matches!(
            bind(&mut client, &credentials()).await,
            Err(SmppError::UnexpectedPdu { .. })
        ));
    }

    #[tokio::test]
    async fn bind_fails_when_smsc_hangs_up() {
        let (client, server) = tokio::io::duplex(1024);
        let mut client = Connection::new(client);

        tokio::spawn(async move {
            let mut server = Connection::new(server);
            let _ = server.read_frame().await;
        });

        assert!(matches!(
            bind(&mut client, &credentials()).await,
            Err(SmppError::ConnectionClosed)
        ));
    }
}
