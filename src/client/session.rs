// ABOUTME: One logical SMSC session: binds its links, submits split messages, tracks acks and closes
// ABOUTME: Drives the bind/submit/close state machine with idle TTL, rate limiting and event publication

use crate::client::builder::SessionOptions;
use crate::client::error::{SmppError, SmppResult};
use crate::client::events::{EventBus, GatewayEvent};
use crate::client::flow_control::RateLimiter;
use crate::client::link::{Link, LinkEvent};
use crate::client::profile::{BindMode, ConnectionProfile};
use crate::client::splitter;
use crate::client::types::{BindType, OutboundMessage};
use crate::client::window::UnackedWindow;
use crate::datatypes::SubmitSm;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

/// Lifecycle of a session.
///
/// ```text
/// Unbound -> Binding -> Bound -> Closing -> Closed
///               \-> Broken -> Closing -> Closed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unbound,
    Binding,
    Bound,
    Closing,
    Closed,
    /// Binding failed; the session only accepts `close`
    Broken,
}

enum Links {
    Transceiver(Arc<Link>),
    Split {
        transmitter: Arc<Link>,
        receiver: Arc<Link>,
    },
}

impl Links {
    fn sender(&self) -> Arc<Link> {
        match self {
            Links::Transceiver(link) => link.clone(),
            Links::Split { transmitter, .. } => transmitter.clone(),
        }
    }

    fn into_vec(self) -> Vec<Arc<Link>> {
        match self {
            Links::Transceiver(link) => vec![link],
            Links::Split {
                transmitter,
                receiver,
            } => vec![transmitter, receiver],
        }
    }
}

struct SessionInner {
    profile: Arc<ConnectionProfile>,
    options: SessionOptions,
    events: EventBus,
    state: Mutex<SessionState>,
    links: Mutex<Option<Links>>,
    window: Arc<UnackedWindow>,
    limiter: Option<RateLimiter>,
    // Serializes send() so parts of one message are never interleaved
    send_lock: tokio::sync::Mutex<()>,
    close_lock: tokio::sync::Mutex<()>,
    ttl: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(timer) = self.ttl.get_mut().take() {
            timer.abort();
        }
    }
}

/// A client session to one SMSC.
///
/// Cloning is cheap and every clone drives the same session. A session is
/// single-use: once closed (or broken) a new one has to be created.
///
/// # Examples
///
/// ```rust,no_run
/// use smpp_gateway::client::{ConnectionProfile, EventBus, OutboundMessage, Session, SessionOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let profile = ConnectionProfile::new("primary", "localhost", 2775, "system_id", "password")
///     .with_window_size(10)
///     .with_speed(50);
/// let session = Session::new(profile.into(), SessionOptions::default(), EventBus::new());
/// session.connect().await?;
///
/// let message = OutboundMessage::new("m-1", "ACME", "447700900000", "Hello!");
/// session.send(message).await?;
///
/// session.close().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(profile: Arc<ConnectionProfile>, options: SessionOptions, events: EventBus) -> Self {
        let window = Arc::new(UnackedWindow::new(
            profile.id.clone(),
            profile.window_size,
            options.expiry,
        ));
        let limiter = profile.speed.filter(|&speed| speed > 0).map(RateLimiter::new);

        Self {
            inner: Arc::new(SessionInner {
                profile,
                options,
                events,
                state: Mutex::new(SessionState::Unbound),
                links: Mutex::new(None),
                window,
                limiter,
                send_lock: tokio::sync::Mutex::new(()),
                close_lock: tokio::sync::Mutex::new(()),
                ttl: Mutex::new(None),
            }),
        }
    }

    pub fn connection_id(&self) -> &str {
        &self.inner.profile.id
    }

    pub fn profile(&self) -> &ConnectionProfile {
        &self.inner.profile
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.lock()
    }

    pub fn is_bound(&self) -> bool {
        self.state() == SessionState::Bound
    }

    /// True once the session can no longer send: closing, closed or broken.
    pub fn is_closed(&self) -> bool {
        matches!(
            self.state(),
            SessionState::Closing | SessionState::Closed | SessionState::Broken
        )
    }

    /// The session's unacknowledged-message window
    pub fn window(&self) -> &UnackedWindow {
        &self.inner.window
    }

    /// Open and bind the links the profile's mode asks for.
    ///
    /// For `transmitter_receiver` the transmitter is bound first; if the
    /// receiver then fails the transmitter is unbound again. On any failure
    /// the session ends up `Broken` and the error is returned.
    pub async fn connect(&self) -> SmppResult<()> {
        {
            let mut state = self.inner.state.lock();
            if *state != SessionState::Unbound {
                return Err(SmppError::InvalidState(format!(
                    "cannot connect a session that is {:?}",
                    *state
                )));
            }
            if let BindMode::Unsupported(mode) = &self.inner.profile.mode {
                *state = SessionState::Broken;
                return Err(SmppError::InvalidMode {
                    connection_id: self.inner.profile.id.clone(),
                    mode: mode.clone(),
                });
            }
            *state = SessionState::Binding;
        }

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let links = match self.open_links(events_tx).await {
            Ok(links) => links,
            Err(e) => {
                warn!(connection_id = %self.connection_id(), "Bind failed: {}", e);
                let mut state = self.inner.state.lock();
                if *state == SessionState::Binding {
                    *state = SessionState::Broken;
                }
                return Err(e);
            }
        };

        let closed_while_binding = {
            let mut state = self.inner.state.lock();
            if *state == SessionState::Binding {
                *state = SessionState::Bound;
                *self.inner.links.lock() = Some(links);
                None
            } else {
                Some(links)
            }
        };
        if let Some(links) = closed_while_binding {
            for link in links.into_vec() {
                link.close(self.inner.options.unbind_timeout).await;
            }
            return Err(SmppError::ConnectionClosed);
        }

        tokio::spawn(supervise(Arc::downgrade(&self.inner), events_rx));
        self.arm_ttl();

        info!(connection_id = %self.connection_id(), "Session bound ({})", self.inner.profile.mode);
        self.inner.events.publish(GatewayEvent::Connected {
            connection_id: self.connection_id().to_string(),
        });
        Ok(())
    }

    async fn open_links(&self, events: mpsc::UnboundedSender<LinkEvent>) -> SmppResult<Links> {
        let profile = &self.inner.profile;
        let options = &self.inner.options;

        match &profile.mode {
            BindMode::Transceiver => {
                let link = Link::open(profile, BindType::Transceiver, options, events).await?;
                Ok(Links::Transceiver(Arc::new(link)))
            }
            BindMode::TransmitterReceiver => {
                let transmitter =
                    Link::open(profile, BindType::Transmitter, options, events.clone()).await?;
                match Link::open(profile, BindType::Receiver, options, events).await {
                    Ok(receiver) => Ok(Links::Split {
                        transmitter: Arc::new(transmitter),
                        receiver: Arc::new(receiver),
                    }),
                    Err(e) => {
                        transmitter.close(options.unbind_timeout).await;
                        Err(e)
                    }
                }
            }
            BindMode::Unsupported(mode) => Err(SmppError::InvalidMode {
                connection_id: profile.id.clone(),
                mode: mode.clone(),
            }),
        }
    }

    /// Split `message` and submit every part.
    ///
    /// Waits for room in the window once per message and for the rate
    /// limiter once per part. Acknowledgments arrive later as events. Errors
    /// are returned only when the session is not bound or a write fails; a
    /// failed write also closes the session.
    pub async fn send(&self, message: OutboundMessage) -> SmppResult<()> {
        let _serial = self.inner.send_lock.lock().await;
        let link = self.sender_link()?;

        let profile = &self.inner.profile;
        let split = splitter::split_with(&message.text, profile.encoding);
        let (source_ton, source_npi) = profile.source_addressing();
        let (dest_ton, dest_npi) = profile.destination_addressing();
        if split.dropped_parts > 0 {
            warn!(
                connection_id = %self.connection_id(),
                "Message {} is too long, its last {} part(s) will not be sent",
                message.id,
                split.dropped_parts
            );
        }

        self.inner.window.await_capacity().await;

        for part in &split.parts {
            if let Some(limiter) = &self.inner.limiter {
                limiter.acquire().await;
            }

            self.inner
                .window
                .admit(message.clone(), self.inner.expiry_handler());

            let pdu = SubmitSm::builder()
                .source_addr_ton(source_ton)
                .source_addr_npi(source_npi)
                .source_addr(message.sender.as_str())
                .dest_addr_ton(dest_ton)
                .dest_addr_npi(dest_npi)
                .destination_addr(message.destination.as_str())
                .esm_class(split.esm_class)
                .data_coding(split.data_coding)
                .short_message(part.short_message())
                .build();

            if let Err(e) = link.submit(pdu, message.clone()).await {
                self.inner.window.release(&message.id);
                if matches!(e, SmppError::Connection(_)) {
                    error!(connection_id = %self.connection_id(), "Write failed, closing session: {}", e);
                    self.spawn_close();
                }
                return Err(e);
            }
        }

        debug!(
            connection_id = %self.connection_id(),
            "Submitted message {} in {} part(s)",
            message.id,
            split.parts.len()
        );
        self.arm_ttl();
        Ok(())
    }

    fn sender_link(&self) -> SmppResult<Arc<Link>> {
        let state = self.state();
        if state != SessionState::Bound {
            return Err(SmppError::InvalidState(format!(
                "session {} is {:?}",
                self.connection_id(),
                state
            )));
        }
        self.inner
            .links
            .lock()
            .as_ref()
            .map(Links::sender)
            .ok_or(SmppError::ConnectionClosed)
    }

    /// Unbind every link and shut the sockets.
    ///
    /// Idempotent and safe to call concurrently; only the first call does
    /// any work and publishes `Closed`.
    pub async fn close(&self) {
        let _closing = self.inner.close_lock.lock().await;
        {
            let mut state = self.inner.state.lock();
            if *state == SessionState::Closed {
                return;
            }
            *state = SessionState::Closing;
        }

        if let Some(timer) = self.inner.ttl.lock().take() {
            timer.abort();
        }

        let links = self.inner.links.lock().take();
        if let Some(links) = links {
            for link in links.into_vec() {
                link.close(self.inner.options.unbind_timeout).await;
            }
        }

        self.inner.window.clear();
        *self.inner.state.lock() = SessionState::Closed;

        info!(connection_id = %self.connection_id(), "Session closed");
        self.inner.events.publish(GatewayEvent::Closed {
            connection_id: self.connection_id().to_string(),
        });
    }

    fn spawn_close(&self) {
        let session = self.clone();
        tokio::spawn(async move { session.close().await });
    }

    /// Restart the idle timer; when it fires the session closes.
    fn arm_ttl(&self) {
        if !self.is_bound() {
            return;
        }

        let ttl = self.inner.options.ttl;
        let session = Arc::downgrade(&self.inner);
        let timer = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = session.upgrade() {
                info!(connection_id = %inner.profile.id, "Idle for {:?}, closing session", ttl);
                // Detached: close() aborts this very timer
                tokio::spawn(async move { Session { inner }.close().await });
            }
        });

        if let Some(previous) = self.inner.ttl.lock().replace(timer) {
            previous.abort();
        }
    }

    /// React to one link event. Returns false when the session has to close.
    fn handle(&self, event: LinkEvent) -> bool {
        let connection_id = self.connection_id().to_string();

        match event {
            LinkEvent::SubmitResponse { message, ack } if ack.is_ok() => {
                debug!(
                    connection_id = %connection_id,
                    "Message {} acknowledged as {}", message.id, ack.message_id
                );
                self.inner.window.release(&message.id);
                self.inner.events.publish(GatewayEvent::SendSuccess {
                    connection_id,
                    message,
                    ack,
                });
                true
            }
            LinkEvent::SubmitResponse { message, ack } => {
                warn!(
                    connection_id = %connection_id,
                    "Message {} rejected with {}", message.id, ack.command_status
                );
                self.inner.events.publish(GatewayEvent::SendFailure {
                    connection_id,
                    message,
                    ack,
                });
                false
            }
            LinkEvent::Delivered(pdu) => {
                self.inner
                    .events
                    .publish(GatewayEvent::DeliveryReceipt { connection_id, pdu });
                true
            }
            LinkEvent::PeerUnbound => false,
            LinkEvent::Failed(reason) => {
                error!(connection_id = %connection_id, "Link failed: {}", reason);
                self.inner.events.publish(GatewayEvent::Error {
                    connection_id,
                    error: reason,
                });
                false
            }
        }
    }
}

impl SessionInner {
    fn expiry_handler(&self) -> impl FnOnce(String, OutboundMessage) + Send + 'static {
        let events = self.events.clone();
        let window = Arc::downgrade(&self.window);

        move |connection_id, message| {
            warn!(connection_id = %connection_id, "Message {} expired unacknowledged", message.id);
            let message_id = message.id.clone();
            events.publish(GatewayEvent::SendExpired {
                connection_id,
                message,
            });
            if let Some(window) = window.upgrade() {
                window.release(&message_id);
            }
        }
    }
}

/// Consume link events until the links go away or the session has to close.
async fn supervise(session: Weak<SessionInner>, mut events: mpsc::UnboundedReceiver<LinkEvent>) {
    while let Some(event) = events.recv().await {
        let Some(inner) = session.upgrade() else {
            return;
        };
        let session = Session { inner };

        if !session.handle(event) {
            session.close().await;
            return;
        }
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("connection_id", &self.connection_id())
            .field("state", &self.state())
            .field("unacked", &self.inner.window.len())
            .finish()
    }
}
