// ABOUTME: Registry of sessions keyed by connection id with per-id creation locks
// ABOUTME: Quarantines connection ids whose bind failed and evicts sessions once they close

use crate::client::builder::RegistryOptions;
use crate::client::error::{SmppError, SmppResult};
use crate::client::events::{EventBus, GatewayEvent};
use crate::client::profile::ConnectionProfile;
use crate::client::session::Session;
use crate::client::types::InboundMessage;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::broadcast;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

struct RegistryInner {
    profiles: HashMap<String, Arc<ConnectionProfile>>,
    options: RegistryOptions,
    events: EventBus,
    // One creation lock per connection id; entries are never removed
    locks: DashMap<String, Arc<tokio::sync::Mutex<()>>>,
    sessions: DashMap<String, Session>,
    // Connection ids whose last bind failed, with the time of failure
    broken: DashMap<String, Instant>,
    evictions: Mutex<HashMap<String, JoinHandle<()>>>,
    listener: Mutex<Option<JoinHandle<()>>>,
    accepting: AtomicBool,
}

impl Drop for RegistryInner {
    fn drop(&mut self) {
        for (_, eviction) in self.evictions.get_mut().drain() {
            eviction.abort();
        }
        if let Some(listener) = self.listener.get_mut().take() {
            listener.abort();
        }
    }
}

/// All sessions of the gateway, at most one live session per connection id.
///
/// Must be created inside a tokio runtime: it spawns a task that evicts
/// sessions as they report `Closed`.
///
/// # Examples
///
/// ```rust,no_run
/// use smpp_gateway::client::{ConnectionProfile, ConnectionRegistry, OutboundMessage, RegistryOptions};
///
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let profiles = vec![ConnectionProfile::new("primary", "localhost", 2775, "system_id", "password")];
/// let registry = ConnectionRegistry::new(profiles, RegistryOptions::default());
///
/// let session = registry.find_or_create("primary").await?;
/// session
///     .send(OutboundMessage::new("m-1", "ACME", "447700900000", "Hello!"))
///     .await?;
///
/// registry.drain().await;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct ConnectionRegistry {
    inner: Arc<RegistryInner>,
}

impl ConnectionRegistry {
    pub fn new(profiles: Vec<ConnectionProfile>, options: RegistryOptions) -> Self {
        let events = EventBus::with_capacity(options.event_capacity);
        let profiles = profiles
            .into_iter()
            .map(|profile| (profile.id.clone(), Arc::new(profile)))
            .collect();

        let registry = Self {
            inner: Arc::new(RegistryInner {
                profiles,
                options,
                events,
                locks: DashMap::new(),
                sessions: DashMap::new(),
                broken: DashMap::new(),
                evictions: Mutex::new(HashMap::new()),
                listener: Mutex::new(None),
                accepting: AtomicBool::new(true),
            }),
        };

        // Subscribe before spawning so no Closed event is missed
        let receiver = registry.inner.events.subscribe();
        let listener = tokio::spawn(listen(Arc::downgrade(&registry.inner), receiver));
        *registry.inner.listener.lock() = Some(listener);

        registry
    }

    /// The bus every session of this registry publishes on
    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    pub fn subscribe(&self) -> broadcast::Receiver<GatewayEvent> {
        self.inner.events.subscribe()
    }

    pub fn profile(&self, connection_id: &str) -> Option<Arc<ConnectionProfile>> {
        self.inner.profiles.get(connection_id).cloned()
    }

    pub fn connection_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.inner.profiles.keys().cloned().collect();
        ids.sort();
        ids
    }

    /// The live session for `connection_id`, if any
    pub fn get(&self, connection_id: &str) -> Option<Session> {
        self.inner
            .sessions
            .get(connection_id)
            .map(|entry| entry.value().clone())
    }

    pub fn is_broken(&self, connection_id: &str) -> bool {
        self.inner.broken.contains_key(connection_id)
    }

    /// Number of sessions currently registered
    pub fn len(&self) -> usize {
        self.inner.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.sessions.is_empty()
    }

    pub fn is_accepting(&self) -> bool {
        self.inner.accepting.load(Ordering::SeqCst)
    }

    /// Return the live session for `connection_id`, creating and binding one
    /// if needed.
    ///
    /// Concurrent callers for the same id share one bind attempt. If the
    /// bind fails the id is quarantined: further calls fail fast with
    /// `BrokenConnection` until the quarantine period has passed.
    pub async fn find_or_create(&self, connection_id: &str) -> SmppResult<Session> {
        if !self.is_accepting() {
            return Err(SmppError::ShuttingDown);
        }
        let profile = self
            .profile(connection_id)
            .ok_or_else(|| SmppError::UnknownConnection(connection_id.to_string()))?;

        let lock = self
            .inner
            .locks
            .entry(connection_id.to_string())
            .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(())))
            .clone();
        let _creating = lock.lock().await;

        if !self.is_accepting() {
            return Err(SmppError::ShuttingDown);
        }
        if self.is_broken(connection_id) {
            return Err(SmppError::BrokenConnection(connection_id.to_string()));
        }
        if let Some(session) = self.get(connection_id) {
            if !session.is_closed() {
                return Ok(session);
            }
        }

        debug!(connection_id = %connection_id, "Creating session");
        let session = Session::new(
            profile,
            self.inner.options.session.clone(),
            self.inner.events.clone(),
        );

        match session.connect().await {
            Ok(()) => {
                // drain() may have started while the bind was in flight
                if !self.is_accepting() {
                    info!(connection_id = %connection_id, "Bound after drain started, closing");
                    session.close().await;
                    return Err(SmppError::ShuttingDown);
                }
                self.inner
                    .sessions
                    .insert(connection_id.to_string(), session.clone());
                Ok(session)
            }
            Err(e) => {
                error!(connection_id = %connection_id, "Connection failed: {}", e);
                session.close().await;
                self.inner
                    .sessions
                    .remove_if(connection_id, |_, stale| stale.is_closed());
                self.mark_broken(connection_id);
                Err(e)
            }
        }
    }

    /// Resolve the message's connection and send through it
    pub async fn send(&self, inbound: InboundMessage) -> SmppResult<()> {
        let session = self.find_or_create(&inbound.connection_id).await?;
        session.send(inbound.message).await
    }

    fn mark_broken(&self, connection_id: &str) {
        self.inner
            .broken
            .insert(connection_id.to_string(), Instant::now());

        let quarantine = self.inner.options.quarantine;
        let registry = Arc::downgrade(&self.inner);
        let id = connection_id.to_string();
        let eviction = tokio::spawn(async move {
            tokio::time::sleep(quarantine).await;
            if let Some(inner) = registry.upgrade() {
                inner.broken.remove(&id);
                inner.evictions.lock().remove(&id);
                info!(connection_id = %id, "Quarantine lifted");
            }
        });

        if let Some(previous) = self
            .inner
            .evictions
            .lock()
            .insert(connection_id.to_string(), eviction)
        {
            previous.abort();
        }
    }

    /// Close and forget the session for `connection_id`. No-op when absent.
    pub async fn remove(&self, connection_id: &str) {
        let removed = self.inner.sessions.remove(connection_id);
        if let Some((_, session)) = removed {
            session.close().await;
        }
    }

    /// Close every session and cancel quarantine timers.
    ///
    /// Each session is closed under its creation lock, so a bind already in
    /// flight finishes first and its session is closed too. The registry
    /// keeps accepting work afterwards.
    pub async fn clear(&self) {
        let locks: Vec<(String, Arc<tokio::sync::Mutex<()>>)> = self
            .inner
            .locks
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect();

        for (connection_id, lock) in locks {
            let _creating = lock.lock().await;
            let removed = self.inner.sessions.remove(&connection_id);
            if let Some((_, session)) = removed {
                session.close().await;
            }
        }

        let evictions: Vec<JoinHandle<()>> = self
            .inner
            .evictions
            .lock()
            .drain()
            .map(|(_, eviction)| eviction)
            .collect();
        for eviction in evictions {
            eviction.abort();
        }
        self.inner.broken.clear();
    }

    /// Bind every configured connection concurrently. Failures are logged
    /// and leave the id quarantined. Returns how many sessions are live.
    pub async fn connect_all(&self) -> usize {
        let mut attempts = JoinSet::new();
        for connection_id in self.connection_ids() {
            let registry = self.clone();
            attempts.spawn(async move {
                let result = registry.find_or_create(&connection_id).await;
                (connection_id, result)
            });
        }

        let mut connected = 0;
        while let Some(joined) = attempts.join_next().await {
            match joined {
                Ok((_, Ok(_))) => connected += 1,
                Ok((connection_id, Err(e))) => {
                    warn!(connection_id = %connection_id, "Eager connect failed: {}", e)
                }
                Err(e) => error!("Connect task failed: {}", e),
            }
        }
        connected
    }

    /// Stop accepting new sessions, close everything and stop listening for
    /// session events.
    pub async fn drain(&self) {
        info!("Draining {} session(s)", self.len());
        self.inner.accepting.store(false, Ordering::SeqCst);
        self.clear().await;

        let listener = self.inner.listener.lock().take();
        if let Some(listener) = listener {
            listener.abort();
        }
    }
}

/// Evict sessions from the registry as they report `Closed`.
async fn listen(registry: Weak<RegistryInner>, mut events: broadcast::Receiver<GatewayEvent>) {
    loop {
        match events.recv().await {
            Ok(GatewayEvent::Closed { connection_id }) => {
                let Some(inner) = registry.upgrade() else {
                    return;
                };
                // A replacement session may already be registered under the id
                if inner
                    .sessions
                    .remove_if(&connection_id, |_, session| session.is_closed())
                    .is_some()
                {
                    debug!(connection_id = %connection_id, "Evicted closed session");
                }
            }
            Ok(GatewayEvent::Error {
                connection_id,
                error,
            }) => {
                debug!(connection_id = %connection_id, "Session reported error: {}", error);
            }
            Ok(_) => {}
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Registry listener lagged, skipped {} event(s)", skipped);
                if let Some(inner) = registry.upgrade() {
                    inner.sessions.retain(|_, session| !session.is_closed());
                }
            }
            Err(broadcast::error::RecvError::Closed) => return,
        }
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("profiles", &self.connection_ids())
            .field("sessions", &self.len())
            .field("broken", &self.inner.broken.len())
            .field("accepting", &self.is_accepting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::profile::BindMode;
    use std::time::Duration;

    fn registry_with(profiles: Vec<ConnectionProfile>) -> ConnectionRegistry {
        ConnectionRegistry::new(profiles, RegistryOptions::default())
    }

    #[tokio::test]
    async fn unknown_connection_is_rejected() {
        let registry = registry_with(vec![]);
        let err = registry.find_or_create("missing").await.unwrap_err();
        assert!(matches!(err, SmppError::UnknownConnection(ref id) if id == "missing"));
    }

    #[tokio::test]
    async fn drained_registry_refuses_new_sessions() {
        let registry = registry_with(vec![ConnectionProfile::new(
            "a", "127.0.0.1", 1, "user", "pass",
        )]);
        registry.drain().await;

        assert!(!registry.is_accepting());
        assert!(matches!(
            registry.find_or_create("a").await,
            Err(SmppError::ShuttingDown)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_bind_quarantines_until_expiry() {
        let profile = ConnectionProfile::new("a", "127.0.0.1", 1, "user", "pass")
            .with_mode(BindMode::Unsupported("receiver".to_string()));
        let options = RegistryOptions::default().with_quarantine(Duration::from_secs(60));
        let registry = ConnectionRegistry::new(vec![profile], options);

        let err = registry.find_or_create("a").await.unwrap_err();
        assert!(matches!(err, SmppError::InvalidMode { .. }));
        assert!(registry.is_broken("a"));
        assert!(registry.get("a").is_none());

        let err = registry.find_or_create("a").await.unwrap_err();
        assert!(matches!(err, SmppError::BrokenConnection(ref id) if id == "a"));

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(!registry.is_broken("a"));
        assert!(matches!(
            registry.find_or_create("a").await,
            Err(SmppError::InvalidMode { .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_quarantine() {
        let profile = ConnectionProfile::new("a", "127.0.0.1", 1, "user", "pass")
            .with_mode(BindMode::Unsupported("outbind".to_string()));
        let registry = registry_with(vec![profile]);

        let _ = registry.find_or_create("a").await;
        assert!(registry.is_broken("a"));

        registry.clear().await;
        assert!(!registry.is_broken("a"));
        assert!(registry.inner.evictions.lock().is_empty());
        assert!(registry.is_accepting());
        assert!(registry.inner.listener.lock().is_some());
    }

    #[tokio::test]
    async fn drain_stops_the_listener() {
        let registry = registry_with(vec![]);
        registry.drain().await;
        assert!(registry.inner.listener.lock().is_none());
    }

    #[tokio::test]
    async fn remove_missing_is_noop() {
        let registry = registry_with(vec![]);
        registry.remove("nothing").await;
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn connection_ids_are_sorted() {
        let registry = registry_with(vec![
            ConnectionProfile::new("b", "127.0.0.1", 1, "user", "pass"),
            ConnectionProfile::new("a", "127.0.0.1", 1, "user", "pass"),
        ]);
        assert_eq!(registry.connection_ids(), vec!["a", "b"]);
        assert!(registry.profile("a").is_some());
    }
}
