// ABOUTME: Tunable timings for sessions and the connection registry, with builder-style setters
// ABOUTME: Defaults mirror the production gateway: 10s connect, 5s bind, 6h TTL, 60s expiry and quarantine

use crate::client::keepalive::KeepAliveConfig;
use std::time::Duration;

/// Timing knobs for one `Session`.
///
/// # Example
///
/// ```rust
/// use smpp_gateway::client::SessionOptions;
/// use std::time::Duration;
///
/// let options = SessionOptions::default()
///     .with_bind_timeout(Duration::from_secs(2))
///     .with_ttl(Duration::from_secs(3600));
/// assert_eq!(options.expiry, Duration::from_secs(60));
/// ```
#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Bound on establishing the TCP connection of each link
    pub connect_timeout: Duration,
    /// Bound on receiving the bind response of each link
    pub bind_timeout: Duration,
    /// Grace given to the SMSC to answer our unbind when closing
    pub unbind_timeout: Duration,
    /// Inactivity period after which the session closes itself
    pub ttl: Duration,
    /// Time a message may stay unacknowledged before `SendExpired` fires
    pub expiry: Duration,
    pub keep_alive: KeepAliveConfig,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(10),
            bind_timeout: Duration::from_secs(5),
            unbind_timeout: Duration::from_secs(1),
            ttl: Duration::from_secs(6 * 60 * 60),
            expiry: Duration::from_secs(60),
            keep_alive: KeepAliveConfig::default(),
        }
    }
}

impl SessionOptions {
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn with_bind_timeout(mut self, timeout: Duration) -> Self {
        self.bind_timeout = timeout;
        self
    }

    pub fn with_unbind_timeout(mut self, timeout: Duration) -> Self {
        self.unbind_timeout = timeout;
        self
    }

    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn with_expiry(mut self, expiry: Duration) -> Self {
        self.expiry = expiry;
        self
    }

    pub fn with_keep_alive(mut self, keep_alive: KeepAliveConfig) -> Self {
        self.keep_alive = keep_alive;
        self
    }
}

/// Settings for a `ConnectionRegistry`.
#[derive(Debug, Clone)]
pub struct RegistryOptions {
    /// How long a connection id stays cached as broken after a failed bind
    pub quarantine: Duration,
    /// Capacity of the event channel
    pub event_capacity: usize,
    pub session: SessionOptions,
}

impl Default for RegistryOptions {
    fn default() -> Self {
        Self {
            quarantine: Duration::from_secs(60),
            event_capacity: 1024,
            session: SessionOptions::default(),
        }
    }
}

impl RegistryOptions {
    pub fn with_quarantine(mut self, quarantine: Duration) -> Self {
        self.quarantine = quarantine;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity;
        self
    }

    pub fn with_session(mut self, session: SessionOptions) -> Self {
        self.session = session;
        self
    }
}
