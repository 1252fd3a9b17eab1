// ABOUTME: SMPP keep-alive for bound links: periodic enquire_link with failure counting
// ABOUTME: Provides the configuration, the failure tracker and the async driver run by each link

use crate::client::error::SmppResult;
use std::future::Future;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, warn};

/// Configuration for SMPP keep-alive functionality
///
/// Controls the periodic enquire_link PDUs that verify a bound link is still
/// answered by the SMSC.
///
/// # Example
///
/// ```rust
/// use smpp_gateway::client::KeepAliveConfig;
/// use std::time::Duration;
///
/// // Default configuration (10s interval, 10s timeout, 3 max failures)
/// let config = KeepAliveConfig::default();
///
/// let config = KeepAliveConfig::new(Duration::from_secs(60))
///     .with_timeout(Duration::from_secs(15))
///     .with_max_failures(5);
///
/// let config = KeepAliveConfig::disabled();
/// assert!(!config.enabled);
/// ```
#[derive(Debug, Clone)]
pub struct KeepAliveConfig {
    /// Interval between enquire_link PDUs (default: 10 seconds)
    pub interval: Duration,

    /// Timeout for enquire_link responses (default: 10 seconds)
    pub timeout: Duration,

    /// Consecutive failures before the link is considered dead (default: 3)
    pub max_failures: u32,

    /// Whether keep-alive is enabled (default: true)
    pub enabled: bool,
}

impl Default for KeepAliveConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            timeout: Duration::from_secs(10),
            max_failures: 3,
            enabled: true,
        }
    }
}

impl KeepAliveConfig {
    /// Create a new keep-alive configuration with custom interval
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            ..Default::default()
        }
    }

    /// Set the timeout for enquire_link responses
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Set the maximum consecutive failures before the link is considered dead
    pub fn with_max_failures(mut self, max_failures: u32) -> Self {
        self.max_failures = max_failures;
        self
    }

    /// Create a disabled keep-alive configuration
    pub fn disabled() -> Self {
        Self {
            enabled: false,
            ..Default::default()
        }
    }
}

/// Status information about keep-alive state
#[derive(Debug, Clone, PartialEq)]
pub struct KeepAliveStatus {
    /// Whether keep-alive is enabled for the link
    pub running: bool,

    /// Count of enquire_link exchanges that failed in a row; reset by any success
    pub consecutive_failures: u32,

    /// Total enquire_link PDUs sent
    pub total_pings: u32,

    /// Total enquire_link_resp PDUs received in time
    pub total_pongs: u32,
}

/// Tracks enquire_link outcomes for one link
///
/// The link's keep-alive task records every ping and its outcome here and
/// stops once `is_connection_failed` turns true.
#[derive(Debug)]
pub struct KeepAliveManager {
    config: KeepAliveConfig,
    last_ping: Option<Instant>,
    consecutive_failures: u32,
    total_pings: u32,
    total_pongs: u32,
}

impl KeepAliveManager {
    /// Create a new keep-alive manager with the specified configuration
    pub fn new(config: KeepAliveConfig) -> Self {
        Self {
            config,
            last_ping: None,
            consecutive_failures: 0,
            total_pings: 0,
            total_pongs: 0,
        }
    }

    /// Record that an enquire_link was sent
    pub fn on_ping_sent(&mut self) {
        self.last_ping = Some(Instant::now());
        self.total_pings += 1;
        debug!("Enquire_link sent (total: {})", self.total_pings);
    }

    /// Record a successful enquire_link response
    pub fn on_ping_success(&mut self) {
        self.consecutive_failures = 0;
        self.total_pongs += 1;
        debug!("Enquire_link successful (total: {})", self.total_pongs);
    }

    /// Record a failed or unanswered enquire_link
    pub fn on_ping_failure(&mut self) {
        self.consecutive_failures += 1;
        warn!(
            "Enquire_link failed ({}/{} consecutive failures)",
            self.consecutive_failures, self.config.max_failures
        );
    }

    pub fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
    }

    /// True once `max_failures` consecutive pings went unanswered
    pub fn is_connection_failed(&self) -> bool {
        self.consecutive_failures >= self.config.max_failures
    }

    pub fn is_running(&self) -> bool {
        self.config.enabled
    }

    /// Time since the last ping, if one was sent
    pub fn since_last_ping(&self) -> Option<Duration> {
        self.last_ping.map(|at| at.elapsed())
    }

    pub fn status(&self) -> KeepAliveStatus {
        KeepAliveStatus {
            running: self.config.enabled,
            consecutive_failures: self.consecutive_failures,
            total_pings: self.total_pings,
            total_pongs: self.total_pongs,
        }
    }

    pub fn interval(&self) -> Duration {
        self.config.interval
    }

    pub fn timeout(&self) -> Duration {
        self.config.timeout
    }
}

/// Ping every `interval` until `max_failures` consecutive pings fail, then
/// return the final status. Never returns when keep-alive is disabled.
///
/// `ping` sends one enquire_link and resolves when its response arrives.
pub async fn run<F, Fut>(config: KeepAliveConfig, mut ping: F) -> KeepAliveStatus
where
    F: FnMut() -> Fut,
    Fut: Future<Output = SmppResult<()>>,
{
    if !config.enabled {
        return std::future::pending().await;
    }

    let mut manager = KeepAliveManager::new(config);
    let mut ticker = tokio::time::interval_at(Instant::now() + manager.interval(), manager.interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        manager.on_ping_sent();

        match tokio::time::timeout(manager.timeout(), ping()).await {
            Ok(Ok(())) => manager.on_ping_success(),
            Ok(Err(e)) => {
                debug!("Enquire_link error: {}", e);
                manager.on_ping_failure();
            }
            Err(_) => manager.on_ping_failure(),
        }

        if manager.is_connection_failed() {
            return manager.status();
        }
    }
}
