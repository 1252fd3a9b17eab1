// ABOUTME: SMPP client module: sessions, the connection registry and the pieces they are built from
// ABOUTME: Exports profiles, options, events, splitting, windowing and the error types

//! SMPP Client Module
//!
//! This module turns connection profiles into bound SMPP sessions and keeps
//! them healthy:
//!
//! * **Connection registry** - at most one live session per connection id,
//!   with concurrent callers sharing a single bind attempt
//! * **Broken-connection quarantine** - ids whose bind failed fail fast for a
//!   configurable period instead of hammering the SMSC
//! * **Message splitting** - GSM 03.38, Latin-1 or UCS-2 with concatenation UDH
//! * **Unacknowledged window** - bounded in-flight messages with per-message expiry
//! * **Rate limiting** - submit_sm PDUs per second per session
//! * **Keep-alive** - periodic enquire_link on every link
//! * **Events** - acks, rejections, expiries and delivery receipts on a broadcast bus
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use smpp_gateway::client::{
//!     ConnectionProfile, ConnectionRegistry, GatewayEvent, OutboundMessage, RegistryOptions,
//! };
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let profiles = vec![
//!     ConnectionProfile::new("primary", "localhost", 2775, "system_id", "password")
//!         .with_window_size(10)
//!         .with_speed(50),
//! ];
//! let registry = ConnectionRegistry::new(profiles, RegistryOptions::default());
//! let mut events = registry.subscribe();
//!
//! let session = registry.find_or_create("primary").await?;
//! session
//!     .send(OutboundMessage::new("m-1", "ACME", "447700900000", "Hello!"))
//!     .await?;
//!
//! if let GatewayEvent::SendSuccess { ack, .. } = events.recv().await? {
//!     println!("Accepted as {}", ack.message_id);
//! }
//!
//! registry.drain().await;
//! # Ok(())
//! # }
//! ```
//!
//! ## Architecture
//!
//! * `Dispatcher` - ordered per-connection queues in front of the registry
//! * `ConnectionRegistry` - owns sessions by connection id
//! * `Session` - one logical connection: one transceiver link, or a
//!   transmitter plus a receiver link
//! * `Link` - a single bound TCP connection with its read loop and keep-alive
//!
//! Sessions never reconnect on their own. A closed session is evicted and the
//! next `find_or_create` binds a fresh one.

pub mod builder;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod flow_control;
pub mod keepalive;
pub mod link;
pub mod profile;
pub mod registry;
pub mod session;
pub mod splitter;
pub mod types;
pub mod window;

// Re-export the main types for easy access
pub use builder::{RegistryOptions, SessionOptions};
pub use dispatcher::Dispatcher;
pub use error::{SmppError, SmppResult};
pub use events::{EventBus, GatewayEvent};
pub use flow_control::RateLimiter;
pub use keepalive::{KeepAliveConfig, KeepAliveManager, KeepAliveStatus};
pub use link::Link;
pub use profile::{
    BindMode, ConfigError, ConnectionProfile, TextEncoding, load_profiles, parse_profiles,
};
pub use registry::ConnectionRegistry;
pub use session::{Session, SessionState};
pub use splitter::{ConcatHeader, Part, SplitMessage, split, split_with};
pub use types::{BindCredentials, BindType, InboundMessage, OutboundMessage, SubmitAck};
pub use window::UnackedWindow;
