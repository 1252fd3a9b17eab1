//! SMS gateway client for SMPP v3.4 SMSCs.
//!
//! The [`client`] module holds the gateway itself: a registry of sessions
//! keyed by connection id, each session bound to one SMSC and submitting
//! split messages under a window and a rate limit. [`codec`], [`connection`]
//! and [`datatypes`] are the wire layer it is built on.
//!
//! # Examples
//!
//! ```rust,no_run
//! use smpp_gateway::client::{
//!     ConnectionRegistry, InboundMessage, OutboundMessage, RegistryOptions, load_profiles,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let profiles = load_profiles("profiles.json")?;
//!     let registry = ConnectionRegistry::new(profiles, RegistryOptions::default());
//!
//!     registry
//!         .send(InboundMessage {
//!             connection_id: "primary".to_string(),
//!             message: OutboundMessage::new("m-1", "ACME", "447700900000", "Hello, World!"),
//!         })
//!         .await?;
//!
//!     registry.drain().await;
//!     Ok(())
//! }
//! ```

mod macros;

pub mod client;
pub mod codec;
pub mod connection;
pub mod datatypes;

#[cfg(test)]
mod tests;

// Re-export codec types for direct access
pub use codec::{CodecError, Decodable, Encodable, Frame, PduHeader, PduRegistry};

// Re-export the main client API for easy access
pub use client::{
    ConnectionProfile, ConnectionRegistry, GatewayEvent, InboundMessage, OutboundMessage,
    RegistryOptions, Session, SessionOptions, SmppError, SmppResult,
};
