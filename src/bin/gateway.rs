// ABOUTME: Gateway process: loads connection profiles and submits JSON-line messages read from stdin
// ABOUTME: Logs every gateway event and drains all sessions on Ctrl-C or end of input

//! # SMPP Gateway
//!
//! Reads one JSON object per line on stdin and submits it through the named
//! connection:
//!
//! ```json
//! {"connection_id": "primary", "message": {"id": "m-1", "sender": "ACME", "phone": "447700900000", "message": "Hello"}}
//! ```
//!
//! ## Usage
//!
//! ```bash
//! cargo run --bin smpp-gateway -- --profiles profiles.json --eager < messages.jsonl
//! ```

use argh::FromArgs;
use smpp_gateway::client::{
    ConnectionRegistry, Dispatcher, GatewayEvent, InboundMessage, RegistryOptions, load_profiles,
};
use std::error::Error;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

/// SMS gateway submitting messages to SMPP v3.4 SMSCs
#[derive(FromArgs)]
struct CliArgs {
    /// whether or not to enable debugging
    #[argh(switch, short = 'd')]
    debugging: bool,

    /// path of the JSON file listing the connection profiles (default: profiles.json)
    #[argh(option)]
    profiles: Option<String>,

    /// bind every configured connection at startup instead of on first use
    #[argh(switch)]
    eager: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    let cli_args: CliArgs = argh::from_env();

    let subscriber = FmtSubscriber::builder()
        .with_max_level(if cli_args.debugging { Level::DEBUG } else { Level::INFO })
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    let path = cli_args.profiles.unwrap_or_else(|| "profiles.json".to_owned());
    let profiles = load_profiles(&path).map_err(|e| {
        error!("Cannot load profiles: {e}");
        e
    })?;
    info!("Loaded {} connection profile(s) from {path}", profiles.len());

    let registry = ConnectionRegistry::new(profiles, RegistryOptions::default());
    let event_log = tokio::spawn(log_events(registry.subscribe()));

    if cli_args.eager {
        let connected = registry.connect_all().await;
        info!("{connected} connection(s) bound at startup");
    }

    let mut dispatcher = Dispatcher::new(registry.clone());
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    if line.trim().is_empty() {
                        continue;
                    }
                    submit(&mut dispatcher, &line);
                }
                Ok(None) => {
                    info!("End of input, shutting down");
                    break;
                }
                Err(e) => {
                    error!("Failed reading stdin: {e}");
                    break;
                }
            }
        }
    }

    info!("Waiting for queued messages, press Ctrl-C again to abandon them");
    tokio::select! {
        _ = dispatcher.finish() => {}
        _ = tokio::signal::ctrl_c() => warn!("Abandoning queued messages"),
    }

    registry.drain().await;
    event_log.abort();
    Ok(())
}

/// Parse one input line and queue it on its connection.
fn submit(dispatcher: &mut Dispatcher, line: &str) {
    match serde_json::from_str::<InboundMessage>(line) {
        Ok(inbound) => dispatcher.submit(inbound),
        Err(e) => warn!("Skipping malformed input line: {e}"),
    }
}

async fn log_events(mut events: broadcast::Receiver<GatewayEvent>) {
    loop {
        match events.recv().await {
            Ok(GatewayEvent::SendSuccess {
                connection_id,
                message,
                ack,
            }) => {
                info!(connection_id = %connection_id, "Message {} accepted as {}", message.id, ack.message_id);
            }
            Ok(GatewayEvent::SendFailure {
                connection_id,
                message,
                ack,
            }) => {
                warn!(connection_id = %connection_id, "Message {} rejected: {}", message.id, ack.command_status);
            }
            Ok(GatewayEvent::SendExpired {
                connection_id,
                message,
            }) => {
                warn!(connection_id = %connection_id, "Message {} expired", message.id);
            }
            Ok(GatewayEvent::DeliveryReceipt { connection_id, pdu }) => {
                info!(
                    connection_id = %connection_id,
                    "Delivery receipt from {}: {}",
                    pdu.source_addr,
                    String::from_utf8_lossy(&pdu.short_message)
                );
            }
            Ok(GatewayEvent::Error {
                connection_id,
                error,
            }) => {
                error!(connection_id = %connection_id, "Connection error: {error}");
            }
            Ok(event) => debug!(connection_id = %event.connection_id(), "{}", event.name()),
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                warn!("Event log lagged, {skipped} event(s) dropped");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}
