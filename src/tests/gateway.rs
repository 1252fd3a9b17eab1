// ABOUTME: End-to-end gateway scenarios against the in-process fake SMSC over loopback TCP
// ABOUTME: Covers shared binds, quarantine, windowing, rate limiting, close paths and inbound PDUs

use super::fake_smsc::{Behavior, FakeSmsc, SubmitPolicy, deliver_receipt};
use crate::client::{
    BindMode, ConnectionProfile, ConnectionRegistry, Dispatcher, GatewayEvent, InboundMessage,
    KeepAliveConfig, OutboundMessage, RegistryOptions, SessionOptions, SessionState, SmppError,
};
use crate::codec::Frame;
use crate::datatypes::{CommandId, CommandStatus, Unbind};
use std::time::Duration;
use tokio::sync::broadcast;
use tokio::task::JoinSet;
use tokio::time::Instant;

const WAIT: Duration = Duration::from_secs(5);

fn session_options() -> SessionOptions {
    SessionOptions::default()
        .with_connect_timeout(Duration::from_secs(2))
        .with_bind_timeout(Duration::from_secs(2))
        .with_unbind_timeout(Duration::from_millis(500))
        .with_keep_alive(KeepAliveConfig::disabled())
}

fn options() -> RegistryOptions {
    RegistryOptions::default()
        .with_quarantine(Duration::from_millis(300))
        .with_session(session_options())
}

fn profile(smsc: &FakeSmsc) -> ConnectionProfile {
    ConnectionProfile::new("smsc", "127.0.0.1", smsc.port(), "gateway", "secret")
}

fn message(id: &str) -> OutboundMessage {
    OutboundMessage::new(id, "ACME", "447700900000", format!("hello {id}"))
}

async fn eventually(what: &str, condition: impl Fn() -> bool) {
    let polled = tokio::time::timeout(WAIT, async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await;
    assert!(polled.is_ok(), "timed out waiting for {what}");
}

async fn next_event(
    events: &mut broadcast::Receiver<GatewayEvent>,
    wanted: impl Fn(&GatewayEvent) -> bool,
) -> GatewayEvent {
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.unwrap();
            if wanted(&event) {
                return event;
            }
        }
    })
    .await
    .expect("timed out waiting for event")
}

fn is_closed(event: &GatewayEvent) -> bool {
    matches!(event, GatewayEvent::Closed { .. })
}

#[tokio::test]
async fn concurrent_callers_share_one_bind() {
    let smsc = FakeSmsc::start(Behavior {
        bind_delay: Duration::from_millis(100),
        ..Default::default()
    })
    .await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());

    let mut callers = JoinSet::new();
    for _ in 0..10 {
        let registry = registry.clone();
        callers.spawn(async move { registry.find_or_create("smsc").await });
    }
    while let Some(joined) = callers.join_next().await {
        let session = joined.unwrap().unwrap();
        assert_eq!(session.state(), SessionState::Bound);
    }

    assert_eq!(smsc.connections(), 1);
    assert_eq!(smsc.binds(), vec![CommandId::BindTransceiver]);
    assert_eq!(registry.len(), 1);

    registry.drain().await;
}

#[tokio::test]
async fn submit_is_acknowledged() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    session.send(message("m-1")).await.unwrap();

    match next_event(&mut events, |e| matches!(e, GatewayEvent::SendSuccess { .. })).await {
        GatewayEvent::SendSuccess {
            connection_id,
            message,
            ack,
        } => {
            assert_eq!(connection_id, "smsc");
            assert_eq!(message.id, "m-1");
            assert_eq!(ack.message_id, "msg-1");
        }
        other => panic!("unexpected event {other:?}"),
    }

    let submits = smsc.submits();
    assert_eq!(submits.len(), 1);
    assert_eq!(submits[0].short_message.as_ref(), b"hello m-1");
    assert_eq!(submits[0].source_addr, "ACME");
    assert_eq!(submits[0].destination_addr, "447700900000");
    assert_eq!(u8::from(submits[0].source_addr_ton), 1);
    assert_eq!(u8::from(submits[0].dest_addr_npi), 1);
    assert!(!submits[0].esm_class.has_udhi());

    registry.drain().await;
}

#[tokio::test]
async fn multipart_message_shares_reference() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    let long = OutboundMessage::new("long", "ACME", "447700900000", "a".repeat(200));
    session.send(long).await.unwrap();

    for _ in 0..2 {
        next_event(&mut events, |e| matches!(e, GatewayEvent::SendSuccess { .. })).await;
    }

    let submits = smsc.submits();
    assert_eq!(submits.len(), 2);
    for (index, submit) in submits.iter().enumerate() {
        let udh = &submit.short_message[..6];
        assert!(submit.esm_class.has_udhi());
        assert_eq!(&udh[..3], &[0x05, 0x00, 0x03]);
        assert_eq!(udh[3], submits[0].short_message[3]);
        assert_eq!(udh[4], 2);
        assert_eq!(udh[5] as usize, index + 1);
    }
    assert_eq!(submits[0].short_message.len(), 6 + 153);
    assert_eq!(submits[1].short_message.len(), 6 + 47);

    registry.drain().await;
}

#[tokio::test]
async fn window_of_one_waits_for_ack() {
    let smsc = FakeSmsc::start(Behavior {
        submit: SubmitPolicy::Hold,
        ..Default::default()
    })
    .await;
    let registry =
        ConnectionRegistry::new(vec![profile(&smsc).with_window_size(1)], options());

    let session = registry.find_or_create("smsc").await.unwrap();
    session.send(message("m-1")).await.unwrap();
    eventually("first submit", || smsc.submits().len() == 1).await;

    let second = {
        let session = session.clone();
        tokio::spawn(async move { session.send(message("m-2")).await })
    };
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(smsc.submits().len(), 1);
    assert!(!second.is_finished());

    smsc.ack_held();
    second.await.unwrap().unwrap();
    eventually("second submit", || smsc.submits().len() == 2).await;

    let submits = smsc.submits();
    assert_eq!(submits[0].short_message.as_ref(), b"hello m-1");
    assert_eq!(submits[1].short_message.as_ref(), b"hello m-2");

    registry.drain().await;
}

#[tokio::test]
async fn unacknowledged_message_expires() {
    let smsc = FakeSmsc::start(Behavior {
        submit: SubmitPolicy::Hold,
        ..Default::default()
    })
    .await;
    let options = options().with_session(session_options().with_expiry(Duration::from_millis(300)));
    let registry = ConnectionRegistry::new(vec![profile(&smsc).with_window_size(2)], options);
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    session.send(message("m-1")).await.unwrap();
    assert!(session.window().contains("m-1"));

    match next_event(&mut events, |e| matches!(e, GatewayEvent::SendExpired { .. })).await {
        GatewayEvent::SendExpired { message, .. } => assert_eq!(message.id, "m-1"),
        other => panic!("unexpected event {other:?}"),
    }
    eventually("window release", || session.window().is_empty()).await;
    assert!(session.is_bound());

    registry.drain().await;
}

#[tokio::test]
async fn rate_limit_spaces_submissions() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc).with_speed(5)], options());

    let session = registry.find_or_create("smsc").await.unwrap();
    let started = Instant::now();
    for n in 0..5 {
        session.send(message(&format!("m-{n}"))).await.unwrap();
    }
    let elapsed = started.elapsed();

    assert!(elapsed >= Duration::from_millis(800), "sent too fast: {elapsed:?}");
    assert!(elapsed < Duration::from_secs(3), "sent too slow: {elapsed:?}");

    registry.drain().await;
}

#[tokio::test]
async fn failed_bind_is_quarantined_then_retried() {
    let smsc = FakeSmsc::start(Behavior {
        bind_status: CommandStatus::BindFailed,
        ..Default::default()
    })
    .await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());

    let err = registry.find_or_create("smsc").await.unwrap_err();
    assert!(matches!(
        err,
        SmppError::ProtocolStatus {
            status: CommandStatus::BindFailed,
            ..
        }
    ));
    assert!(registry.is_broken("smsc"));
    assert!(registry.get("smsc").is_none());

    let err = registry.find_or_create("smsc").await.unwrap_err();
    assert!(matches!(err, SmppError::BrokenConnection(_)));
    assert_eq!(smsc.connections(), 1);

    smsc.set_behavior(Behavior::default());
    tokio::time::sleep(Duration::from_millis(500)).await;
    assert!(!registry.is_broken("smsc"));

    let session = registry.find_or_create("smsc").await.unwrap();
    assert!(session.is_bound());
    assert_eq!(smsc.connections(), 2);

    registry.drain().await;
}

#[tokio::test]
async fn bind_timeout_breaks_connection() {
    let smsc = FakeSmsc::start(Behavior {
        bind_delay: Duration::from_secs(2),
        ..Default::default()
    })
    .await;
    let options = options().with_session(session_options().with_bind_timeout(Duration::from_millis(200)));
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options);

    let err = registry.find_or_create("smsc").await.unwrap_err();
    assert!(matches!(err, SmppError::BindTimeout));
    assert!(registry.is_broken("smsc"));
}

#[tokio::test]
async fn invalid_mode_never_connects() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let profile = profile(&smsc).with_mode(BindMode::Unsupported("outbind".to_string()));
    let registry = ConnectionRegistry::new(vec![profile], options());

    let err = registry.find_or_create("smsc").await.unwrap_err();
    assert!(matches!(err, SmppError::InvalidMode { ref mode, .. } if mode == "outbind"));
    assert!(registry.is_broken("smsc"));

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(smsc.connections(), 0);
}

#[tokio::test]
async fn transmitter_receiver_binds_both_links() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let profile = profile(&smsc).with_mode(BindMode::TransmitterReceiver);
    let registry = ConnectionRegistry::new(vec![profile], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    assert_eq!(
        smsc.binds(),
        vec![CommandId::BindTransmitter, CommandId::BindReceiver]
    );

    session.send(message("m-1")).await.unwrap();
    next_event(&mut events, |e| matches!(e, GatewayEvent::SendSuccess { .. })).await;

    registry.drain().await;
    eventually("both links unbound", || smsc.unbinds() == 2).await;
}

#[tokio::test]
async fn receiver_bind_failure_unbinds_transmitter() {
    let smsc = FakeSmsc::start(Behavior {
        receiver_bind_status: Some(CommandStatus::BindFailed),
        ..Default::default()
    })
    .await;
    let profile = profile(&smsc).with_mode(BindMode::TransmitterReceiver);
    let registry = ConnectionRegistry::new(vec![profile], options());

    let err = registry.find_or_create("smsc").await.unwrap_err();
    assert!(matches!(
        err,
        SmppError::ProtocolStatus {
            status: CommandStatus::BindFailed,
            ..
        }
    ));
    assert_eq!(
        smsc.binds(),
        vec![CommandId::BindTransmitter, CommandId::BindReceiver]
    );
    eventually("transmitter unbound", || smsc.unbinds() == 1).await;
    assert!(registry.is_broken("smsc"));
    assert!(registry.get("smsc").is_none());
}

#[tokio::test]
async fn transmitter_bind_failure_skips_receiver() {
    let smsc = FakeSmsc::start(Behavior {
        bind_status: CommandStatus::BindFailed,
        ..Default::default()
    })
    .await;
    let profile = profile(&smsc).with_mode(BindMode::TransmitterReceiver);
    let registry = ConnectionRegistry::new(vec![profile], options());

    assert!(registry.find_or_create("smsc").await.is_err());
    assert_eq!(smsc.binds(), vec![CommandId::BindTransmitter]);
    assert_eq!(smsc.connections(), 1);
}

#[tokio::test]
async fn close_unbinds_once() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    tokio::join!(session.close(), session.close());
    session.close().await;

    assert_eq!(session.state(), SessionState::Closed);
    next_event(&mut events, is_closed).await;
    let again = tokio::time::timeout(Duration::from_millis(200), next_event(&mut events, is_closed)).await;
    assert!(again.is_err(), "Closed published twice");

    assert_eq!(smsc.unbinds(), 1);
    eventually("eviction", || registry.get("smsc").is_none()).await;
    assert!(matches!(
        session.send(message("late")).await,
        Err(SmppError::InvalidState(_))
    ));
}

#[tokio::test]
async fn closed_session_is_replaced_on_demand() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());

    let first = registry.find_or_create("smsc").await.unwrap();
    registry.remove("smsc").await;
    assert!(first.is_closed());
    assert!(registry.is_empty());

    let second = registry.find_or_create("smsc").await.unwrap();
    assert!(second.is_bound());
    assert_eq!(smsc.connections(), 2);

    registry.drain().await;
}

#[tokio::test]
async fn nack_closes_session() {
    let smsc = FakeSmsc::start(Behavior {
        submit: SubmitPolicy::Nack(CommandStatus::ThrottlingError),
        ..Default::default()
    })
    .await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    session.send(message("m-1")).await.unwrap();

    match next_event(&mut events, |e| matches!(e, GatewayEvent::SendFailure { .. })).await {
        GatewayEvent::SendFailure { message, ack, .. } => {
            assert_eq!(message.id, "m-1");
            assert_eq!(ack.command_status, CommandStatus::ThrottlingError);
        }
        other => panic!("unexpected event {other:?}"),
    }
    next_event(&mut events, is_closed).await;

    assert_eq!(session.state(), SessionState::Closed);
    eventually("unbind", || smsc.unbinds() == 1).await;
    eventually("eviction", || registry.get("smsc").is_none()).await;
    assert!(!registry.is_broken("smsc"));
}

#[tokio::test]
async fn rejected_submit_closes_session() {
    let smsc = FakeSmsc::start(Behavior {
        submit: SubmitPolicy::Reject(CommandStatus::MessageQueueFull),
        ..Default::default()
    })
    .await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    session.send(message("m-1")).await.unwrap();

    match next_event(&mut events, |e| matches!(e, GatewayEvent::SendFailure { .. })).await {
        GatewayEvent::SendFailure { ack, .. } => {
            assert_eq!(ack.command_status, CommandStatus::MessageQueueFull)
        }
        other => panic!("unexpected event {other:?}"),
    }
    next_event(&mut events, is_closed).await;
    assert!(session.is_closed());
}

#[tokio::test]
async fn delivery_receipt_is_forwarded_and_answered() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    smsc.push(Frame::DeliverSm(Box::new(deliver_receipt(
        7,
        "id:msg-1 stat:DELIVRD",
    ))));

    match next_event(&mut events, |e| matches!(e, GatewayEvent::DeliveryReceipt { .. })).await {
        GatewayEvent::DeliveryReceipt { connection_id, pdu } => {
            assert_eq!(connection_id, "smsc");
            assert_eq!(pdu.sequence_number, 7);
            assert!(pdu.is_delivery_receipt());
            assert_eq!(pdu.short_message.as_ref(), b"id:msg-1 stat:DELIVRD");
        }
        other => panic!("unexpected event {other:?}"),
    }
    eventually("deliver_sm_resp", || smsc.deliver_sm_resps() == 1).await;
    assert!(session.is_bound());

    registry.drain().await;
}

#[tokio::test]
async fn peer_unbind_closes_session() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    smsc.push(Frame::Unbind(Unbind::new(9)));

    next_event(&mut events, is_closed).await;
    assert_eq!(session.state(), SessionState::Closed);
    eventually("unbind_resp", || smsc.unbind_resps() == 1).await;
    assert_eq!(smsc.unbinds(), 0);
}

#[tokio::test]
async fn dropped_connection_reports_error() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    smsc.drop_connections();

    match next_event(&mut events, |e| matches!(e, GatewayEvent::Error { .. })).await {
        GatewayEvent::Error { connection_id, .. } => assert_eq!(connection_id, "smsc"),
        other => panic!("unexpected event {other:?}"),
    }
    next_event(&mut events, is_closed).await;
    assert!(session.is_closed());
    eventually("eviction", || registry.get("smsc").is_none()).await;
}

#[tokio::test]
async fn keep_alive_sends_enquire_link() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let session_options = session_options()
        .with_keep_alive(KeepAliveConfig::new(Duration::from_millis(100)));
    let registry = ConnectionRegistry::new(
        vec![profile(&smsc)],
        options().with_session(session_options),
    );

    let session = registry.find_or_create("smsc").await.unwrap();
    eventually("enquire_link", || smsc.enquire_links() >= 2).await;
    assert!(session.is_bound());

    registry.drain().await;
}

#[tokio::test]
async fn idle_session_closes_after_ttl() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let options = options().with_session(session_options().with_ttl(Duration::from_millis(300)));
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options);
    let mut events = registry.subscribe();

    let session = registry.find_or_create("smsc").await.unwrap();
    next_event(&mut events, is_closed).await;

    assert!(session.is_closed());
    eventually("unbind", || smsc.unbinds() == 1).await;
}

#[tokio::test]
async fn drain_closes_everything_and_refuses_more() {
    let first = FakeSmsc::start(Behavior::default()).await;
    let second = FakeSmsc::start(Behavior::default()).await;
    let mut other = profile(&second);
    other.id = "other".to_string();
    let registry = ConnectionRegistry::new(vec![profile(&first), other], options());

    assert_eq!(registry.connect_all().await, 2);
    assert_eq!(registry.len(), 2);
    assert_eq!(
        registry.get("other").unwrap().profile().port,
        second.port()
    );

    registry.drain().await;
    assert!(registry.is_empty());
    assert_eq!(first.unbinds(), 1);
    assert_eq!(second.unbinds(), 1);
    assert!(matches!(
        registry.find_or_create("smsc").await,
        Err(SmppError::ShuttingDown)
    ));
}

#[tokio::test]
async fn drain_closes_session_bound_during_drain() {
    let smsc = FakeSmsc::start(Behavior {
        bind_delay: Duration::from_millis(300),
        ..Default::default()
    })
    .await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());

    let pending = {
        let registry = registry.clone();
        tokio::spawn(async move { registry.find_or_create("smsc").await })
    };
    eventually("bind request", || smsc.binds().len() == 1).await;

    registry.drain().await;
    assert!(matches!(pending.await.unwrap(), Err(SmppError::ShuttingDown)));
    assert!(registry.is_empty());
    eventually("unbind", || smsc.unbinds() == 1).await;
}

#[tokio::test]
async fn closed_sessions_are_evicted_after_clear() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());

    registry.find_or_create("smsc").await.unwrap();
    registry.clear().await;
    assert!(registry.is_empty());
    assert!(registry.is_accepting());

    let session = registry.find_or_create("smsc").await.unwrap();
    session.close().await;
    eventually("eviction", || registry.get("smsc").is_none()).await;

    registry.drain().await;
}

#[tokio::test]
async fn dispatcher_keeps_order_and_finishes_before_drain() {
    let smsc = FakeSmsc::start(Behavior {
        bind_delay: Duration::from_millis(50),
        ..Default::default()
    })
    .await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut dispatcher = Dispatcher::new(registry.clone());

    for index in 0..20 {
        dispatcher.submit(InboundMessage {
            connection_id: "smsc".to_string(),
            message: message(&format!("m-{index}")),
        });
    }
    assert_eq!(dispatcher.connections(), 1);

    dispatcher.finish().await;
    eventually("all submits", || smsc.submits().len() == 20).await;
    let texts: Vec<String> = smsc
        .submits()
        .iter()
        .map(|pdu| String::from_utf8_lossy(&pdu.short_message).into_owned())
        .collect();
    let expected: Vec<String> = (0..20).map(|index| format!("hello m-{index}")).collect();
    assert_eq!(texts, expected);

    registry.drain().await;
    assert_eq!(smsc.unbinds(), 1);
}

#[tokio::test]
async fn connect_publishes_connected() {
    let smsc = FakeSmsc::start(Behavior::default()).await;
    let registry = ConnectionRegistry::new(vec![profile(&smsc)], options());
    let mut events = registry.subscribe();

    registry.find_or_create("smsc").await.unwrap();
    match next_event(&mut events, |e| matches!(e, GatewayEvent::Connected { .. })).await {
        GatewayEvent::Connected { connection_id } => assert_eq!(connection_id, "smsc"),
        other => panic!("unexpected event {other:?}"),
    }
    registry.drain().await;
}
