//! Gateway Integration Tests
//!
//! Drive the gateway end to end: in-process through in-memory transports, and
//! over a real socket for the WebSocket and HTTP endpoints.
//!
//! Run with: cargo test -p integration-tests --test gateway_tests

use std::time::Duration;

use anyhow::Result;
use futures_util::{SinkExt, StreamExt};
use im_core::{Action, Envelope, Identity, KickOutNotify, ServerHello};
use integration_tests::{fixtures::*, test_config, TestGateway, TestServer, WAIT};
use tokio::time::{sleep, timeout, Instant};
use tokio_tungstenite::{connect_async, tungstenite, tungstenite::Message};

// ============================================================================
// Connect & Hello
// ============================================================================

#[tokio::test]
async fn test_connect_gets_temp_identity_and_hello() -> Result<()> {
    let gw = TestGateway::start()?;
    let mut client = gw.connect_raw(16)?;

    assert!(client.id.is_temp());
    assert_eq!(client.id.gateway(), "gw-test");

    let hello = client.recv().await?;
    assert_eq!(hello.action, Action::Hello);
    let payload: ServerHello = hello.decode_data()?;
    assert_eq!(payload.temp_id, client.id.to_string());
    assert_eq!(payload.heartbeat_interval, 30_000);

    let events = gw.recorded.lifecycle(1).await?;
    assert_eq!(events, vec![(Action::InternalOnline, client.id.to_string())]);
    Ok(())
}

#[tokio::test]
async fn test_client_hello_records_version() -> Result<()> {
    let gw = TestGateway::start()?;
    let client = gw.connect().await?;

    client.send(&hello(1, "4.2.0")).await?;

    timeout(WAIT, async {
        loop {
            let info = gw.gateway.registry().client_info(&client.id);
            if info.is_some_and(|info| info.version == "4.2.0") {
                break;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

// ============================================================================
// Authentication
// ============================================================================

#[tokio::test]
async fn test_authenticate_success() -> Result<()> {
    let gw = TestGateway::start()?;
    let mut client = gw.connect().await?;
    let user = unique_user();

    client
        .send(&authenticate(11, &encrypt(&credentials(&user, "ios", "iPhone"))))
        .await?;

    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.action, Action::NotifySuccess);
    assert_eq!(reply.seq, 11);

    let durable = Identity::new("gw-test", user.as_str(), "ios");
    let registry = gw.gateway.registry();
    assert!(registry.is_online(&durable));
    assert!(!registry.is_online(&client.id));
    assert_eq!(registry.client(&durable).and_then(|c| c.credentials()).map(|c| c.user_id), Some(user));

    let events = gw.recorded.lifecycle(3).await?;
    assert_eq!(
        events,
        vec![
            (Action::InternalOnline, client.id.to_string()),
            (Action::InternalOffline, client.id.to_string()),
            (Action::InternalOnline, durable.to_string()),
        ]
    );
    Ok(())
}

#[tokio::test]
async fn test_authenticate_invalid_credential() -> Result<()> {
    let gw = TestGateway::start()?;
    let mut client = gw.connect().await?;

    let mut credential = encrypt(&credentials(&unique_user(), "", ""));
    credential.credential.truncate(credential.credential.len() - 7);
    client.send(&authenticate(3, &credential)).await?;

    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.action, Action::NotifyError);
    assert_eq!(reply.seq, 3);
    assert_eq!(reply.data_str(), Some("invalid authenticate message"));
    assert!(gw.gateway.registry().is_online(&client.id));
    Ok(())
}

#[tokio::test]
async fn test_authenticate_expired_credential() -> Result<()> {
    let gw = TestGateway::start()?;
    let mut client = gw.connect().await?;

    let mut creds = credentials(&unique_user(), "", "");
    creds.timestamp -= 1_501_000;
    client.send(&authenticate(4, &encrypt(&creds))).await?;

    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.action, Action::NotifyError);
    assert_eq!(reply.data_str(), Some("credential expired"));
    Ok(())
}

#[tokio::test]
async fn test_authenticate_without_secret_key() -> Result<()> {
    let config = test_config(&[("AUTH_SECRET_KEY", "")])?;
    let gw = TestGateway::start_with_config(&config)?;
    let mut client = gw.connect().await?;

    client
        .send(&authenticate(5, &encrypt(&credentials(&unique_user(), "", ""))))
        .await?;

    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.action, Action::NotifyError);
    assert_eq!(reply.data_str(), Some("authentication unavailable"));
    Ok(())
}

#[tokio::test]
async fn test_second_device_login_kicks_out_first() -> Result<()> {
    let gw = TestGateway::start()?;
    let user = unique_user();
    let mut first = gw.connect().await?;
    let mut second = gw.connect().await?;

    first
        .send(&authenticate(1, &encrypt(&credentials(&user, "pc", "Office PC"))))
        .await?;
    assert_eq!(first.recv_non_heartbeat().await?.action, Action::NotifySuccess);

    second
        .send(&authenticate(1, &encrypt(&credentials(&user, "pc", "Home PC"))))
        .await?;
    assert_eq!(second.recv_non_heartbeat().await?.action, Action::NotifySuccess);

    let kick = first.recv_non_heartbeat().await?;
    assert_eq!(kick.action, Action::NotifyKickOut);
    let notify: KickOutNotify = kick.decode_data()?;
    assert_eq!(notify.device_id, "pc");
    assert_eq!(notify.device_name, "Home PC");

    // Exactly one connection holds the durable identity; the first one is
    // still connected under a temporary identity.
    let registry = gw.gateway.registry();
    let durable = Identity::new("gw-test", user.as_str(), "pc");
    let holders: Vec<_> = registry
        .all_clients()
        .into_iter()
        .filter(|info| info.id == durable)
        .collect();
    assert_eq!(holders.len(), 1);
    assert_eq!(registry.connection_count(), 2);
    assert_eq!(
        registry.all_clients().iter().filter(|info| info.id.is_temp()).count(),
        1
    );

    // The kicked connection keeps working
    first.send(&Envelope::new(0, Action::Heartbeat)).await?;
    Ok(())
}

#[tokio::test]
async fn test_same_user_different_devices_coexist() -> Result<()> {
    let gw = TestGateway::start()?;
    let user = unique_user();
    let mut phone = gw.connect().await?;
    let mut desktop = gw.connect().await?;

    phone.send(&authenticate(1, &encrypt(&credentials(&user, "ios", "")))).await?;
    desktop.send(&authenticate(1, &encrypt(&credentials(&user, "mac", "")))).await?;

    assert_eq!(phone.recv_non_heartbeat().await?.action, Action::NotifySuccess);
    assert_eq!(desktop.recv_non_heartbeat().await?.action, Action::NotifySuccess);

    let registry = gw.gateway.registry();
    assert!(registry.is_online(&Identity::new("", user.as_str(), "ios")));
    assert!(registry.is_online(&Identity::new("", user.as_str(), "mac")));
    Ok(())
}

// ============================================================================
// Delivery tickets
// ============================================================================

#[tokio::test]
async fn test_chat_message_requires_credentials() -> Result<()> {
    let gw = TestGateway::start()?;
    let mut client = gw.connect().await?;

    client.send(&chat_message(21, "anyone", "peer", "hi")).await?;

    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.action, Action::NotifyForbidden);
    assert_eq!(reply.seq, 21);
    assert_eq!(reply.data_str(), Some("no credentials"));
    Ok(())
}

#[tokio::test]
async fn test_chat_message_ticket_checks() -> Result<()> {
    let gw = TestGateway::start()?;
    let user = unique_user();
    let mut client = gw.connect().await?;
    client.send(&authenticate(1, &encrypt(&credentials(&user, "", "")))).await?;
    assert_eq!(client.recv_non_heartbeat().await?.action, Action::NotifySuccess);

    // Ticket issued for another recipient
    let mut wrong = chat_message(2, &user, "alice", "hi");
    wrong.to = "bob".to_string();
    client.send(&wrong).await?;
    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.action, Action::NotifyForbidden);
    assert_eq!(reply.data_str(), Some("ticket expired"));

    // Missing ticket
    let mut missing = chat_message(3, &user, "alice", "hi");
    missing.ticket.clear();
    client.send(&missing).await?;
    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.data_str(), Some("invalid ticket"));

    // Valid ticket with a spoofed sender reaches the handler with `from` fixed
    let mut valid = chat_message(4, &user, "alice", "hi");
    valid.from = "mallory".to_string();
    client.send(&valid).await?;

    let (info, delivered) = gw.recorded.next(Action::ChatMessage).await?;
    assert_eq!(delivered.from, user);
    assert_eq!(delivered.to, "alice");
    assert_eq!(delivered.seq, 4);
    assert_eq!(info.id.uid(), user);
    Ok(())
}

#[tokio::test]
async fn test_unticketed_actions_pass_through() -> Result<()> {
    let gw = TestGateway::start()?;
    let client = gw.connect().await?;

    client
        .send(&Envelope::new(8, Action::parse("api.profile")).with_data("me"))
        .await?;

    let (_, delivered) = gw.recorded.next(Action::parse("api.profile")).await?;
    assert_eq!(delivered.from, client.id.uid());
    Ok(())
}

// ============================================================================
// Protocol errors
// ============================================================================

#[tokio::test]
async fn test_protocol_errors_reported_then_disconnect() -> Result<()> {
    let config = test_config(&[("CONNECTION_MAX_PROTOCOL_ERRORS", "3")])?;
    let gw = TestGateway::start_with_config(&config)?;
    let mut client = gw.connect().await?;

    client.send_raw("{broken").await?;
    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.action, Action::NotifyError);

    // Clients may not speak for the gateway
    client
        .send(&Envelope::internal_offline(&Identity::from_uid("someone")))
        .await?;
    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.action, Action::NotifyError);

    client.send_raw(r#"{"action":"hello","data":42}"#).await?;
    let frames = client.expect_closed().await?;
    assert!(frames.iter().any(|f| f.action == Action::NotifyError));
    assert!(!gw.gateway.registry().is_online(&client.id));
    Ok(())
}

// ============================================================================
// Heartbeats
// ============================================================================

#[tokio::test]
async fn test_silent_client_is_disconnected() -> Result<()> {
    let config = test_config(&[
        ("HEARTBEAT_CLIENT_INTERVAL_MS", "100"),
        ("HEARTBEAT_LOST_LIMIT", "2"),
    ])?;
    let gw = TestGateway::start_with_config(&config)?;
    let mut client = gw.connect().await?;
    let started = Instant::now();

    client.expect_closed().await?;

    assert!(started.elapsed() >= Duration::from_millis(180));
    assert!(!gw.gateway.registry().is_online(&client.id));
    let events = gw.recorded.lifecycle(2).await?;
    assert_eq!(events[1], (Action::InternalOffline, client.id.to_string()));
    Ok(())
}

#[tokio::test]
async fn test_heartbeating_client_stays_connected() -> Result<()> {
    let config = test_config(&[
        ("HEARTBEAT_CLIENT_INTERVAL_MS", "100"),
        ("HEARTBEAT_LOST_LIMIT", "1"),
    ])?;
    let gw = TestGateway::start_with_config(&config)?;
    let client = gw.connect().await?;

    for _ in 0..10 {
        client.send(&Envelope::new(0, Action::Heartbeat)).await?;
        sleep(Duration::from_millis(40)).await;
    }

    assert!(gw.gateway.registry().is_online(&client.id));
    Ok(())
}

#[tokio::test]
async fn test_idle_server_sends_heartbeats() -> Result<()> {
    let config = test_config(&[("HEARTBEAT_SERVER_INTERVAL_MS", "50")])?;
    let gw = TestGateway::start_with_config(&config)?;
    let mut client = gw.connect().await?;

    assert_eq!(client.recv().await?.action, Action::Heartbeat);
    Ok(())
}

// ============================================================================
// Outbound queue
// ============================================================================

#[tokio::test]
async fn test_enqueue_never_blocks_on_slow_client() -> Result<()> {
    let gw = TestGateway::start()?;
    // Client never reads: the transport, then the connection queue fill up.
    let client = gw.connect_raw(4)?;
    let registry = gw.gateway.registry();

    let started = Instant::now();
    for seq in 0..10_000 {
        registry.enqueue_message(&client.id, Envelope::notify_success(seq))?;
    }
    assert!(started.elapsed() < Duration::from_secs(2));

    let conn = registry.client(&client.id).expect("client registered");
    timeout(WAIT, async {
        while registry.stats().dropped_messages + conn.dropped_messages() < 9_000 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    assert!(conn.is_running());
    Ok(())
}

#[tokio::test]
async fn test_exit_client_drains_queue() -> Result<()> {
    let gw = TestGateway::start()?;
    let mut client = gw.connect().await?;
    let registry = gw.gateway.registry();

    for seq in 1..=5 {
        registry.enqueue_message(&client.id, Envelope::notify_success(seq))?;
    }
    // Let the pool hand the messages to the connection
    sleep(Duration::from_millis(50)).await;
    registry.exit_client(&client.id)?;

    let seqs: Vec<i64> = client
        .expect_closed()
        .await?
        .into_iter()
        .filter(|f| f.action == Action::NotifySuccess)
        .map(|f| f.seq)
        .collect();
    assert_eq!(seqs, vec![1, 2, 3, 4, 5]);

    assert!(registry.exit_client(&client.id).is_err());
    assert!(registry
        .enqueue_message(&client.id, Envelope::heartbeat())
        .unwrap_err()
        .is_not_exist());
    Ok(())
}

#[tokio::test]
async fn test_update_client_secrets_changes_ticket_secret() -> Result<()> {
    let gw = TestGateway::start()?;
    let user = unique_user();
    let mut client = gw.connect().await?;
    client.send(&authenticate(1, &encrypt(&credentials(&user, "", "")))).await?;
    assert_eq!(client.recv_non_heartbeat().await?.action, Action::NotifySuccess);

    let id = Identity::from_uid(user.as_str());
    let updated = gw.gateway.registry().update_client_secrets(
        &id,
        im_core::ClientSecrets {
            message_deliver_secret: "rotated".to_string(),
            online_state_secret: String::new(),
        },
    )?;
    assert!(updated);

    // Tickets derived from the old secret no longer pass
    client.send(&chat_message(2, &user, "alice", "hi")).await?;
    let reply = client.recv_non_heartbeat().await?;
    assert_eq!(reply.data_str(), Some("ticket expired"));
    Ok(())
}

// ============================================================================
// WebSocket & HTTP
// ============================================================================

#[tokio::test]
async fn test_websocket_round_trip() -> Result<()> {
    let server = TestServer::start().await?;
    let (mut ws, _) = connect_async(server.ws_url()).await?;

    let next_envelope = |msg: Option<Result<Message, tungstenite::Error>>| -> Result<Envelope> {
        match msg {
            Some(Ok(Message::Text(text))) => Ok(Envelope::from_json(&text)?),
            other => anyhow::bail!("unexpected frame: {other:?}"),
        }
    };

    let hello = next_envelope(timeout(WAIT, ws.next()).await?)?;
    assert_eq!(hello.action, Action::Hello);
    let payload: ServerHello = hello.decode_data()?;
    assert!(Identity::parse(&payload.temp_id).is_temp());

    let request = Envelope::new(31, Action::parse("api.unknown"));
    ws.send(Message::Text(request.to_json()?)).await?;

    let reply = next_envelope(timeout(WAIT, ws.next()).await?)?;
    assert_eq!(reply.action, Action::NotifyUnknownAction);
    assert_eq!(reply.seq, 31);
    assert_eq!(reply.data_str(), Some("api.unknown"));

    assert_eq!(server.gateway.registry().connection_count(), 1);
    ws.close(None).await?;

    timeout(WAIT, async {
        while server.gateway.registry().connection_count() > 0 {
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await?;
    Ok(())
}

#[tokio::test]
async fn test_binary_frame_is_a_protocol_error() -> Result<()> {
    let server = TestServer::start().await?;
    let (mut ws, _) = connect_async(server.ws_url()).await?;
    timeout(WAIT, ws.next()).await?;

    ws.send(Message::Binary(vec![1, 2, 3])).await?;

    match timeout(WAIT, ws.next()).await? {
        Some(Ok(Message::Text(text))) => {
            assert_eq!(Envelope::from_json(&text)?.action, Action::NotifyError);
        }
        other => anyhow::bail!("unexpected frame: {other:?}"),
    }
    Ok(())
}

#[tokio::test]
async fn test_health_and_stats() -> Result<()> {
    let server = TestServer::start().await?;

    let response = server.get("/health").await?;
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(response.text().await?, "OK");

    let stats: serde_json::Value = server.get("/stats").await?.json().await?;
    assert_eq!(stats["gateway_id"], "gw-test");
    assert_eq!(stats["connections"], 0);
    assert_eq!(stats["pool"]["workers"], 4);
    Ok(())
}
