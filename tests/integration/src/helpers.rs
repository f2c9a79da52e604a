//! Test helpers for integration tests
//!
//! Provides an in-process gateway driven through in-memory transports, a
//! recording message handler, and a real HTTP/WebSocket server for end-to-end
//! checks.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use im_common::AppConfig;
use im_core::{Action, ClientInfo, Envelope, Identity, ServerHello};
use im_gateway::{create_app, Gateway, GatewayState, MemoryPeer, MemoryTransport, MessageHandler};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio::time::timeout;

use crate::fixtures::TEST_SECRET;

/// How long a test waits for any single frame or event
pub const WAIT: Duration = Duration::from_secs(3);

/// Create a test configuration
///
/// Short timer ticks and an authentication secret; `overrides` replace any
/// variable.
pub fn test_config(overrides: &[(&'static str, &str)]) -> Result<AppConfig> {
    let mut vars: HashMap<&'static str, String> = HashMap::from([
        ("GATEWAY_HOST", "127.0.0.1".to_string()),
        ("GATEWAY_PORT", "0".to_string()),
        ("GATEWAY_ID", "gw-test".to_string()),
        ("TIMER_TICK_MS", "10".to_string()),
        ("WORKER_POOL_WORKERS", "4".to_string()),
        ("WORKER_POOL_CAPACITY", "1024".to_string()),
        ("AUTH_SECRET_KEY", TEST_SECRET.to_string()),
    ]);
    for (key, value) in overrides {
        vars.insert(key, (*value).to_string());
    }

    AppConfig::from_lookup(|key| vars.get(key).cloned())
        .map_err(|e| anyhow::anyhow!("Config error: {}", e))
}

// ============================================================================
// Recording handler
// ============================================================================

/// Message handler that records everything it is given
pub struct Recorder {
    tx: mpsc::UnboundedSender<(ClientInfo, Envelope)>,
}

/// Receiving end of a [`Recorder`]
pub struct Recorded {
    rx: Mutex<mpsc::UnboundedReceiver<(ClientInfo, Envelope)>>,
}

impl Recorder {
    pub fn new() -> (Arc<Self>, Recorded) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx }), Recorded { rx: Mutex::new(rx) })
    }
}

#[async_trait]
impl MessageHandler for Recorder {
    async fn handle(&self, info: &ClientInfo, envelope: Envelope) {
        let _ = self.tx.send((info.clone(), envelope));
    }
}

impl Recorded {
    /// Next recorded envelope with `action`, skipping others
    pub async fn next(&self, action: Action) -> Result<(ClientInfo, Envelope)> {
        let mut rx = self.rx.lock().await;
        timeout(WAIT, async {
            while let Some((info, envelope)) = rx.recv().await {
                if envelope.action == action {
                    return Some((info, envelope));
                }
            }
            None
        })
        .await
        .context("timed out waiting for handler call")?
        .context("handler channel closed")
    }

    /// Identities from the next `count` lifecycle events, in order
    pub async fn lifecycle(&self, count: usize) -> Result<Vec<(Action, String)>> {
        let mut rx = self.rx.lock().await;
        let mut events = Vec::with_capacity(count);
        while events.len() < count {
            let (_, envelope) = timeout(WAIT, rx.recv())
                .await
                .context("timed out waiting for lifecycle event")?
                .context("handler channel closed")?;
            if envelope.action.is_internal() {
                let id = envelope.data_str().unwrap_or_default().to_string();
                events.push((envelope.action, id));
            }
        }
        Ok(events)
    }
}

// ============================================================================
// In-process gateway
// ============================================================================

/// Gateway driven through in-memory transports
pub struct TestGateway {
    pub gateway: Arc<Gateway>,
    pub recorded: Recorded,
}

impl TestGateway {
    /// Start a gateway with the default test configuration
    pub fn start() -> Result<Self> {
        Self::start_with_config(&test_config(&[])?)
    }

    /// Start a gateway with a custom config
    pub fn start_with_config(config: &AppConfig) -> Result<Self> {
        let gateway = Arc::new(Gateway::new(config));
        let (recorder, recorded) = Recorder::new();
        gateway.set_message_handler(recorder);
        Ok(Self { gateway, recorded })
    }

    /// Connect a client and consume the server hello
    pub async fn connect(&self) -> Result<TestClient> {
        let mut client = self.connect_raw(64)?;
        let hello = client.recv().await?;
        anyhow::ensure!(hello.action == Action::Hello, "expected hello, got {hello}");
        let payload: ServerHello = hello.decode_data()?;
        anyhow::ensure!(payload.temp_id == client.id.to_string(), "hello names another id");
        Ok(client)
    }

    /// Connect a client without reading anything
    pub fn connect_raw(&self, capacity: usize) -> Result<TestClient> {
        let (transport, peer) = MemoryTransport::pair(capacity);
        let id = self.gateway.handle_connection(transport)?;
        Ok(TestClient { id, peer })
    }
}

impl Drop for TestGateway {
    fn drop(&mut self) {
        self.gateway.shutdown();
    }
}

/// Client end of an in-memory connection
pub struct TestClient {
    /// Identity assigned at connect time
    pub id: Identity,
    pub peer: MemoryPeer,
}

impl TestClient {
    /// Send an envelope
    pub async fn send(&self, envelope: &Envelope) -> Result<()> {
        self.send_raw(envelope.to_json()?).await
    }

    /// Send a raw text frame
    pub async fn send_raw(&self, frame: impl Into<String>) -> Result<()> {
        self.peer.send(frame).await?;
        Ok(())
    }

    /// Receive the next envelope
    pub async fn recv(&mut self) -> Result<Envelope> {
        let frame = timeout(WAIT, self.peer.recv())
            .await
            .context("timed out waiting for a frame")?
            .context("connection closed")?;
        Ok(Envelope::from_json(&frame)?)
    }

    /// Receive the next envelope that is not a heartbeat
    pub async fn recv_non_heartbeat(&mut self) -> Result<Envelope> {
        loop {
            let envelope = self.recv().await?;
            if envelope.action != Action::Heartbeat {
                return Ok(envelope);
            }
        }
    }

    /// Wait for the server to close the transport, discarding frames
    pub async fn expect_closed(&mut self) -> Result<Vec<Envelope>> {
        let mut frames = Vec::new();
        timeout(WAIT, async {
            while let Some(frame) = self.peer.recv().await {
                if let Ok(envelope) = Envelope::from_json(&frame) {
                    frames.push(envelope);
                }
            }
        })
        .await
        .context("connection was not closed")?;
        Ok(frames)
    }
}

// ============================================================================
// Network server
// ============================================================================

/// Gateway served over real TCP
pub struct TestServer {
    pub addr: SocketAddr,
    pub gateway: Arc<Gateway>,
    pub client: reqwest::Client,
    shutdown: Option<oneshot::Sender<()>>,
    _handle: JoinHandle<()>,
}

impl TestServer {
    /// Start a server on an ephemeral port
    pub async fn start() -> Result<Self> {
        let config = test_config(&[])?;
        let gateway = Arc::new(Gateway::new(&config));
        gateway.set_message_handler(Arc::new(im_gateway::registry::UnknownActionHandler::new(
            gateway.registry(),
        )));

        let app = create_app(GatewayState::new(Arc::clone(&gateway), config));

        // Bind to an ephemeral port
        let listener = TcpListener::bind(("127.0.0.1", 0)).await?;
        let addr = listener.local_addr()?;

        let (shutdown, stop) = oneshot::channel::<()>();
        let stopping = Arc::clone(&gateway);
        let handle = tokio::spawn(async move {
            let shutdown = async move {
                let _ = stop.await;
                stopping.shutdown();
            };
            im_gateway::server::serve(listener, app, shutdown).await.ok();
        });

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;

        Ok(Self {
            addr,
            gateway,
            client,
            shutdown: Some(shutdown),
            _handle: handle,
        })
    }

    /// Get base URL for the server
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// WebSocket URL of the gateway
    pub fn ws_url(&self) -> String {
        format!("ws://{}/ws", self.addr)
    }

    /// Make a GET request
    pub async fn get(&self, path: &str) -> Result<reqwest::Response> {
        let url = format!("{}{}", self.base_url(), path);
        Ok(self.client.get(&url).send().await?)
    }
}

impl Drop for TestServer {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }
}
