//! Connection actor
//!
//! One actor per client connection. It owns the transport, runs a read loop and
//! a write loop, tracks liveness with two heartbeat timers, and buffers outbound
//! envelopes in a bounded queue that never blocks producers.

use crate::connection::{ConnectionConfig, FrameReader, FrameWriter, Transport, TransportError};
use crate::handlers::MessageDispatcher;
use crate::registry::SessionRegistry;
use crate::timer::TimingWheel;
use futures::FutureExt;
use im_core::{
    ClientAuthCredentials, ClientFrame, ClientInfo, ClientSecrets, Envelope, GatewayError,
    GatewayResult, Identity,
};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Weak};
use tokio::sync::{mpsc, watch};
use tokio::time::Instant;

/// Connection lifecycle state
///
/// Transitions only move forward: `Running → Closing → Closed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum ConnectionState {
    /// Reading and writing
    Running = 0,
    /// Exit requested; draining or closing the transport
    Closing = 1,
    /// Transport closed
    Closed = 2,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Self::Running,
            1 => Self::Closing,
            _ => Self::Closed,
        }
    }
}

/// Why a loop stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StopReason {
    Requested,
    PeerClosed,
    HeartbeatLost,
    TooManyProtocolErrors,
    TransportFailed,
}

impl StopReason {
    fn as_str(self) -> &'static str {
        match self {
            Self::Requested => "exit requested",
            Self::PeerClosed => "peer closed",
            Self::HeartbeatLost => "heartbeat lost",
            Self::TooManyProtocolErrors => "too many protocol errors",
            Self::TransportFailed => "transport failed",
        }
    }
}

static NEXT_SERIAL: AtomicU64 = AtomicU64::new(1);

/// A single client connection
pub struct Connection {
    serial: u64,
    info: RwLock<ClientInfo>,
    state: AtomicU8,
    config: ConnectionConfig,

    sender: mpsc::Sender<Envelope>,
    receiver: Mutex<Option<mpsc::Receiver<Envelope>>>,
    transport: Mutex<Option<Transport>>,

    credentials: RwLock<Option<ClientAuthCredentials>>,
    registry: RwLock<Weak<SessionRegistry>>,
    wheel: Arc<TimingWheel>,

    stop: watch::Sender<bool>,
    dropped: AtomicU64,
}

impl Connection {
    /// Create a connection actor
    ///
    /// Nothing runs until [`Connection::run`] is called.
    pub fn new(
        id: Identity,
        transport: Transport,
        config: ConnectionConfig,
        wheel: Arc<TimingWheel>,
    ) -> Arc<Self> {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let (stop, _) = watch::channel(false);
        let info = ClientInfo::new(id, transport.addr.clone());

        Arc::new(Self {
            serial: NEXT_SERIAL.fetch_add(1, Ordering::Relaxed),
            info: RwLock::new(info),
            state: AtomicU8::new(ConnectionState::Running as u8),
            config,
            sender,
            receiver: Mutex::new(Some(receiver)),
            transport: Mutex::new(Some(transport)),
            credentials: RwLock::new(None),
            registry: RwLock::new(Weak::new()),
            wheel,
            stop,
            dropped: AtomicU64::new(0),
        })
    }

    // === Accessors ===

    /// Process-unique number of this connection, stable across renames
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Current identity
    pub fn id(&self) -> Identity {
        self.info.read().id.clone()
    }

    /// Snapshot of the client info
    pub fn info(&self) -> ClientInfo {
        self.info.read().clone()
    }

    /// Current lifecycle state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Check if the connection accepts messages
    pub fn is_running(&self) -> bool {
        self.state() == ConnectionState::Running
    }

    /// Connection settings
    pub fn config(&self) -> &ConnectionConfig {
        &self.config
    }

    /// Outbound messages dropped because the queue was full
    pub fn dropped_messages(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }

    /// Registry the connection is attached to, if it is still alive
    pub fn registry(&self) -> Option<Arc<SessionRegistry>> {
        self.registry.read().upgrade()
    }

    pub(crate) fn attach(&self, registry: Weak<SessionRegistry>) {
        *self.registry.write() = registry;
    }

    /// Rename the connection; the registry keeps its map in sync
    pub(crate) fn set_id(&self, id: Identity) {
        self.info.write().id = id;
    }

    pub(crate) fn set_version(&self, version: impl Into<String>) {
        self.info.write().version = version.into();
    }

    // === Credentials ===

    /// Credentials attached by a successful authentication
    pub fn credentials(&self) -> Option<ClientAuthCredentials> {
        self.credentials.read().clone()
    }

    /// Attach authenticated credentials
    pub fn set_credentials(&self, credentials: ClientAuthCredentials) {
        self.info.write().connection_id = credentials.connection_id.clone();
        *self.credentials.write() = Some(credentials);
    }

    /// Forget the credentials (the session was taken over)
    pub fn clear_credentials(&self) {
        *self.credentials.write() = None;
    }

    /// Replace the secrets of attached credentials
    ///
    /// Returns `false` if the connection is not authenticated.
    pub fn update_secrets(&self, secrets: ClientSecrets) -> bool {
        match self.credentials.write().as_mut() {
            Some(credentials) => {
                credentials.secrets = Some(secrets);
                true
            }
            None => false,
        }
    }

    // === Outbound ===

    /// Queue an envelope for the client without waiting
    ///
    /// A full queue drops the envelope and still returns `Ok`.
    pub fn enqueue_message(&self, message: Envelope) -> GatewayResult<()> {
        if !self.is_running() {
            return Err(GatewayError::ClientClosed(self.id()));
        }

        match self.sender.try_send(message) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full(message)) => {
                let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
                tracing::warn!(
                    id = %self.id(),
                    action = %message.action,
                    dropped,
                    "Outbound queue full, message dropped"
                );
                Ok(())
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(GatewayError::ClientClosed(self.id())),
        }
    }

    // === Lifecycle ===

    /// Start the read and write loops
    ///
    /// Must be called within a tokio runtime. Only the first call has an effect.
    pub fn run(self: &Arc<Self>) {
        if !self.is_running() {
            return;
        }
        let Some(transport) = self.transport.lock().take() else {
            return;
        };
        let Some(receiver) = self.receiver.lock().take() else {
            return;
        };

        tracing::info!(id = %self.id(), addr = %transport.addr, "Connection running");

        let Transport { reader, writer, .. } = transport;

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let result = AssertUnwindSafe(Arc::clone(&conn).read_loop(reader))
                .catch_unwind()
                .await;
            if result.is_err() {
                tracing::error!(id = %conn.id(), "Read loop panicked");
                conn.exit();
            }
        });

        let conn = Arc::clone(self);
        tokio::spawn(async move {
            let result = AssertUnwindSafe(Arc::clone(&conn).write_loop(writer, receiver))
                .catch_unwind()
                .await;
            if result.is_err() {
                tracing::error!(id = %conn.id(), "Write loop panicked");
                conn.exit();
                conn.set_state(ConnectionState::Closed);
            }
        });
    }

    /// Stop the connection
    ///
    /// Idempotent. Detaches from the registry, stops reading at once, and either
    /// drains the outbound queue before closing the transport or, with
    /// `close_immediately`, discards it.
    pub fn exit(self: &Arc<Self>) {
        if self
            .state
            .compare_exchange(
                ConnectionState::Running as u8,
                ConnectionState::Closing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return;
        }

        tracing::debug!(id = %self.id(), "Connection exiting");

        if let Some(registry) = self.registry() {
            registry.detach(self);
        }

        self.stop.send_replace(true);

        // Never ran: nobody else will close the transport.
        if self.transport.lock().take().is_some() {
            self.receiver.lock().take();
            self.set_state(ConnectionState::Closed);
        }
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.fetch_max(state as u8, Ordering::AcqRel);
    }

    async fn read_loop(self: Arc<Self>, mut reader: Box<dyn FrameReader>) {
        let mut stop = self.stop.subscribe();
        let interval = self.config.client_heartbeat;
        let mut client_heartbeat = self.wheel.after(interval);
        // Frames only stamp this; the timer re-arms for the remainder when it fires.
        let mut quiet_since = Instant::now();
        let mut heartbeat_lost = 0u32;
        let mut protocol_errors = 0u32;

        let reason = loop {
            tokio::select! {
                biased;
                () = stopped(&mut stop) => break StopReason::Requested,
                () = client_heartbeat.fired() => {
                    let idle = quiet_since.elapsed();
                    if idle < interval {
                        client_heartbeat = self.wheel.after(interval - idle);
                    } else {
                        heartbeat_lost += 1;
                        if heartbeat_lost >= self.config.heartbeat_lost_limit {
                            break StopReason::HeartbeatLost;
                        }
                        tracing::debug!(id = %self.id(), heartbeat_lost, "Client heartbeat missed");
                        let _ = self.enqueue_message(Envelope::heartbeat());
                        quiet_since = Instant::now();
                        client_heartbeat = self.wheel.after(interval);
                    }
                }
                frame = reader.read_frame() => match frame {
                    Ok(Some(text)) => match Envelope::from_json(&text) {
                        Ok(envelope) => {
                            heartbeat_lost = 0;
                            quiet_since = Instant::now();
                            self.info.write().touch();

                            match ClientFrame::try_from(envelope) {
                                Ok(frame) => {
                                    protocol_errors = 0;
                                    self.dispatch(frame).await;
                                }
                                Err(e) => {
                                    if self.protocol_error(&mut protocol_errors, e.seq(), &e.to_string()) {
                                        break StopReason::TooManyProtocolErrors;
                                    }
                                }
                            }
                        }
                        Err(e) => {
                            tracing::debug!(id = %self.id(), error = %e, "Failed to decode frame");
                            if self.protocol_error(&mut protocol_errors, 0, "invalid message") {
                                break StopReason::TooManyProtocolErrors;
                            }
                        }
                    },
                    Ok(None) => break StopReason::PeerClosed,
                    Err(TransportError::InvalidFrame(e)) => {
                        tracing::debug!(id = %self.id(), error = %e, "Invalid frame");
                        if self.protocol_error(&mut protocol_errors, 0, &e) {
                            break StopReason::TooManyProtocolErrors;
                        }
                    }
                    Err(e) => {
                        tracing::debug!(id = %self.id(), error = %e, "Read failed");
                        break StopReason::TransportFailed;
                    }
                },
            }
        };

        tracing::info!(id = %self.id(), reason = reason.as_str(), "Read loop stopped");
        if reason != StopReason::Requested {
            self.exit();
        }
    }

    /// Report a protocol error to the client; returns `true` once the limit is hit
    fn protocol_error(&self, count: &mut u32, seq: i64, message: &str) -> bool {
        *count += 1;
        let _ = self.enqueue_message(Envelope::notify_error(seq, message));
        *count >= self.config.max_protocol_errors
    }

    async fn dispatch(self: &Arc<Self>, frame: ClientFrame) {
        let seq = frame.seq();
        if let Err(e) = MessageDispatcher::dispatch(self, frame).await {
            tracing::debug!(id = %self.id(), error = %e, "Handler rejected frame");
            let _ = self.enqueue_message(e.to_notification(seq));
        }
    }

    async fn write_loop(
        self: Arc<Self>,
        mut writer: Box<dyn FrameWriter>,
        mut receiver: mpsc::Receiver<Envelope>,
    ) {
        let mut stop = self.stop.subscribe();
        let interval = self.config.server_heartbeat;
        let mut server_heartbeat = self.wheel.after(interval);
        let mut last_write = Instant::now();

        let reason = loop {
            tokio::select! {
                biased;
                () = stopped(&mut stop) => break StopReason::Requested,
                () = server_heartbeat.fired() => {
                    let idle = last_write.elapsed();
                    if idle < interval {
                        server_heartbeat = self.wheel.after(interval - idle);
                    } else {
                        let _ = self.enqueue_message(Envelope::heartbeat());
                        last_write = Instant::now();
                        server_heartbeat = self.wheel.after(interval);
                    }
                }
                message = receiver.recv() => {
                    let Some(message) = message else { break StopReason::Requested };
                    let written = if self.config.close_immediately {
                        // A stalled peer must not hold up an immediate close.
                        tokio::select! {
                            biased;
                            () = stopped(&mut stop) => break StopReason::Requested,
                            written = write_envelope(writer.as_mut(), &message) => written,
                        }
                    } else {
                        write_envelope(writer.as_mut(), &message).await
                    };
                    if let Err(e) = written {
                        tracing::debug!(id = %self.id(), error = %e, "Write failed");
                        break StopReason::TransportFailed;
                    }
                    last_write = Instant::now();
                }
            }
        };

        let forced = self.config.close_immediately || reason == StopReason::TransportFailed;
        if reason == StopReason::TransportFailed {
            self.exit();
        } else if !forced {
            let mut drained = 0usize;
            while let Ok(message) = receiver.try_recv() {
                if write_envelope(writer.as_mut(), &message).await.is_err() {
                    break;
                }
                drained += 1;
            }
            tracing::debug!(id = %self.id(), drained, "Outbound queue drained");
        }

        drop(receiver);
        if forced {
            // No close handshake: it would wait on the same peer.
            drop(writer);
        } else if let Err(e) = writer.close().await {
            tracing::debug!(id = %self.id(), error = %e, "Transport close failed");
        }
        self.set_state(ConnectionState::Closed);
        tracing::info!(id = %self.id(), reason = reason.as_str(), "Connection closed");
    }
}

/// Resolve once `stop` is set
async fn stopped(stop: &mut watch::Receiver<bool>) {
    // The returned `Ref` holds a lock guard; it must not reach the caller.
    let _ = stop.wait_for(|stopped| *stopped).await;
}

async fn write_envelope(writer: &mut dyn FrameWriter, message: &Envelope) -> Result<(), TransportError> {
    match message.to_json() {
        Ok(json) => writer.write_frame(json).await,
        Err(e) => {
            // Dropping the frame keeps the connection usable.
            tracing::error!(action = %message.action, error = %e, "Failed to encode envelope");
            Ok(())
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("serial", &self.serial)
            .field("id", &self.id())
            .field("state", &self.state())
            .field("dropped", &self.dropped_messages())
            .finish_non_exhaustive()
    }
}
