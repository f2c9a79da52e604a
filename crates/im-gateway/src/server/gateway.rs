//! Gateway front door
//!
//! Owns the shared services (timing wheel, worker pool, registry) and turns
//! accepted transports into registered connections.

use crate::connection::{Connection, ConnectionConfig, Transport};
use crate::handlers::Authenticator;
use crate::pool::WorkerPool;
use crate::registry::{MessageHandler, SessionRegistry};
use crate::timer::TimingWheel;
use im_common::AppConfig;
use im_core::{Envelope, GatewayResult, Identity, ServerHello};
use std::sync::Arc;

/// Version reported in the server `hello`
pub const SERVER_VERSION: &str = env!("CARGO_PKG_VERSION");

/// One gateway instance
pub struct Gateway {
    connection: ConnectionConfig,
    wheel: Arc<TimingWheel>,
    registry: Arc<SessionRegistry>,
}

impl Gateway {
    /// Build a gateway from configuration and start its timing wheel
    ///
    /// Must be called within a tokio runtime.
    pub fn new(config: &AppConfig) -> Self {
        let wheel = TimingWheel::new(
            config.timer.tick(),
            config.timer.wheel_slots,
            config.timer.wheel_levels,
        );
        let pool = WorkerPool::new(config.pool.workers, config.pool.capacity);
        let authenticator = Authenticator::from_config(&config.auth);

        if authenticator.is_none() {
            tracing::warn!("AUTH_SECRET_KEY not set, authentication disabled");
        }

        Self::with_parts(
            config.gateway.id.as_str(),
            ConnectionConfig::from(config),
            wheel,
            pool,
            authenticator,
        )
    }

    /// Assemble a gateway from prepared parts and start the timing wheel
    pub fn with_parts(
        gateway_id: &str,
        connection: ConnectionConfig,
        wheel: Arc<TimingWheel>,
        pool: WorkerPool,
        authenticator: Option<Authenticator>,
    ) -> Self {
        wheel.start();
        let registry = SessionRegistry::new(gateway_id, pool, authenticator);

        tracing::info!(
            gateway_id,
            tick_ms = wheel.tick().as_millis() as u64,
            "Gateway initialized"
        );

        Self {
            connection,
            wheel,
            registry,
        }
    }

    /// Accept a client transport
    ///
    /// The connection starts under a temporary identity, which is returned and
    /// announced to the client in the server `hello`.
    pub fn handle_connection(&self, transport: Transport) -> GatewayResult<Identity> {
        let addr = transport.addr.clone();
        let conn = Connection::new(
            Identity::generate_temp(self.registry.gateway_id()),
            transport,
            self.connection.clone(),
            Arc::clone(&self.wheel),
        );

        self.registry.add_client(&conn)?;
        conn.run();

        let id = conn.id();
        let hello = ServerHello::new(
            SERVER_VERSION,
            id.to_string(),
            self.connection.client_heartbeat.as_millis() as u64,
        );
        conn.enqueue_message(Envelope::hello(&hello))?;

        tracing::info!(id = %id, addr = %addr, "Client connected");
        Ok(id)
    }

    /// Session registry
    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Settings applied to new connections
    pub fn connection_config(&self) -> &ConnectionConfig {
        &self.connection
    }

    /// Install the external message handler
    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        self.registry.set_message_handler(handler);
    }

    /// Disconnect everyone and stop the timing wheel
    pub fn shutdown(&self) {
        self.registry.shutdown();
        self.wheel.stop();
        tracing::info!("Gateway stopped");
    }
}

impl std::fmt::Debug for Gateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Gateway")
            .field("registry", &self.registry)
            .field("connection", &self.connection)
            .finish_non_exhaustive()
    }
}
