//! Session registry
//!
//! Maps identities to live connections. Every mutation runs under one write
//! lock, so identity reassignment is atomic and online/offline events come out
//! in the order the mutations happened.

use super::{MessageHandler, NoopHandler};
use crate::connection::Connection;
use crate::handlers::Authenticator;
use crate::pool::{PoolStats, WorkerPool};
use im_core::{ClientInfo, ClientSecrets, Envelope, GatewayError, GatewayResult, Identity};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;

type SharedHandler = Arc<RwLock<Arc<dyn MessageHandler>>>;

/// Snapshot of registry counters
#[derive(Debug, Clone, Serialize)]
pub struct RegistryStats {
    pub gateway_id: String,
    pub connections: usize,
    pub online_events: u64,
    pub offline_events: u64,
    /// Deliveries refused by a saturated worker pool
    pub dropped_messages: u64,
    pub pool: PoolStats,
}

/// Central `Identity → Connection` map of one gateway
pub struct SessionRegistry {
    gateway_id: String,
    clients: RwLock<HashMap<Identity, Arc<Connection>>>,
    pool: WorkerPool,
    authenticator: Option<Authenticator>,

    handler: SharedHandler,
    events: mpsc::UnboundedSender<Envelope>,

    online_events: AtomicU64,
    offline_events: AtomicU64,
    dropped: AtomicU64,
}

impl SessionRegistry {
    /// Create a registry and start its event pump
    ///
    /// Must be called within a tokio runtime.
    pub fn new(
        gateway_id: impl Into<String>,
        pool: WorkerPool,
        authenticator: Option<Authenticator>,
    ) -> Arc<Self> {
        let gateway_id = gateway_id.into();
        let handler: SharedHandler = Arc::new(RwLock::new(Arc::new(NoopHandler)));
        let (events, rx) = mpsc::unbounded_channel();

        tokio::spawn(pump_events(
            rx,
            Arc::clone(&handler),
            ClientInfo::gateway_placeholder(&gateway_id),
        ));

        Arc::new(Self {
            gateway_id,
            clients: RwLock::new(HashMap::new()),
            pool,
            authenticator,
            handler,
            events,
            online_events: AtomicU64::new(0),
            offline_events: AtomicU64::new(0),
            dropped: AtomicU64::new(0),
        })
    }

    /// ID of this gateway
    pub fn gateway_id(&self) -> &str {
        &self.gateway_id
    }

    /// Authenticator, if a secret key is configured
    pub fn authenticator(&self) -> Option<&Authenticator> {
        self.authenticator.as_ref()
    }

    /// Replace the external message handler
    pub fn set_message_handler(&self, handler: Arc<dyn MessageHandler>) {
        *self.handler.write() = handler;
    }

    /// Current external message handler
    pub fn message_handler(&self) -> Arc<dyn MessageHandler> {
        Arc::clone(&self.handler.read())
    }

    // =========================================================================
    // Mutations
    // =========================================================================

    /// Register a connection under its current identity
    ///
    /// The identity's gateway part is rewritten to this gateway.
    pub fn add_client(self: &Arc<Self>, conn: &Arc<Connection>) -> GatewayResult<()> {
        let id = conn.id().with_gateway(self.gateway_id.as_str());

        {
            let mut clients = self.clients.write();
            if clients.contains_key(&id) {
                return Err(GatewayError::IdentityAlreadyExists(id));
            }
            conn.set_id(id.clone());
            conn.attach(Arc::downgrade(self));
            clients.insert(id.clone(), Arc::clone(conn));
            self.emit_online(&id);
        }

        tracing::debug!(id = %id, "Client added");
        Ok(())
    }

    /// Move a connection from `old` to `new`
    ///
    /// Succeeds without events when `new` already names the same connection.
    pub fn set_client_id(&self, old: &Identity, new: &Identity) -> GatewayResult<()> {
        self.rebind(old, new, |_| {})
    }

    /// [`set_client_id`](Self::set_client_id), then `update` the moved
    /// connection before the write lock is released
    ///
    /// `update` also runs when `new` already names the connection. It must not
    /// call back into the registry.
    pub fn rebind<F>(&self, old: &Identity, new: &Identity, update: F) -> GatewayResult<()>
    where
        F: FnOnce(&Arc<Connection>),
    {
        let new = new.with_gateway(self.gateway_id.as_str());
        let mut clients = self.clients.write();

        let conn = clients
            .get(old)
            .cloned()
            .ok_or_else(|| GatewayError::ClientNotExist(old.clone()))?;

        if let Some(bound) = clients.get(&new) {
            if Arc::ptr_eq(bound, &conn) {
                update(&conn);
                return Ok(());
            }
            return Err(GatewayError::IdentityAlreadyExists(new));
        }

        clients.remove(old);
        clients.insert(new.clone(), Arc::clone(&conn));
        conn.set_id(new.clone());
        update(&conn);

        self.emit_offline(old);
        self.emit_online(&new);
        drop(clients);

        tracing::debug!(old = %old, new = %new, "Client id changed");
        Ok(())
    }

    /// Remove a client and stop its connection
    pub fn exit_client(&self, id: &Identity) -> GatewayResult<()> {
        let conn = {
            let mut clients = self.clients.write();
            let conn = clients
                .remove(id)
                .ok_or_else(|| GatewayError::ClientNotExist(id.clone()))?;
            self.emit_offline(id);
            conn
        };

        conn.exit();
        tracing::debug!(id = %id, "Client exited");
        Ok(())
    }

    /// Remove `conn` if it is still the one registered under its identity
    pub(crate) fn detach(&self, conn: &Arc<Connection>) {
        let id = conn.id();
        let mut clients = self.clients.write();
        if clients.get(&id).is_some_and(|bound| Arc::ptr_eq(bound, conn)) {
            clients.remove(&id);
            self.emit_offline(&id);
        }
    }

    // =========================================================================
    // Delivery
    // =========================================================================

    /// Queue `message` for the client named `id`
    ///
    /// Never blocks. A saturated worker pool drops the message and still
    /// returns `Ok`.
    pub fn enqueue_message(&self, id: &Identity, message: Envelope) -> GatewayResult<()> {
        let conn = self
            .clients
            .read()
            .get(id)
            .cloned()
            .ok_or_else(|| GatewayError::ClientNotExist(id.clone()))?;

        if !conn.is_running() {
            return Err(GatewayError::ClientClosed(id.clone()));
        }

        let key = conn.serial() as usize;
        let action = message.action.clone();
        let submitted = self.pool.try_submit(key, move || {
            if let Err(e) = conn.enqueue_message(message) {
                tracing::debug!(error = %e, "Delivery to closing client skipped");
            }
        });

        if let Err(e) = submitted {
            let dropped = self.dropped.fetch_add(1, Ordering::Relaxed) + 1;
            tracing::warn!(id = %id, action = %action, error = %e, dropped, "Message dropped");
        }
        Ok(())
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Check if an identity is registered
    pub fn is_online(&self, id: &Identity) -> bool {
        self.clients.read().contains_key(id)
    }

    /// Connection registered under `id`
    pub fn client(&self, id: &Identity) -> Option<Arc<Connection>> {
        self.clients.read().get(id).cloned()
    }

    /// Info of the connection registered under `id`
    pub fn client_info(&self, id: &Identity) -> Option<ClientInfo> {
        self.clients.read().get(id).map(|conn| conn.info())
    }

    /// Info of every registered connection
    pub fn all_clients(&self) -> Vec<ClientInfo> {
        self.clients.read().values().map(|conn| conn.info()).collect()
    }

    /// Number of registered connections
    pub fn connection_count(&self) -> usize {
        self.clients.read().len()
    }

    /// Replace the secrets of an authenticated client
    ///
    /// Returns `Ok(false)` if the client has not authenticated.
    pub fn update_client_secrets(&self, id: &Identity, secrets: ClientSecrets) -> GatewayResult<bool> {
        let conn = self
            .client(id)
            .ok_or_else(|| GatewayError::ClientNotExist(id.clone()))?;
        Ok(conn.update_secrets(secrets))
    }

    /// Current counters
    pub fn stats(&self) -> RegistryStats {
        RegistryStats {
            gateway_id: self.gateway_id.clone(),
            connections: self.connection_count(),
            online_events: self.online_events.load(Ordering::Relaxed),
            offline_events: self.offline_events.load(Ordering::Relaxed),
            dropped_messages: self.dropped.load(Ordering::Relaxed),
            pool: self.pool.stats(),
        }
    }

    /// Exit every client and stop the worker pool
    pub fn shutdown(&self) {
        let clients: Vec<_> = {
            let mut clients = self.clients.write();
            let drained: Vec<_> = clients.drain().collect();
            for (id, _) in &drained {
                self.emit_offline(id);
            }
            drained
        };

        tracing::info!(clients = clients.len(), "Session registry shutting down");
        for (_, conn) in clients {
            conn.exit();
        }
        self.pool.shutdown();
    }

    // Callers hold the write lock so events keep mutation order.

    fn emit_online(&self, id: &Identity) {
        self.online_events.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(Envelope::internal_online(id));
    }

    fn emit_offline(&self, id: &Identity) {
        self.offline_events.fetch_add(1, Ordering::Relaxed);
        let _ = self.events.send(Envelope::internal_offline(id));
    }
}

impl std::fmt::Debug for SessionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionRegistry")
            .field("gateway_id", &self.gateway_id)
            .field("connections", &self.connection_count())
            .finish_non_exhaustive()
    }
}

async fn pump_events(
    mut rx: mpsc::UnboundedReceiver<Envelope>,
    handler: SharedHandler,
    info: ClientInfo,
) {
    while let Some(event) = rx.recv().await {
        let handler = Arc::clone(&handler.read());
        handler.handle(&info, event).await;
    }
    tracing::debug!("Lifecycle event pump stopped");
}
