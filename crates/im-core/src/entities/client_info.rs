//! Client info - snapshot of a connection's identity and metadata

use chrono::Utc;
use serde::Serialize;

use crate::value_objects::Identity;

/// Information about a connected client
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClientInfo {
    /// Current identity of the connection
    pub id: Identity,

    /// Connection ID generated by the client (set on authentication)
    pub connection_id: String,

    /// Client version (set by `hello`)
    pub version: String,

    /// Last time a frame was received (unix seconds)
    pub alive_at: i64,

    /// Time the connection was accepted (unix seconds)
    pub connection_at: i64,

    /// Gateway the client is connected to
    pub gateway: String,

    /// Remote address of the client
    pub addr: String,
}

impl ClientInfo {
    /// Create info for a freshly accepted connection
    pub fn new(id: Identity, addr: impl Into<String>) -> Self {
        let now = Utc::now().timestamp();
        Self {
            gateway: id.gateway().to_string(),
            id,
            connection_id: String::new(),
            version: String::new(),
            alive_at: now,
            connection_at: now,
            addr: addr.into(),
        }
    }

    /// Info used for gateway-originated events that belong to no client
    pub fn gateway_placeholder(gateway: &str) -> Self {
        Self::new(Identity::new(gateway, "", ""), "")
    }

    /// Mark the client as alive now
    pub fn touch(&mut self) {
        self.alive_at = Utc::now().timestamp();
    }

    /// Seconds since the connection was accepted
    pub fn connected_for(&self) -> i64 {
        Utc::now().timestamp() - self.connection_at
    }
}
