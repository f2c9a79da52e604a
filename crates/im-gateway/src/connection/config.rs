//! Per-connection settings

use im_common::AppConfig;
use std::time::Duration;

/// Heartbeat, queue, and close policy of one connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// Client silence tolerated per heartbeat interval
    pub client_heartbeat: Duration,
    /// Idle time after which the server sends a heartbeat
    pub server_heartbeat: Duration,
    /// Missed client intervals before the connection is dropped
    pub heartbeat_lost_limit: u32,
    /// Discard queued frames on exit instead of draining them
    pub close_immediately: bool,
    /// Outbound queue slots
    pub queue_capacity: usize,
    /// Consecutive protocol errors before the connection is dropped
    pub max_protocol_errors: u32,
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            client_heartbeat: Duration::from_secs(30),
            server_heartbeat: Duration::from_secs(30),
            heartbeat_lost_limit: 3,
            close_immediately: false,
            queue_capacity: 100,
            max_protocol_errors: 10,
        }
    }
}

impl From<&AppConfig> for ConnectionConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            client_heartbeat: config.heartbeat.client_interval(),
            server_heartbeat: config.heartbeat.server_interval(),
            heartbeat_lost_limit: config.heartbeat.lost_limit,
            close_immediately: config.connection.close_immediately,
            queue_capacity: config.connection.queue_capacity,
            max_protocol_errors: config.connection.max_protocol_errors,
        }
    }
}
