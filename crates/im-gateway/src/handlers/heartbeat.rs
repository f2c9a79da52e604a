//! Heartbeat handler

use super::HandlerResult;
use crate::connection::Connection;
use std::sync::Arc;

/// Handles client heartbeats
///
/// The read loop already reset the liveness timer when the frame arrived, so
/// there is nothing left to do but note it.
pub struct HeartbeatHandler;

impl HeartbeatHandler {
    pub fn handle(connection: &Arc<Connection>) -> HandlerResult<()> {
        tracing::trace!(id = %connection.id(), "Heartbeat received");
        Ok(())
    }
}
