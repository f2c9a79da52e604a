//! Hello handler

use super::HandlerResult;
use crate::connection::Connection;
use im_core::HelloPayload;
use std::sync::Arc;

/// Handles the client greeting
pub struct HelloHandler;

impl HelloHandler {
    /// Record the client version
    pub fn handle(connection: &Arc<Connection>, payload: HelloPayload) -> HandlerResult<()> {
        tracing::debug!(
            id = %connection.id(),
            client_version = %payload.client_version,
            client_name = %payload.client_name,
            client_type = %payload.client_type,
            "Client hello"
        );
        connection.set_version(payload.client_version);
        Ok(())
    }
}
