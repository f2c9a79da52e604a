//! Client frame handlers
//!
//! Gateway-level frames are handled here; business frames pass the delivery
//! check and go to the registry's external message handler.

mod authenticate;
mod delivery;
mod error;
mod heartbeat;
mod hello;

pub use authenticate::{AuthenticateHandler, Authenticator};
pub use delivery::DeliveryCheck;
pub use error::{HandlerError, HandlerResult};
pub use heartbeat::HeartbeatHandler;
pub use hello::HelloHandler;

use crate::connection::Connection;
use im_core::ClientFrame;
use std::sync::Arc;

/// Dispatch decoded client frames to their handlers
pub struct MessageDispatcher;

impl MessageDispatcher {
    /// Handle one frame from `connection`
    ///
    /// An error is answered to the client by the caller; it never closes the
    /// connection.
    pub async fn dispatch(connection: &Arc<Connection>, frame: ClientFrame) -> HandlerResult<()> {
        match frame {
            ClientFrame::Hello { payload, .. } => HelloHandler::handle(connection, payload),
            ClientFrame::Heartbeat => HeartbeatHandler::handle(connection),
            ClientFrame::Authenticate { seq, credential } => {
                let registry = connection
                    .registry()
                    .ok_or(HandlerError::AuthenticationUnavailable)?;
                AuthenticateHandler::handle(&registry, connection, seq, credential)
            }
            ClientFrame::Message(mut envelope) => {
                let Some(registry) = connection.registry() else {
                    tracing::debug!(
                        id = %connection.id(),
                        action = %envelope.action,
                        "Detached connection, message dropped"
                    );
                    return Ok(());
                };

                if registry.authenticator().is_some() {
                    DeliveryCheck::check(connection, &mut envelope)?;
                } else {
                    envelope.from = connection.id().uid().to_string();
                }

                let info = connection.info();
                registry.message_handler().handle(&info, envelope).await;
                Ok(())
            }
        }
    }
}
