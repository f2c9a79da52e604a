//! External message handler seam

use super::SessionRegistry;
use async_trait::async_trait;
use im_core::{ClientInfo, Envelope};
use std::sync::{Arc, Weak};

/// Receives business frames and lifecycle events
///
/// Called for every business frame a client sends (after the delivery check)
/// and for `internal.online` / `internal.offline`, whose `info` is the gateway
/// placeholder and whose data is the identity string.
#[async_trait]
pub trait MessageHandler: Send + Sync + 'static {
    async fn handle(&self, info: &ClientInfo, envelope: Envelope);
}

/// Handler that ignores everything
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopHandler;

#[async_trait]
impl MessageHandler for NoopHandler {
    async fn handle(&self, _info: &ClientInfo, _envelope: Envelope) {}
}

/// Handler used when nothing else is wired in
///
/// Logs lifecycle events and answers every business frame with
/// `notify.unknown.action`.
#[derive(Debug)]
pub struct UnknownActionHandler {
    registry: Weak<SessionRegistry>,
}

impl UnknownActionHandler {
    pub fn new(registry: &Arc<SessionRegistry>) -> Self {
        Self {
            registry: Arc::downgrade(registry),
        }
    }
}

#[async_trait]
impl MessageHandler for UnknownActionHandler {
    async fn handle(&self, info: &ClientInfo, envelope: Envelope) {
        if envelope.action.is_internal() {
            tracing::info!(
                action = %envelope.action,
                id = envelope.data_str().unwrap_or_default(),
                "Client lifecycle event"
            );
            return;
        }

        let Some(registry) = self.registry.upgrade() else {
            return;
        };

        tracing::debug!(id = %info.id, action = %envelope.action, "No handler for action");
        let reply = Envelope::notify_unknown_action(envelope.seq, &envelope.action);
        if let Err(e) = registry.enqueue_message(&info.id, reply) {
            tracing::debug!(id = %info.id, error = %e, "Unknown-action reply not delivered");
        }
    }
}
