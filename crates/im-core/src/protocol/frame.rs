//! Typed client frames
//!
//! An inbound [`Envelope`] is resolved once, at the boundary, into the frame the
//! gateway acts on. Payload errors surface here instead of inside handlers.

use super::{Action, Envelope, HelloPayload};
use crate::entities::EncryptedCredential;

/// A decoded frame received from a client
#[derive(Debug, Clone, PartialEq)]
pub enum ClientFrame {
    /// Client greeting carrying its version
    Hello { seq: i64, payload: HelloPayload },
    /// Keep-alive
    Heartbeat,
    /// Credential presentation
    Authenticate {
        seq: i64,
        credential: EncryptedCredential,
    },
    /// Any business message, passed on to the message handler
    Message(Envelope),
}

impl ClientFrame {
    /// Request sequence of the frame
    pub fn seq(&self) -> i64 {
        match self {
            Self::Hello { seq, .. } | Self::Authenticate { seq, .. } => *seq,
            Self::Heartbeat => 0,
            Self::Message(env) => env.seq,
        }
    }
}

/// Errors resolving an envelope into a client frame
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FrameError {
    #[error("action {action} is reserved for the gateway")]
    ReservedAction { seq: i64, action: Action },

    #[error("invalid {action} message")]
    InvalidPayload { seq: i64, action: Action },
}

impl FrameError {
    /// Sequence of the rejected request
    pub fn seq(&self) -> i64 {
        match self {
            Self::ReservedAction { seq, .. } | Self::InvalidPayload { seq, .. } => *seq,
        }
    }

    /// Action of the rejected request
    pub fn action(&self) -> &Action {
        match self {
            Self::ReservedAction { action, .. } | Self::InvalidPayload { action, .. } => action,
        }
    }
}

impl TryFrom<Envelope> for ClientFrame {
    type Error = FrameError;

    fn try_from(env: Envelope) -> Result<Self, Self::Error> {
        let seq = env.seq;
        match env.action {
            Action::Hello => {
                // A hello without payload is a greeting with no version info.
                let payload = if env.data.is_some() {
                    env.decode_data().map_err(|_| FrameError::InvalidPayload {
                        seq,
                        action: Action::Hello,
                    })?
                } else {
                    HelloPayload::default()
                };
                Ok(Self::Hello { seq, payload })
            }
            Action::Heartbeat => Ok(Self::Heartbeat),
            Action::Authenticate => {
                let credential = env.decode_data().map_err(|_| FrameError::InvalidPayload {
                    seq,
                    action: Action::Authenticate,
                })?;
                Ok(Self::Authenticate { seq, credential })
            }
            ref action if action.is_internal() => Err(FrameError::ReservedAction {
                seq,
                action: action.clone(),
            }),
            _ => Ok(Self::Message(env)),
        }
    }
}
