//! Handler error types

use im_core::{Envelope, GatewayError};
use thiserror::Error;

/// Handler error type
///
/// Each variant is answered to the client; none of them closes the connection.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// Credential could not be decoded
    #[error("invalid authenticate message")]
    InvalidCredential,

    /// Credential older than the configured TTL
    #[error("credential expired")]
    CredentialExpired,

    /// No secret key configured on this gateway
    #[error("authentication unavailable")]
    AuthenticationUnavailable,

    /// Registry refused the identity change
    #[error("{0}")]
    Gateway(#[from] GatewayError),

    /// Delivery check rejected the message
    #[error("forbidden: {0}")]
    Forbidden(&'static str),
}

impl HandlerError {
    /// Reply sent to the client for request `seq`
    pub fn to_notification(&self, seq: i64) -> Envelope {
        match self {
            Self::Forbidden(reason) => Envelope::notify_forbidden(seq, *reason),
            _ => Envelope::notify_error(seq, self.to_string()),
        }
    }
}

/// Handler result type
pub type HandlerResult<T> = Result<T, HandlerError>;
