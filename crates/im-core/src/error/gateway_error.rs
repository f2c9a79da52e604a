//! Gateway errors - error types returned by the session registry and connections

use thiserror::Error;

use crate::value_objects::Identity;

/// Errors surfaced to callers of the gateway's public operations
///
/// Identity errors are always recoverable by the caller (retry with another
/// identity, or evict the incumbent). Capacity problems are never reported here;
/// they are dropped and counted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    // =========================================================================
    // Identity Errors
    // =========================================================================
    #[error("client does not exist: {0}")]
    ClientNotExist(Identity),

    #[error("id already exist: {0}")]
    IdentityAlreadyExists(Identity),

    // =========================================================================
    // Lifecycle Errors
    // =========================================================================
    #[error("client closed: {0}")]
    ClientClosed(Identity),
}

impl GatewayError {
    /// Get an error code string for notifications and logs
    pub fn code(&self) -> &'static str {
        match self {
            Self::ClientNotExist(_) => "CLIENT_NOT_EXIST",
            Self::IdentityAlreadyExists(_) => "ID_ALREADY_EXIST",
            Self::ClientClosed(_) => "CLIENT_CLOSED",
        }
    }

    /// Identity the error refers to
    pub fn identity(&self) -> &Identity {
        match self {
            Self::ClientNotExist(id) | Self::IdentityAlreadyExists(id) | Self::ClientClosed(id) => id,
        }
    }

    /// Check if this is a "not found" error
    pub fn is_not_exist(&self) -> bool {
        matches!(self, Self::ClientNotExist(_))
    }

    /// Check if this is an identity collision
    pub fn is_already_exists(&self) -> bool {
        matches!(self, Self::IdentityAlreadyExists(_))
    }

    /// Check if the target connection is shutting down
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::ClientClosed(_))
    }
}

/// Result type for gateway operations
pub type GatewayResult<T> = Result<T, GatewayError>;
