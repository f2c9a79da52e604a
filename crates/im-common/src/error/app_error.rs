//! Application error types
//!
//! Errors raised while bootstrapping and serving the gateway.

use im_core::GatewayError;
use std::fmt;

use crate::config::ConfigError;
use crate::telemetry::TracingError;

/// Application-wide error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    // Startup errors
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Tracing(#[from] TracingError),

    #[error("Failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    // Runtime errors
    #[error("Server error: {0}")]
    Server(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    // Internal errors
    #[error("Internal server error")]
    Internal(#[source] anyhow::Error),
}

impl AppError {
    /// Get error code for logs and health responses
    #[must_use]
    pub fn error_code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Tracing(_) => "TRACING_ERROR",
            Self::Bind { .. } => "BIND_ERROR",
            Self::Server(_) => "SERVER_ERROR",
            Self::Gateway(e) => e.code(),
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Check if the error happened before the gateway started serving
    #[must_use]
    pub fn is_startup_error(&self) -> bool {
        matches!(self, Self::Config(_) | Self::Tracing(_) | Self::Bind { .. })
    }

    /// Create a server error
    #[must_use]
    pub fn server(msg: impl fmt::Display) -> Self {
        Self::Server(msg.to_string())
    }

    /// Create an internal error from any error
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }
}

/// Result type alias for application operations
pub type AppResult<T> = Result<T, AppError>;
