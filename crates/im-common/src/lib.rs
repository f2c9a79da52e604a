//! # im-common
//!
//! Shared utilities including configuration, error handling, credential crypto, and telemetry.

pub mod auth;
pub mod config;
pub mod error;
pub mod telemetry;

// Re-export commonly used types at crate root
pub use auth::{CredentialCodec, CredentialError, DeliveryTicket, TicketError};
pub use config::{
    AppConfig, AppSettings, AuthConfig, ConfigError, ConnectionSettings, Environment,
    GatewayServerConfig, HeartbeatConfig, TimerConfig, WorkerPoolConfig,
};
pub use error::{AppError, AppResult};
pub use telemetry::{
    try_init_tracing, try_init_tracing_with_config, LogFormat, TracingConfig, TracingError,
};
