//! Configuration structs

mod app_config;

pub use app_config::{
    AppConfig, AppSettings, AuthConfig, ConfigError, ConnectionSettings, Environment,
    GatewayServerConfig, HeartbeatConfig, TimerConfig, WorkerPoolConfig,
};
