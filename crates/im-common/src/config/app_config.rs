//! Application configuration structs
//!
//! Loads configuration from environment variables (and a `.env` file if present).

use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app: AppSettings,
    pub gateway: GatewayServerConfig,
    pub heartbeat: HeartbeatConfig,
    pub connection: ConnectionSettings,
    pub pool: WorkerPoolConfig,
    pub timer: TimerConfig,
    pub auth: AuthConfig,
}

/// General application settings
#[derive(Debug, Clone, Deserialize)]
pub struct AppSettings {
    #[serde(default = "default_app_name")]
    pub name: String,
    #[serde(default = "default_env")]
    pub env: Environment,
}

/// Environment type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Development,
    Staging,
    Production,
}

impl Environment {
    #[must_use]
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    #[must_use]
    pub fn is_development(&self) -> bool {
        matches!(self, Self::Development)
    }

    fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "production" => Some(Self::Production),
            "staging" => Some(Self::Staging),
            "development" => Some(Self::Development),
            _ => None,
        }
    }
}

/// Gateway listener configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    pub port: u16,
    /// Gateway ID, stamped into every identity this gateway issues
    #[serde(default = "default_gateway_id")]
    pub id: String,
}

impl GatewayServerConfig {
    #[must_use]
    pub fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Heartbeat timing
#[derive(Debug, Clone, Deserialize)]
pub struct HeartbeatConfig {
    /// Expected interval between client frames
    #[serde(default = "default_heartbeat_ms")]
    pub client_interval_ms: u64,
    /// Interval of server heartbeats when the outbound side is idle
    #[serde(default = "default_heartbeat_ms")]
    pub server_interval_ms: u64,
    /// Missed client intervals tolerated before disconnecting
    #[serde(default = "default_lost_limit")]
    pub lost_limit: u32,
}

impl HeartbeatConfig {
    #[must_use]
    pub fn client_interval(&self) -> Duration {
        Duration::from_millis(self.client_interval_ms)
    }

    #[must_use]
    pub fn server_interval(&self) -> Duration {
        Duration::from_millis(self.server_interval_ms)
    }
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            client_interval_ms: default_heartbeat_ms(),
            server_interval_ms: default_heartbeat_ms(),
            lost_limit: default_lost_limit(),
        }
    }
}

/// Per-connection settings
#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionSettings {
    #[serde(default)]
    pub close_immediately: bool,
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    #[serde(default = "default_max_protocol_errors")]
    pub max_protocol_errors: u32,
}

impl Default for ConnectionSettings {
    fn default() -> Self {
        Self {
            close_immediately: false,
            queue_capacity: default_queue_capacity(),
            max_protocol_errors: default_max_protocol_errors(),
        }
    }
}

/// Outbound delivery worker pool
#[derive(Debug, Clone, Deserialize)]
pub struct WorkerPoolConfig {
    #[serde(default = "default_pool_capacity")]
    pub capacity: usize,
    #[serde(default = "default_pool_workers")]
    pub workers: usize,
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self {
            capacity: default_pool_capacity(),
            workers: default_pool_workers(),
        }
    }
}

/// Timing wheel geometry
#[derive(Debug, Clone, Deserialize)]
pub struct TimerConfig {
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    #[serde(default = "default_wheel_slots")]
    pub wheel_slots: usize,
    #[serde(default = "default_wheel_levels")]
    pub wheel_levels: usize,
}

impl TimerConfig {
    #[must_use]
    pub fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_ms)
    }
}

impl Default for TimerConfig {
    fn default() -> Self {
        Self {
            tick_ms: default_tick_ms(),
            wheel_slots: default_wheel_slots(),
            wheel_levels: default_wheel_levels(),
        }
    }
}

/// Credential authentication
#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret used to decrypt client credentials; authentication is
    /// unavailable without it
    #[serde(default)]
    pub secret_key: Option<String>,
    #[serde(default = "default_credential_ttl_secs")]
    pub credential_ttl_secs: u64,
}

impl AuthConfig {
    #[must_use]
    pub fn credential_ttl(&self) -> Duration {
        Duration::from_secs(self.credential_ttl_secs)
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            secret_key: None,
            credential_ttl_secs: default_credential_ttl_secs(),
        }
    }
}

// Default value functions
fn default_app_name() -> String {
    "im-gateway".to_string()
}

fn default_env() -> Environment {
    Environment::Development
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_id() -> String {
    "gw1".to_string()
}

fn default_heartbeat_ms() -> u64 {
    30_000
}

fn default_lost_limit() -> u32 {
    3
}

fn default_queue_capacity() -> usize {
    100
}

fn default_max_protocol_errors() -> u32 {
    10
}

fn default_pool_capacity() -> usize {
    300_000
}

fn default_pool_workers() -> usize {
    16
}

fn default_tick_ms() -> u64 {
    500
}

fn default_wheel_slots() -> usize {
    20
}

fn default_wheel_levels() -> usize {
    3
}

fn default_credential_ttl_secs() -> u64 {
    1500
}

impl AppConfig {
    /// Load configuration from environment variables
    ///
    /// # Errors
    /// Returns an error if `GATEWAY_PORT` is missing or a value does not parse
    pub fn from_env() -> Result<Self, ConfigError> {
        // Load .env file if present (ignore errors if not found)
        let _ = dotenvy::dotenv();

        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let vars = Vars(lookup);

        let config = Self {
            app: AppSettings {
                name: vars.string("APP_NAME").unwrap_or_else(default_app_name),
                env: vars
                    .string("APP_ENV")
                    .and_then(|s| Environment::parse(&s))
                    .unwrap_or_default(),
            },
            gateway: GatewayServerConfig {
                host: vars.string("GATEWAY_HOST").unwrap_or_else(default_host),
                port: vars
                    .parsed("GATEWAY_PORT")?
                    .ok_or(ConfigError::MissingVar("GATEWAY_PORT"))?,
                id: vars.string("GATEWAY_ID").unwrap_or_else(default_gateway_id),
            },
            heartbeat: HeartbeatConfig {
                client_interval_ms: vars
                    .parsed("HEARTBEAT_CLIENT_INTERVAL_MS")?
                    .unwrap_or_else(default_heartbeat_ms),
                server_interval_ms: vars
                    .parsed("HEARTBEAT_SERVER_INTERVAL_MS")?
                    .unwrap_or_else(default_heartbeat_ms),
                lost_limit: vars
                    .parsed("HEARTBEAT_LOST_LIMIT")?
                    .unwrap_or_else(default_lost_limit),
            },
            connection: ConnectionSettings {
                close_immediately: vars
                    .parsed("CONNECTION_CLOSE_IMMEDIATELY")?
                    .unwrap_or(false),
                queue_capacity: vars
                    .parsed("CONNECTION_QUEUE_CAPACITY")?
                    .unwrap_or_else(default_queue_capacity),
                max_protocol_errors: vars
                    .parsed("CONNECTION_MAX_PROTOCOL_ERRORS")?
                    .unwrap_or_else(default_max_protocol_errors),
            },
            pool: WorkerPoolConfig {
                capacity: vars
                    .parsed("WORKER_POOL_CAPACITY")?
                    .unwrap_or_else(default_pool_capacity),
                workers: vars
                    .parsed("WORKER_POOL_WORKERS")?
                    .unwrap_or_else(default_pool_workers),
            },
            timer: TimerConfig {
                tick_ms: vars.parsed("TIMER_TICK_MS")?.unwrap_or_else(default_tick_ms),
                wheel_slots: vars
                    .parsed("TIMER_WHEEL_SLOTS")?
                    .unwrap_or_else(default_wheel_slots),
                wheel_levels: vars
                    .parsed("TIMER_WHEEL_LEVELS")?
                    .unwrap_or_else(default_wheel_levels),
            },
            auth: AuthConfig {
                secret_key: vars.string("AUTH_SECRET_KEY").filter(|s| !s.is_empty()),
                credential_ttl_secs: vars
                    .parsed("AUTH_CREDENTIAL_TTL_SECS")?
                    .unwrap_or_else(default_credential_ttl_secs),
            },
        };

        config.validate()?;
        Ok(config)
    }

    /// Reject values the gateway cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        let positive: [(&'static str, u64); 8] = [
            ("HEARTBEAT_CLIENT_INTERVAL_MS", self.heartbeat.client_interval_ms),
            ("HEARTBEAT_SERVER_INTERVAL_MS", self.heartbeat.server_interval_ms),
            ("HEARTBEAT_LOST_LIMIT", u64::from(self.heartbeat.lost_limit)),
            ("CONNECTION_QUEUE_CAPACITY", self.connection.queue_capacity as u64),
            ("WORKER_POOL_CAPACITY", self.pool.capacity as u64),
            ("WORKER_POOL_WORKERS", self.pool.workers as u64),
            ("TIMER_TICK_MS", self.timer.tick_ms),
            ("TIMER_WHEEL_LEVELS", self.timer.wheel_levels as u64),
        ];

        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::InvalidValue(name, "must be positive".to_string()));
            }
        }

        if self.timer.wheel_slots < 2 {
            return Err(ConfigError::InvalidValue(
                "TIMER_WHEEL_SLOTS",
                "must be at least 2".to_string(),
            ));
        }

        Ok(())
    }
}

struct Vars<F>(F);

impl<F> Vars<F>
where
    F: Fn(&'static str) -> Option<String>,
{
    fn string(&self, key: &'static str) -> Option<String> {
        (self.0)(key)
    }

    fn parsed<T: FromStr>(&self, key: &'static str) -> Result<Option<T>, ConfigError> {
        match (self.0)(key) {
            Some(raw) => raw
                .trim()
                .parse()
                .map(Some)
                .map_err(|_| ConfigError::InvalidValue(key, raw)),
            None => Ok(None),
        }
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(&'static str),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}
