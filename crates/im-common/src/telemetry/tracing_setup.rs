//! Tracing and logging setup
//!
//! Builds the global `tracing` subscriber. `RUST_LOG` wins when set; otherwise
//! the configured default directives apply.

use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

use crate::config::Environment;

/// Directives used when `RUST_LOG` is unset in development
const DEV_DIRECTIVES: &str = "debug,hyper=info,tungstenite=info,tokio_tungstenite=info";

/// Directives used when `RUST_LOG` is unset elsewhere
const DEFAULT_DIRECTIVES: &str = "info,tower_http=warn,hyper=warn,tungstenite=warn";

/// Output format of log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    /// Multi-line human readable output
    Pretty,
    /// One line per event
    #[default]
    Compact,
    /// Newline-delimited JSON for log shippers
    Json,
}

/// Tracing configuration options
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Default filter directives, e.g. `info,im_gateway=debug`
    pub directives: String,
    pub format: LogFormat,
    /// Log span open/close (connection tasks are long-lived, so this is noisy)
    pub span_events: bool,
    /// Include file and line numbers
    pub file_line: bool,
    /// Include the tokio worker thread name
    pub thread_names: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            directives: DEFAULT_DIRECTIVES.to_string(),
            format: LogFormat::Compact,
            span_events: false,
            file_line: false,
            thread_names: false,
        }
    }
}

impl TracingConfig {
    /// Verbose pretty output for local runs
    #[must_use]
    pub fn development() -> Self {
        Self {
            directives: DEV_DIRECTIVES.to_string(),
            format: LogFormat::Pretty,
            span_events: false,
            file_line: true,
            thread_names: true,
        }
    }

    /// JSON output at info level
    #[must_use]
    pub fn production() -> Self {
        Self {
            format: LogFormat::Json,
            ..Self::default()
        }
    }

    /// Pick the configuration matching a deployment environment
    #[must_use]
    pub fn for_environment(env: Environment) -> Self {
        match env {
            Environment::Production => Self::production(),
            Environment::Staging => Self::default(),
            Environment::Development => Self::development(),
        }
    }

    /// Replace the default directives
    #[must_use]
    pub fn with_directives(mut self, directives: impl Into<String>) -> Self {
        self.directives = directives.into();
        self
    }

    fn fmt_layer(&self) -> Box<dyn Layer<Registry> + Send + Sync> {
        let span_events = if self.span_events {
            FmtSpan::NEW | FmtSpan::CLOSE
        } else {
            FmtSpan::NONE
        };

        let layer = fmt::layer()
            .with_file(self.file_line)
            .with_line_number(self.file_line)
            .with_thread_names(self.thread_names)
            .with_span_events(span_events);

        match self.format {
            LogFormat::Pretty => layer.pretty().boxed(),
            LogFormat::Compact => layer.compact().boxed(),
            LogFormat::Json => layer.json().boxed(),
        }
    }

    fn env_filter(&self) -> Result<EnvFilter, TracingError> {
        match EnvFilter::try_from_default_env() {
            Ok(filter) => Ok(filter),
            Err(_) => EnvFilter::try_new(&self.directives)
                .map_err(|e| TracingError::InvalidDirectives(e.to_string())),
        }
    }
}

/// Try to initialize tracing with the default configuration
pub fn try_init_tracing() -> Result<(), TracingError> {
    try_init_tracing_with_config(TracingConfig::default())
}

/// Try to initialize tracing with custom configuration
///
/// Never panics; a second call reports `AlreadyInitialized`.
pub fn try_init_tracing_with_config(config: TracingConfig) -> Result<(), TracingError> {
    let filter = config.env_filter()?;
    tracing_subscriber::registry()
        .with(config.fmt_layer())
        .with(filter)
        .try_init()
        .map_err(|_| TracingError::AlreadyInitialized)
}

/// Tracing initialization errors
#[derive(Debug, thiserror::Error)]
pub enum TracingError {
    #[error("Tracing subscriber already initialized")]
    AlreadyInitialized,

    #[error("Invalid log directives: {0}")]
    InvalidDirectives(String),
}
