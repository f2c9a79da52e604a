//! IM Gateway Server entry point
//!
//! Run with:
//! ```bash
//! cargo run -p im-gateway
//! ```
//!
//! Configuration is loaded from environment variables.

use im_common::{try_init_tracing_with_config, AppConfig, AppError, TracingConfig};
use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Load configuration first; it selects the log format
    let config = match AppConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Failed to load configuration: {e}");
            std::process::exit(1);
        }
    };

    // Initialize tracing
    if let Err(e) = try_init_tracing_with_config(TracingConfig::for_environment(config.app.env)) {
        eprintln!("Warning: Failed to initialize tracing: {e}");
    }

    // Run the server
    if let Err(e) = run(config).await {
        error!(error = %e, code = e.error_code(), "Gateway failed");
        std::process::exit(1);
    }
}

async fn run(config: AppConfig) -> Result<(), AppError> {
    info!(
        env = ?config.app.env,
        gateway_id = %config.gateway.id,
        port = config.gateway.port,
        authentication = config.auth.secret_key.is_some(),
        "Starting IM Gateway Server..."
    );

    im_gateway::run(config).await
}
