//! Gateway server setup
//!
//! Provides the HTTP/WebSocket front door and the server lifecycle.

mod gateway;
mod handler;
mod state;

pub use gateway::{Gateway, SERVER_VERSION};
pub use handler::{health_check, stats, ws_handler};
pub use state::GatewayState;

use crate::registry::UnknownActionHandler;
use axum::{routing::get, Router};
use im_common::{AppConfig, AppError, AppResult};
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;

/// Create the gateway router
pub fn create_router() -> Router<GatewayState> {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_check))
        .route("/stats", get(stats))
}

/// Build the complete application
pub fn create_app(state: GatewayState) -> Router {
    create_router()
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

/// Serve `app` on an already bound listener until `shutdown` resolves
pub async fn serve<F>(listener: TcpListener, app: Router, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await
    .map_err(|e| AppError::server(format!("Server error: {e}")))
}

/// Run the gateway server
pub async fn run_server<F>(app: Router, addr: SocketAddr, shutdown: F) -> AppResult<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    tracing::info!("Starting Gateway server on {}", addr);

    let listener = TcpListener::bind(addr).await.map_err(|source| AppError::Bind {
        addr: addr.to_string(),
        source,
    })?;

    tracing::info!("Gateway listening on ws://{}/ws", addr);

    serve(listener, app, shutdown).await
}

/// Resolve on Ctrl-C
pub async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}

/// Run the complete gateway server with configuration
pub async fn run(config: AppConfig) -> AppResult<()> {
    let address = config.gateway.address();
    let addr: SocketAddr = address
        .parse()
        .map_err(|e| AppError::server(format!("Invalid gateway address {address}: {e}")))?;

    let gateway = Arc::new(Gateway::new(&config));
    gateway.set_message_handler(Arc::new(UnknownActionHandler::new(gateway.registry())));

    let app = create_app(GatewayState::new(Arc::clone(&gateway), config));

    let stopping = Arc::clone(&gateway);
    run_server(app, addr, async move {
        shutdown_signal().await;
        stopping.shutdown();
    })
    .await
}
