//! Gateway state
//!
//! Application state shared by the HTTP handlers.

use super::Gateway;
use im_common::AppConfig;
use std::sync::Arc;

/// Gateway application state
#[derive(Clone)]
pub struct GatewayState {
    gateway: Arc<Gateway>,
    config: Arc<AppConfig>,
}

impl GatewayState {
    pub fn new(gateway: Arc<Gateway>, config: AppConfig) -> Self {
        Self {
            gateway,
            config: Arc::new(config),
        }
    }

    /// Get the gateway
    pub fn gateway(&self) -> &Arc<Gateway> {
        &self.gateway
    }

    /// Get the application configuration
    pub fn config(&self) -> &AppConfig {
        &self.config
    }
}

impl std::fmt::Debug for GatewayState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayState")
            .field("gateway", &self.gateway)
            .field("config", &"AppConfig")
            .finish()
    }
}
