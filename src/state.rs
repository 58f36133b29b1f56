use std::sync::Arc;

use crate::{config::GatewayConfig, services::backend::Backend};

/// Shared handler state: the backend client handle and the startup
/// configuration. Both are read-only for the life of the process.
#[derive(Clone)]
pub struct AppState {
    pub backend: Arc<dyn Backend>,
    pub config: Arc<GatewayConfig>,
}

impl AppState {
    pub fn new(backend: Arc<dyn Backend>, config: GatewayConfig) -> Self {
        Self {
            backend,
            config: Arc::new(config),
        }
    }
}
