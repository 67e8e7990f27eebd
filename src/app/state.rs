//! Application state shared across routes

use std::sync::Arc;

use crate::config::Config;
use crate::lobby::HubHandle;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub hub: HubHandle,
}

impl AppState {
    pub fn new(config: Config, hub: HubHandle) -> Self {
        Self {
            config: Arc::new(config),
            hub,
        }
    }
}
