use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::connections::ConnectionRegistry;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub registry: Arc<ConnectionRegistry>,
    pub started_at: Instant,
}

impl AppState {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: Arc::new(settings),
            registry: Arc::new(ConnectionRegistry::new()),
            started_at: Instant::now(),
        }
    }
}
