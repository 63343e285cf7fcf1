use std::sync::Arc;
use std::time::Instant;

use crate::config::Settings;
use crate::hub::HubHandle;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub hub: HubHandle,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(settings: Settings, hub: HubHandle) -> Self {
        Self {
            settings: Arc::new(settings),
            hub,
            start_time: Instant::now(),
        }
    }
}
