//! Shared server state handed to every WebSocket connection.

use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use crate::bus::EventBus;

#[derive(Clone)]
pub struct AppState {
    pub bus: EventBus,
    pub client_count: Arc<AtomicUsize>,
    pub auth_token: Option<String>,
}

impl AppState {
    pub fn new(bus: EventBus, auth_token: Option<String>) -> Self {
        Self {
            bus,
            client_count: Arc::new(AtomicUsize::new(0)),
            auth_token,
        }
    }
}
