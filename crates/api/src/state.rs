//! Shared application state

use std::sync::Arc;

use chatdesk_core::ConversationService;

use crate::config::Config;

/// State shared across all handlers and the WebSocket gateway
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<ConversationService>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(service: Arc<ConversationService>, config: Config) -> Self {
        Self {
            service,
            config: Arc::new(config),
        }
    }
}
