//! Chatdesk API Library
//!
//! HTTP and WebSocket surface over the conversation core. Both transports
//! call the same `ConversationService` operations, so the REST fallback
//! path and the socket path produce identical state and events.

pub mod auth;
pub mod config;
pub mod error;
pub mod routes;
pub mod state;
pub mod websocket;

pub use config::Config;
pub use error::{ApiError, ApiResult};
pub use state::AppState;
