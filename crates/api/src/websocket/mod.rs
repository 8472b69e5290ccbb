//! WebSocket gateway
//!
//! Real-time transport over the conversation core. Subscription rooms and
//! fan-out live in `chatdesk_core::fanout`; this module only speaks the
//! wire protocol and maps client events onto service operations.

pub mod events;
pub mod handler;

pub use events::{ClientEvent, ControlEvent, ServerFrame};
pub use handler::ws_handler;
