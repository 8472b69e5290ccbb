//! Chatdesk Conversation Core
//!
//! The domain core of the chatdesk messaging subsystem: conversation
//! lifecycle and assignment, ephemeral typing/presence state, message and
//! label persistence contracts, and the transport-agnostic fan-out hub.
//! The API crate layers HTTP and WebSocket transports on top of
//! [`service::ConversationService`]; both transports invoke the same
//! operations and therefore produce identical state and events.

pub mod assignment;
pub mod config;
pub mod directory;
pub mod events;
pub mod fanout;
pub mod labels;
pub mod messages;
pub mod presence;
pub mod service;
pub mod store;
pub mod sweeper;
pub mod typing;

pub use config::CoreConfig;
pub use directory::{AgentDirectory, InMemoryDirectory};
pub use events::ConversationEvent;
pub use fanout::{FanoutHub, Subscriber};
pub use presence::PresenceTracker;
pub use service::ConversationService;
pub use store::{
    memory::MemoryStore,
    postgres::{PgDirectory, PgStore},
    ConversationStore,
};
pub use typing::TypingTracker;
