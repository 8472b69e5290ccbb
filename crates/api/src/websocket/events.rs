//! WebSocket wire events
//!
//! Client-to-server events carry the same operations as the REST fallback
//! routes. Server-to-client frames are either control frames owned by the
//! gateway or core `ConversationEvent`s passed through verbatim, so both
//! transports emit identical event payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatdesk_core::ConversationEvent;

// =============================================================================
// Client-to-Server Events
// =============================================================================

/// Events sent from client to server
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientEvent {
    /// Subscribe to one conversation's events
    Subscribe { conversation_id: Uuid },

    /// Unsubscribe from a conversation
    Unsubscribe { conversation_id: Uuid },

    /// Send an agent reply
    SendMessage {
        conversation_id: Uuid,
        content: Option<String>,
        image_url: Option<String>,
    },

    /// Start typing in a conversation
    TypingStart { conversation_id: Uuid },

    /// Stop typing in a conversation
    TypingStop { conversation_id: Uuid },

    /// Mark the agent online for a conversation
    MarkOnline { conversation_id: Uuid },

    /// Mark the agent offline for a conversation
    MarkOffline { conversation_id: Uuid },

    /// Mark the customer side of a conversation as read
    MarkRead { conversation_id: Uuid },

    /// Heartbeat ping to keep connection alive
    Ping,
}

// =============================================================================
// Server-to-Client Frames
// =============================================================================

/// Gateway-owned control frames
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ControlEvent {
    /// Connection acknowledged
    Connected { session_id: Uuid },

    /// Heartbeat response
    Pong,

    /// Error message
    Error { message: String },
}

/// Everything the gateway writes to a socket: control frames or core
/// conversation events, each carrying its own `type` tag.
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum ServerFrame {
    Control(ControlEvent),
    Event(ConversationEvent),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_deserialization() {
        let json = r#"{"type":"subscribe","conversation_id":"550e8400-e29b-41d4-a716-446655440000"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::Subscribe { conversation_id } => {
                assert_eq!(
                    conversation_id.to_string(),
                    "550e8400-e29b-41d4-a716-446655440000"
                );
            }
            _ => panic!("Expected Subscribe event"),
        }
    }

    #[test]
    fn test_send_message_deserialization() {
        let json = r#"{"type":"send_message","conversation_id":"550e8400-e29b-41d4-a716-446655440000","content":"hi"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        match event {
            ClientEvent::SendMessage { content, image_url, .. } => {
                assert_eq!(content.as_deref(), Some("hi"));
                assert!(image_url.is_none());
            }
            _ => panic!("Expected SendMessage event"),
        }
    }

    #[test]
    fn test_control_frame_serialization() {
        let frame = ServerFrame::Control(ControlEvent::Pong);
        let json = serde_json::to_string(&frame).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }

    #[test]
    fn test_event_frame_keeps_core_tag() {
        let conversation_id = chatdesk_shared::ConversationId::new();
        let frame = ServerFrame::Event(ConversationEvent::ConversationClosed { conversation_id });
        let json = serde_json::to_string(&frame).unwrap();
        assert!(json.contains(r#""type":"conversation_closed""#));
    }
}
