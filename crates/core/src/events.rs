//! Conversation event types
//!
//! State changes produced by the core, fanned out to every subscriber of
//! the conversation and of the owning company's aggregate feed. The serde
//! representation is the wire format pushed to WebSocket clients.

use serde::Serialize;

use chatdesk_shared::{AgentId, Bucket, ConversationId, Message};

/// Events emitted by the core after a durable state change.
#[derive(Debug, Serialize, Clone)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// New message appended to a conversation
    MessageCreated {
        conversation_id: ConversationId,
        message: Message,
    },

    /// An agent started or stopped typing
    TypingChanged {
        conversation_id: ConversationId,
        agent_id: AgentId,
        is_typing: bool,
    },

    /// An agent came online or went offline for a conversation
    PresenceChanged {
        conversation_id: ConversationId,
        agent_id: AgentId,
        online: bool,
    },

    /// Ownership changed (taken, released, or auto-routed)
    AssignmentChanged {
        conversation_id: ConversationId,
        #[serde(skip_serializing_if = "Option::is_none")]
        assigned_to: Option<AgentId>,
        bucket: Bucket,
    },

    /// Conversation moved to the Complete bucket
    ConversationClosed { conversation_id: ConversationId },
}

impl ConversationEvent {
    /// The conversation this event belongs to, used for room routing.
    pub fn conversation_id(&self) -> ConversationId {
        match self {
            ConversationEvent::MessageCreated {
                conversation_id, ..
            }
            | ConversationEvent::TypingChanged {
                conversation_id, ..
            }
            | ConversationEvent::PresenceChanged {
                conversation_id, ..
            }
            | ConversationEvent::AssignmentChanged {
                conversation_id, ..
            }
            | ConversationEvent::ConversationClosed { conversation_id } => *conversation_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_event_serialization() {
        let conversation_id = ConversationId::new();
        let event = ConversationEvent::ConversationClosed { conversation_id };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""type":"conversation_closed""#));
        assert!(json.contains(&conversation_id.to_string()));
    }

    #[test]
    fn test_assignment_event_omits_null_agent() {
        let event = ConversationEvent::AssignmentChanged {
            conversation_id: ConversationId::new(),
            assigned_to: None,
            bucket: Bucket::Inbox,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(!json.contains("assigned_to"));
        assert!(json.contains(r#""bucket":"inbox""#));
    }
}
