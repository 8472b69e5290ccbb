//! Conversation and company room management for pub/sub
//!
//! Transport-agnostic fan-out: subscribers hold one half of an unbounded
//! channel; the WebSocket gateway (or any other transport) drains the
//! other half. Events for a conversation go to that conversation's room
//! and to the owning company's aggregate feed, without duplicate delivery
//! to a session subscribed to both.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use uuid::Uuid;

use chatdesk_shared::{AgentId, CompanyId, ConversationId};

use crate::events::ConversationEvent;

/// One connected session's receiving end of the fan-out.
#[derive(Debug)]
pub struct Subscriber {
    /// Unique session ID for this connection
    pub session_id: Uuid,

    /// Authenticated agent behind the session
    pub agent_id: AgentId,

    /// Channel to push events to this session
    sender: mpsc::UnboundedSender<ConversationEvent>,
}

impl Subscriber {
    pub fn new(agent_id: AgentId, sender: mpsc::UnboundedSender<ConversationEvent>) -> Self {
        Self {
            session_id: Uuid::new_v4(),
            agent_id,
            sender,
        }
    }

    /// Send an event to this session.
    ///
    /// Returns Err if the connection is closed; the hub cleans those up on
    /// the next leave/remove call.
    pub fn send(
        &self,
        event: ConversationEvent,
    ) -> Result<(), mpsc::error::SendError<ConversationEvent>> {
        self.sender.send(event)
    }
}

/// Manages conversation rooms and company aggregate feeds.
pub struct FanoutHub {
    conversations: RwLock<HashMap<ConversationId, Vec<Arc<Subscriber>>>>,
    companies: RwLock<HashMap<CompanyId, Vec<Arc<Subscriber>>>>,
}

impl FanoutHub {
    pub fn new() -> Self {
        Self {
            conversations: RwLock::new(HashMap::new()),
            companies: RwLock::new(HashMap::new()),
        }
    }

    /// Add a session to a conversation room
    pub async fn join_conversation(&self, conversation_id: ConversationId, sub: Arc<Subscriber>) {
        let mut rooms = self.conversations.write().await;
        let room = rooms.entry(conversation_id).or_default();
        room.retain(|s| s.session_id != sub.session_id);
        room.push(Arc::clone(&sub));

        tracing::debug!(
            conversation_id = %conversation_id,
            session_id = %sub.session_id,
            room_size = room.len(),
            "Session joined conversation room"
        );
    }

    /// Add a session to a company's aggregate feed
    pub async fn join_company(&self, company_id: CompanyId, sub: Arc<Subscriber>) {
        let mut feeds = self.companies.write().await;
        let feed = feeds.entry(company_id).or_default();
        feed.retain(|s| s.session_id != sub.session_id);
        feed.push(Arc::clone(&sub));

        tracing::debug!(
            company_id = %company_id,
            session_id = %sub.session_id,
            feed_size = feed.len(),
            "Session joined company feed"
        );
    }

    /// Remove a session from a conversation room
    pub async fn leave_conversation(&self, conversation_id: &ConversationId, session_id: &Uuid) {
        let mut rooms = self.conversations.write().await;
        if let Some(room) = rooms.get_mut(conversation_id) {
            room.retain(|s| s.session_id != *session_id);
            if room.is_empty() {
                rooms.remove(conversation_id);
            }
        }
    }

    /// Remove a session from all rooms and feeds (disconnect cleanup)
    pub async fn remove_session(&self, session_id: &Uuid) {
        let mut rooms = self.conversations.write().await;
        for room in rooms.values_mut() {
            room.retain(|s| s.session_id != *session_id);
        }
        rooms.retain(|_, room| !room.is_empty());
        drop(rooms);

        let mut feeds = self.companies.write().await;
        for feed in feeds.values_mut() {
            feed.retain(|s| s.session_id != *session_id);
        }
        feeds.retain(|_, feed| !feed.is_empty());

        tracing::debug!(session_id = %session_id, "Session removed from fan-out");
    }

    /// Broadcast an event to the conversation room and the company feed.
    ///
    /// A session subscribed to both receives the event exactly once. Send
    /// errors are ignored; closed connections are dropped on cleanup.
    pub async fn broadcast(&self, company_id: CompanyId, event: ConversationEvent) {
        let conversation_id = event.conversation_id();
        let mut delivered: HashSet<Uuid> = HashSet::new();
        let mut failed = 0usize;

        let rooms = self.conversations.read().await;
        if let Some(room) = rooms.get(&conversation_id) {
            for sub in room {
                if delivered.insert(sub.session_id) && sub.send(event.clone()).is_err() {
                    failed += 1;
                }
            }
        }
        drop(rooms);

        let feeds = self.companies.read().await;
        if let Some(feed) = feeds.get(&company_id) {
            for sub in feed {
                if delivered.insert(sub.session_id) && sub.send(event.clone()).is_err() {
                    failed += 1;
                }
            }
        }
        drop(feeds);

        tracing::debug!(
            conversation_id = %conversation_id,
            company_id = %company_id,
            event_type = ?event,
            recipients = delivered.len(),
            failed,
            "Broadcast conversation event"
        );
    }

    /// Room size (number of sessions) for a conversation
    pub async fn room_size(&self, conversation_id: &ConversationId) -> usize {
        let rooms = self.conversations.read().await;
        rooms.get(conversation_id).map(|r| r.len()).unwrap_or(0)
    }

    /// Total number of active conversation rooms
    pub async fn room_count(&self) -> usize {
        let rooms = self.conversations.read().await;
        rooms.len()
    }
}

impl Default for FanoutHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn subscriber() -> (Arc<Subscriber>, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Subscriber::new(AgentId::new(), tx)), rx)
    }

    #[tokio::test]
    async fn test_join_and_leave_room() {
        let hub = FanoutHub::new();
        let conversation_id = ConversationId::new();
        let (sub, _rx) = subscriber();

        assert_eq!(hub.room_size(&conversation_id).await, 0);

        hub.join_conversation(conversation_id, Arc::clone(&sub)).await;
        assert_eq!(hub.room_size(&conversation_id).await, 1);

        hub.leave_conversation(&conversation_id, &sub.session_id).await;
        assert_eq!(hub.room_size(&conversation_id).await, 0);
    }

    #[tokio::test]
    async fn test_broadcast_reaches_conversation_and_company() {
        let hub = FanoutHub::new();
        let company_id = CompanyId::new();
        let conversation_id = ConversationId::new();

        let (conv_sub, mut conv_rx) = subscriber();
        let (feed_sub, mut feed_rx) = subscriber();

        hub.join_conversation(conversation_id, conv_sub).await;
        hub.join_company(company_id, feed_sub).await;

        hub.broadcast(
            company_id,
            ConversationEvent::ConversationClosed { conversation_id },
        )
        .await;

        assert!(conv_rx.try_recv().is_ok());
        assert!(feed_rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn test_dual_subscriber_receives_once() {
        let hub = FanoutHub::new();
        let company_id = CompanyId::new();
        let conversation_id = ConversationId::new();

        let (sub, mut rx) = subscriber();
        hub.join_conversation(conversation_id, Arc::clone(&sub)).await;
        hub.join_company(company_id, Arc::clone(&sub)).await;

        hub.broadcast(
            company_id,
            ConversationEvent::ConversationClosed { conversation_id },
        )
        .await;

        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err(), "event must not be delivered twice");
    }

    #[tokio::test]
    async fn test_remove_session_clears_all_rooms() {
        let hub = FanoutHub::new();
        let conv1 = ConversationId::new();
        let conv2 = ConversationId::new();
        let (sub, _rx) = subscriber();

        hub.join_conversation(conv1, Arc::clone(&sub)).await;
        hub.join_conversation(conv2, Arc::clone(&sub)).await;
        assert_eq!(hub.room_count().await, 2);

        hub.remove_session(&sub.session_id).await;
        assert_eq!(hub.room_count().await, 0);
    }
}
