//! Typing indicator tracking
//!
//! Short-lived "agent X is typing" state per conversation. Entries expire
//! after a fixed inactivity window even when the explicit stop signal is
//! lost (client crash, dropped frame), so reads filter lazily against the
//! deadline and never depend on the sweeper having run.

use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use chatdesk_shared::{AgentId, ConversationId};

pub struct TypingTracker {
    ttl: Duration,
    entries: RwLock<HashMap<(ConversationId, AgentId), Instant>>,
}

impl TypingTracker {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert the typing deadline for (conversation, agent).
    pub async fn set_typing(&self, conversation_id: ConversationId, agent_id: AgentId) {
        let deadline = Instant::now() + self.ttl;
        let mut entries = self.entries.write().await;
        entries.insert((conversation_id, agent_id), deadline);
    }

    /// Explicit stop.
    pub async fn clear_typing(&self, conversation_id: ConversationId, agent_id: AgentId) {
        let mut entries = self.entries.write().await;
        entries.remove(&(conversation_id, agent_id));
    }

    /// Agents currently typing in a conversation; expired entries are
    /// filtered at read time.
    pub async fn list_typing(&self, conversation_id: ConversationId) -> Vec<AgentId> {
        let now = Instant::now();
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|((conv, _), deadline)| *conv == conversation_id && **deadline > now)
            .map(|((_, agent), _)| *agent)
            .collect()
    }

    /// Drop all typing state for a conversation (used on close).
    pub async fn clear_conversation(&self, conversation_id: ConversationId) {
        let mut entries = self.entries.write().await;
        entries.retain(|(conv, _), _| *conv != conversation_id);
    }

    /// Evict expired entries. Hygiene only; reads are already lazy.
    pub async fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, deadline| *deadline > now);
        before - entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_typing_expires_without_explicit_stop() {
        let tracker = TypingTracker::new(Duration::from_secs(2));
        let conversation_id = ConversationId::new();
        let agent_id = AgentId::new();

        tracker.set_typing(conversation_id, agent_id).await;
        assert_eq!(tracker.list_typing(conversation_id).await, vec![agent_id]);

        tokio::time::advance(Duration::from_millis(2100)).await;
        assert!(tracker.list_typing(conversation_id).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_refresh_extends_deadline() {
        let tracker = TypingTracker::new(Duration::from_secs(2));
        let conversation_id = ConversationId::new();
        let agent_id = AgentId::new();

        tracker.set_typing(conversation_id, agent_id).await;
        tokio::time::advance(Duration::from_millis(1500)).await;
        tracker.set_typing(conversation_id, agent_id).await;
        tokio::time::advance(Duration::from_millis(1500)).await;

        assert_eq!(tracker.list_typing(conversation_id).await, vec![agent_id]);
    }

    #[tokio::test]
    async fn test_explicit_clear() {
        let tracker = TypingTracker::new(Duration::from_secs(2));
        let conversation_id = ConversationId::new();
        let agent_id = AgentId::new();

        tracker.set_typing(conversation_id, agent_id).await;
        tracker.clear_typing(conversation_id, agent_id).await;
        assert!(tracker.list_typing(conversation_id).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_expired_only() {
        let tracker = TypingTracker::new(Duration::from_secs(2));
        let conv1 = ConversationId::new();
        let conv2 = ConversationId::new();

        tracker.set_typing(conv1, AgentId::new()).await;
        tokio::time::advance(Duration::from_millis(1900)).await;
        tracker.set_typing(conv2, AgentId::new()).await;
        tokio::time::advance(Duration::from_millis(200)).await;

        assert_eq!(tracker.sweep().await, 1);
        assert!(tracker.list_typing(conv1).await.is_empty());
        assert_eq!(tracker.list_typing(conv2).await.len(), 1);
    }
}
