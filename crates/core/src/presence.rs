//! Online presence tracking
//!
//! Tracks which agents are viewing which conversations, with a liveness
//! window so ungraceful disconnects (closed laptop, dropped socket) are
//! swept out without an explicit offline signal. The company-level view
//! feeds the assignment engine's eligibility check.

use std::collections::{HashMap, HashSet};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use chatdesk_shared::{AgentId, CompanyId, ConversationId};

struct PresenceEntry {
    company_id: CompanyId,
    last_seen: Instant,
}

pub struct PresenceTracker {
    window: Duration,
    entries: RwLock<HashMap<(ConversationId, AgentId), PresenceEntry>>,
}

impl PresenceTracker {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Upsert presence, refreshing last_seen.
    pub async fn mark_online(
        &self,
        company_id: CompanyId,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) {
        let mut entries = self.entries.write().await;
        entries.insert(
            (conversation_id, agent_id),
            PresenceEntry {
                company_id,
                last_seen: Instant::now(),
            },
        );
    }

    /// Explicit offline: remove immediately.
    pub async fn mark_offline(&self, conversation_id: ConversationId, agent_id: AgentId) {
        let mut entries = self.entries.write().await;
        entries.remove(&(conversation_id, agent_id));
    }

    /// Agents currently online for a conversation, filtered against the
    /// liveness window so a missed sweep never reports a ghost.
    pub async fn list_online(&self, conversation_id: ConversationId) -> Vec<AgentId> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|((conv, _), entry)| {
                *conv == conversation_id && entry.last_seen.elapsed() < self.window
            })
            .map(|((_, agent), _)| *agent)
            .collect()
    }

    /// Distinct agents online anywhere in a company. Used by auto-routing
    /// to build the eligible pool.
    pub async fn online_agents(&self, company_id: CompanyId) -> HashSet<AgentId> {
        let entries = self.entries.read().await;
        entries
            .iter()
            .filter(|(_, entry)| {
                entry.company_id == company_id && entry.last_seen.elapsed() < self.window
            })
            .map(|((_, agent), _)| *agent)
            .collect()
    }

    /// Drop all presence for a conversation (used on close).
    pub async fn clear_conversation(&self, conversation_id: ConversationId) {
        let mut entries = self.entries.write().await;
        entries.retain(|(conv, _), _| *conv != conversation_id);
    }

    /// Evict entries whose last_seen fell outside the liveness window.
    pub async fn sweep(&self) -> usize {
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, entry| entry.last_seen.elapsed() < self.window);
        let evicted = before - entries.len();
        if evicted > 0 {
            tracing::debug!(evicted, "Swept stale presence entries");
        }
        evicted
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mark_online_and_offline() {
        let tracker = PresenceTracker::new(Duration::from_secs(45));
        let company_id = CompanyId::new();
        let conversation_id = ConversationId::new();
        let agent_id = AgentId::new();

        tracker.mark_online(company_id, conversation_id, agent_id).await;
        assert_eq!(tracker.list_online(conversation_id).await, vec![agent_id]);
        assert!(tracker.online_agents(company_id).await.contains(&agent_id));

        tracker.mark_offline(conversation_id, agent_id).await;
        assert!(tracker.list_online(conversation_id).await.is_empty());
        assert!(tracker.online_agents(company_id).await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_entry_invisible_and_swept() {
        let tracker = PresenceTracker::new(Duration::from_secs(45));
        let company_id = CompanyId::new();
        let conversation_id = ConversationId::new();
        let agent_id = AgentId::new();

        tracker.mark_online(company_id, conversation_id, agent_id).await;
        tokio::time::advance(Duration::from_secs(46)).await;

        // Lazy read filter hides the entry before any sweep runs
        assert!(tracker.list_online(conversation_id).await.is_empty());
        assert!(tracker.online_agents(company_id).await.is_empty());

        assert_eq!(tracker.sweep().await, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ping_refreshes_liveness() {
        let tracker = PresenceTracker::new(Duration::from_secs(45));
        let company_id = CompanyId::new();
        let conversation_id = ConversationId::new();
        let agent_id = AgentId::new();

        tracker.mark_online(company_id, conversation_id, agent_id).await;
        tokio::time::advance(Duration::from_secs(30)).await;
        tracker.mark_online(company_id, conversation_id, agent_id).await;
        tokio::time::advance(Duration::from_secs(30)).await;

        assert_eq!(tracker.list_online(conversation_id).await, vec![agent_id]);
    }

    #[tokio::test]
    async fn test_company_view_is_distinct_per_agent() {
        let tracker = PresenceTracker::new(Duration::from_secs(45));
        let company_id = CompanyId::new();
        let agent_id = AgentId::new();

        tracker.mark_online(company_id, ConversationId::new(), agent_id).await;
        tracker.mark_online(company_id, ConversationId::new(), agent_id).await;

        assert_eq!(tracker.online_agents(company_id).await.len(), 1);
    }
}
