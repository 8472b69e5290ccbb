//! Background eviction sweeps
//!
//! One interval task evicts stale presence and typing entries. Reads are
//! lazy either way; the sweep bounds memory for entries nobody reads.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::presence::PresenceTracker;
use crate::typing::TypingTracker;

pub fn spawn_sweeper(
    presence: Arc<PresenceTracker>,
    typing: Arc<TypingTracker>,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let presence_evicted = presence.sweep().await;
            let typing_evicted = typing.sweep().await;
            if presence_evicted > 0 || typing_evicted > 0 {
                tracing::debug!(presence_evicted, typing_evicted, "Sweep completed");
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chatdesk_shared::{AgentId, CompanyId, ConversationId};

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_evicts_stale_presence() {
        let presence = Arc::new(PresenceTracker::new(Duration::from_secs(45)));
        let typing = Arc::new(TypingTracker::new(Duration::from_secs(2)));

        let company_id = CompanyId::new();
        let conversation_id = ConversationId::new();
        presence
            .mark_online(company_id, conversation_id, AgentId::new())
            .await;

        let handle = spawn_sweeper(
            Arc::clone(&presence),
            Arc::clone(&typing),
            Duration::from_secs(5),
        );

        // Paused time auto-advances while every task is idle, so the
        // sweeper gets its ticks past the liveness window.
        tokio::time::sleep(Duration::from_secs(60)).await;

        assert!(presence.list_online(conversation_id).await.is_empty());
        handle.abort();
    }
}
