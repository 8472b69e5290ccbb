//! Conversation assignment state machine
//!
//! Governs who owns a conversation. Transitions are race-free: the store's
//! compare-and-swap is the single arbiter, so under N concurrent `assign`
//! calls exactly one caller wins and the rest observe a `Conflict`.
//!
//! Auto-routing picks the online customer-care agent with the fewest open
//! assigned conversations, tie-broken by the longest time since that
//! agent's last assignment (never-assigned agents win ties outright).

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::RwLock;
use tokio::time::Instant;

use chatdesk_shared::{
    permission, AgentId, AgentRole, Assignment, Bucket, Conversation, ConversationId, CoreError,
    CoreResult, ReleaseRecord,
};

use crate::directory::AgentDirectory;
use crate::presence::PresenceTracker;
use crate::store::ConversationStore;

pub struct AssignmentEngine {
    store: Arc<dyn ConversationStore>,
    directory: Arc<dyn AgentDirectory>,
    presence: Arc<PresenceTracker>,
    /// Fairness state for the routing tie-break. Ephemeral: a restart
    /// resets the rotation, not correctness.
    last_assigned: RwLock<HashMap<AgentId, Instant>>,
}

impl AssignmentEngine {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        directory: Arc<dyn AgentDirectory>,
        presence: Arc<PresenceTracker>,
    ) -> Self {
        Self {
            store,
            directory,
            presence,
            last_assigned: RwLock::new(HashMap::new()),
        }
    }

    /// Take an Inbox conversation. Exactly one concurrent caller succeeds.
    pub async fn assign(
        &self,
        id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<Conversation> {
        if !self
            .directory
            .has_permission(agent_id, permission::HANDLE_CONVERSATIONS)
            .await?
        {
            return Err(CoreError::Forbidden(
                "agent may not handle conversations".to_string(),
            ));
        }

        // The CAS is the arbiter; no read-then-write window.
        let updated = self
            .store
            .update_assignment(id, Assignment::Unassigned, Assignment::AssignedTo(agent_id))
            .await?;
        if let Some(conv) = updated {
            self.touch_last_assigned(agent_id).await;
            tracing::info!(
                conversation_id = %id,
                agent_id = %agent_id,
                "Conversation taken"
            );
            return Ok(conv);
        }

        // Losers report why: a closed conversation is a wrong-state call,
        // anything else lost the take race.
        let conv = self.store.load_conversation(id).await?;
        match conv.bucket() {
            Bucket::Complete => Err(CoreError::InvalidTransition {
                expected: Bucket::Inbox,
                actual: Bucket::Complete,
            }),
            _ => Err(CoreError::Conflict(
                "conversation already taken".to_string(),
            )),
        }
    }

    /// Release a Taken conversation back to the Inbox, recording the
    /// release in the ledger. Only the owner or a supervisor may release.
    pub async fn unassign(
        &self,
        id: ConversationId,
        requesting: AgentId,
    ) -> CoreResult<(Conversation, ReleaseRecord)> {
        let conv = self.store.load_conversation(id).await?;
        let owner = match (conv.bucket(), conv.assignment) {
            (Bucket::Taken, Assignment::AssignedTo(owner)) => owner,
            (actual, _) => {
                return Err(CoreError::InvalidTransition {
                    expected: Bucket::Taken,
                    actual,
                })
            }
        };

        if owner != requesting
            && !self
                .directory
                .has_permission(requesting, permission::SUPERVISE_CONVERSATIONS)
                .await?
        {
            return Err(CoreError::Forbidden(
                "only the owner or a supervisor may release a conversation".to_string(),
            ));
        }

        // Ledger entry first, then the transition back to Inbox.
        let record = self.store.append_release(id, owner).await?;
        let updated = self
            .store
            .update_assignment(id, Assignment::AssignedTo(owner), Assignment::Unassigned)
            .await?;
        let Some(conv) = updated else {
            return Err(CoreError::Conflict(
                "ownership changed during release".to_string(),
            ));
        };

        tracing::info!(
            conversation_id = %id,
            agent_id = %owner,
            requested_by = %requesting,
            "Conversation released to inbox"
        );
        Ok((conv, record))
    }

    /// Close a conversation. Valid from Taken for the owner or a
    /// supervisor, and from Inbox for a supervisor.
    pub async fn complete(
        &self,
        id: ConversationId,
        requesting: AgentId,
    ) -> CoreResult<Conversation> {
        let conv = self.store.load_conversation(id).await?;
        match conv.bucket() {
            Bucket::Taken => {
                if conv.assignment.agent() != Some(requesting)
                    && !self
                        .directory
                        .has_permission(requesting, permission::SUPERVISE_CONVERSATIONS)
                        .await?
                {
                    return Err(CoreError::Forbidden(
                        "only the owner or a supervisor may complete a conversation".to_string(),
                    ));
                }
            }
            Bucket::Inbox => {
                if !self
                    .directory
                    .has_permission(requesting, permission::SUPERVISE_CONVERSATIONS)
                    .await?
                {
                    return Err(CoreError::Forbidden(
                        "only a supervisor may close an unassigned conversation".to_string(),
                    ));
                }
            }
            Bucket::Complete => {
                return Err(CoreError::InvalidTransition {
                    expected: Bucket::Taken,
                    actual: Bucket::Complete,
                })
            }
        }

        let closed = self.store.close_conversation(id).await?;
        let Some(conv) = closed else {
            // Lost a race with another close; report the real current state.
            let actual = self.store.load_conversation(id).await?.bucket();
            return Err(CoreError::InvalidTransition {
                expected: Bucket::Taken,
                actual,
            });
        };

        tracing::info!(
            conversation_id = %id,
            requested_by = %requesting,
            "Conversation completed"
        );
        Ok(conv)
    }

    /// Route an unassigned conversation to the least-loaded eligible agent.
    ///
    /// Returns the updated conversation when routed, or `None` when no
    /// agent is eligible (the conversation stays in the Inbox for manual
    /// pickup) or when a manual take won the race. Never blocks waiting
    /// for an agent.
    pub async fn auto_route(&self, conv: &Conversation) -> CoreResult<Option<Conversation>> {
        if conv.bucket() != Bucket::Inbox {
            return Ok(None);
        }

        let online = self.presence.online_agents(conv.company_id).await;
        if online.is_empty() {
            tracing::debug!(
                conversation_id = %conv.id,
                "No agents online, conversation stays in inbox"
            );
            return Ok(None);
        }

        let agents = self.directory.company_agents(conv.company_id).await?;
        let counts = self.store.open_assignment_counts(conv.company_id).await?;
        let last_assigned = self.last_assigned.read().await;

        // Key: (open assignments, last assignment instant). Option's Ord
        // puts never-assigned agents first; strict less-than keeps the
        // earliest-listed agent on full ties, so rotation is deterministic.
        let mut best: Option<(i64, Option<Instant>, AgentId)> = None;
        for agent in agents
            .iter()
            .filter(|a| a.role == AgentRole::CustomerCare && online.contains(&a.id))
        {
            let count = counts.get(&agent.id).copied().unwrap_or(0);
            let last = last_assigned.get(&agent.id).copied();
            let beats = match &best {
                None => true,
                Some((best_count, best_last, _)) => (count, last) < (*best_count, *best_last),
            };
            if beats {
                best = Some((count, last, agent.id));
            }
        }
        drop(last_assigned);

        let Some((_, _, chosen)) = best else {
            tracing::debug!(
                conversation_id = %conv.id,
                "No eligible customer-care agent, conversation stays in inbox"
            );
            return Ok(None);
        };

        let updated = self
            .store
            .update_assignment(
                conv.id,
                Assignment::Unassigned,
                Assignment::AssignedTo(chosen),
            )
            .await?;
        match updated {
            Some(conv) => {
                self.touch_last_assigned(chosen).await;
                tracing::info!(
                    conversation_id = %conv.id,
                    agent_id = %chosen,
                    "Conversation auto-routed"
                );
                Ok(Some(conv))
            }
            // A manual take won the race; the conversation already has an owner.
            None => Ok(None),
        }
    }

    async fn touch_last_assigned(&self, agent_id: AgentId) {
        let mut last = self.last_assigned.write().await;
        last.insert(agent_id, Instant::now());
    }
}
