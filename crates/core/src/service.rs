//! Conversation service facade
//!
//! The single command handler behind every transport. REST handlers and
//! the WebSocket gateway both call these operations, so both paths produce
//! identical state changes and identical fan-out events.
//!
//! Mutating operations on one conversation run inside a per-conversation
//! critical section (a lock keyed by conversation id); operations on
//! different conversations proceed fully in parallel. The lock is held
//! across the local transition, the durable write, and the hub broadcast,
//! never across I/O to external channel adapters.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::Mutex;
use tokio_retry::strategy::ExponentialBackoff;
use tokio_retry::RetryIf;
use uuid::Uuid;

use chatdesk_shared::{
    permission, AgentId, Assignment, AssignmentStats, Bucket, CompanyId, Conversation,
    ConversationDetail, ConversationId, ConversationStatus, ConversationSummary, CoreError,
    CoreResult, Label, LabelId, Message, Platform, ReleaseRecord, SenderType,
};

use crate::assignment::AssignmentEngine;
use crate::config::CoreConfig;
use crate::directory::AgentDirectory;
use crate::events::ConversationEvent;
use crate::fanout::{FanoutHub, Subscriber};
use crate::labels::LabelManager;
use crate::messages::MessageLog;
use crate::presence::PresenceTracker;
use crate::store::{ConversationStore, ListFilter, NewConversation};
use crate::typing::TypingTracker;

/// Normalized inbound tuple delivered by a channel adapter.
#[derive(Debug, Clone)]
pub struct InboundMessage {
    pub company_id: CompanyId,
    pub platform: Platform,
    pub external_user_id: String,
    pub external_user_name: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
}

pub struct ConversationService {
    store: Arc<dyn ConversationStore>,
    directory: Arc<dyn AgentDirectory>,
    presence: Arc<PresenceTracker>,
    typing: Arc<TypingTracker>,
    hub: Arc<FanoutHub>,
    engine: AssignmentEngine,
    labels: LabelManager,
    messages: MessageLog,
    config: CoreConfig,
    /// Per-conversation critical sections, created on first use and
    /// dropped when the conversation closes.
    locks: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl ConversationService {
    pub fn new(
        store: Arc<dyn ConversationStore>,
        directory: Arc<dyn AgentDirectory>,
        config: CoreConfig,
    ) -> Self {
        let presence = Arc::new(PresenceTracker::new(config.presence_window));
        let typing = Arc::new(TypingTracker::new(config.typing_ttl));
        let hub = Arc::new(FanoutHub::new());
        let engine = AssignmentEngine::new(
            Arc::clone(&store),
            Arc::clone(&directory),
            Arc::clone(&presence),
        );
        let labels = LabelManager::new(Arc::clone(&store));
        let messages = MessageLog::new(Arc::clone(&store));

        Self {
            store,
            directory,
            presence,
            typing,
            hub,
            engine,
            labels,
            messages,
            config,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn presence(&self) -> Arc<PresenceTracker> {
        Arc::clone(&self.presence)
    }

    pub fn typing(&self) -> Arc<TypingTracker> {
        Arc::clone(&self.typing)
    }

    pub fn directory(&self) -> Arc<dyn AgentDirectory> {
        Arc::clone(&self.directory)
    }

    async fn lock_for(&self, id: ConversationId) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().await;
        Arc::clone(locks.entry(id).or_default())
    }

    /// Bounded retry for idempotent reads only; mutations surface storage
    /// failures immediately to avoid duplicate side effects.
    async fn load_with_retry(&self, id: ConversationId) -> CoreResult<Conversation> {
        let strategy = ExponentialBackoff::from_millis(10).take(3);
        RetryIf::spawn(
            strategy,
            || self.store.load_conversation(id),
            is_transient,
        )
        .await
    }

    // =========================================================================
    // Ingestion (channel adapters)
    // =========================================================================

    /// Handle a normalized inbound customer message: thread it into the
    /// open conversation for that channel user (creating one if needed),
    /// fan out, and auto-route when unassigned.
    pub async fn ingest_inbound(
        &self,
        inbound: InboundMessage,
    ) -> CoreResult<(Conversation, Message)> {
        let existing = self
            .store
            .find_open_by_external(
                inbound.company_id,
                inbound.platform,
                &inbound.external_user_id,
            )
            .await?;

        let conv = match existing {
            Some(conv) => conv,
            None => {
                let conv = self
                    .store
                    .insert_conversation(NewConversation {
                        company_id: inbound.company_id,
                        platform: inbound.platform,
                        external_user_id: inbound.external_user_id.clone(),
                        external_user_name: inbound.external_user_name.clone(),
                    })
                    .await?;
                tracing::info!(
                    conversation_id = %conv.id,
                    company_id = %conv.company_id,
                    platform = %conv.platform,
                    "New inbound conversation"
                );
                conv
            }
        };

        let lock = self.lock_for(conv.id).await;
        let _guard = lock.lock().await;

        let message = self
            .messages
            .append(
                conv.id,
                SenderType::Customer,
                inbound.content,
                inbound.image_url,
            )
            .await?;

        self.hub
            .broadcast(
                conv.company_id,
                ConversationEvent::MessageCreated {
                    conversation_id: conv.id,
                    message: message.clone(),
                },
            )
            .await;

        let conv = if conv.assignment == Assignment::Unassigned {
            match self.engine.auto_route(&conv).await {
                Ok(Some(updated)) => {
                    self.hub
                        .broadcast(
                            updated.company_id,
                            ConversationEvent::AssignmentChanged {
                                conversation_id: updated.id,
                                assigned_to: updated.assignment.agent(),
                                bucket: updated.bucket(),
                            },
                        )
                        .await;
                    updated
                }
                Ok(None) => conv,
                Err(err) => {
                    // Routing must never lose the message; leave the
                    // conversation in the inbox for manual pickup.
                    tracing::warn!(
                        conversation_id = %conv.id,
                        error = %err,
                        "Auto-routing failed"
                    );
                    conv
                }
            }
        } else {
            conv
        };

        Ok((conv, message))
    }

    // =========================================================================
    // Messaging
    // =========================================================================

    /// Agent reply. Identical semantics whether invoked over the REST
    /// fallback or the WebSocket path.
    pub async fn send_message(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
        content: Option<String>,
        image_url: Option<String>,
    ) -> CoreResult<Message> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let conv = self.store.load_conversation(conversation_id).await?;
        if conv.status == ConversationStatus::Closed {
            return Err(CoreError::InvalidTransition {
                expected: Bucket::Taken,
                actual: Bucket::Complete,
            });
        }
        if let Assignment::AssignedTo(owner) = conv.assignment {
            if owner != agent_id
                && !self
                    .directory
                    .has_permission(agent_id, permission::SUPERVISE_CONVERSATIONS)
                    .await?
            {
                return Err(CoreError::Forbidden(
                    "conversation is owned by another agent".to_string(),
                ));
            }
        }

        let message = self
            .messages
            .append(conversation_id, SenderType::Agent, content, image_url)
            .await?;

        self.hub
            .broadcast(
                conv.company_id,
                ConversationEvent::MessageCreated {
                    conversation_id,
                    message: message.clone(),
                },
            )
            .await;

        Ok(message)
    }

    pub async fn mark_read(
        &self,
        conversation_id: ConversationId,
        reader: SenderType,
    ) -> CoreResult<u64> {
        self.messages.mark_read(conversation_id, reader).await
    }

    pub async fn page_messages(
        &self,
        conversation_id: ConversationId,
        before_seq: Option<i64>,
        limit: Option<i64>,
    ) -> CoreResult<Vec<Message>> {
        self.messages
            .page(
                conversation_id,
                before_seq,
                limit.unwrap_or(self.config.default_page_size),
            )
            .await
    }

    // =========================================================================
    // Assignment transitions
    // =========================================================================

    pub async fn assign(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<Conversation> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let conv = self.engine.assign(conversation_id, agent_id).await?;
        self.hub
            .broadcast(
                conv.company_id,
                ConversationEvent::AssignmentChanged {
                    conversation_id,
                    assigned_to: conv.assignment.agent(),
                    bucket: conv.bucket(),
                },
            )
            .await;
        Ok(conv)
    }

    pub async fn unassign(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<(Conversation, ReleaseRecord)> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let (conv, record) = self.engine.unassign(conversation_id, agent_id).await?;
        self.hub
            .broadcast(
                conv.company_id,
                ConversationEvent::AssignmentChanged {
                    conversation_id,
                    assigned_to: None,
                    bucket: Bucket::Inbox,
                },
            )
            .await;
        Ok((conv, record))
    }

    pub async fn complete(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<Conversation> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;

        let conv = self.engine.complete(conversation_id, agent_id).await?;

        // A closed conversation keeps no ephemeral state.
        self.typing.clear_conversation(conversation_id).await;
        self.presence.clear_conversation(conversation_id).await;

        self.hub
            .broadcast(
                conv.company_id,
                ConversationEvent::ConversationClosed { conversation_id },
            )
            .await;

        drop(_guard);
        let mut locks = self.locks.lock().await;
        locks.remove(&conversation_id);

        Ok(conv)
    }

    // =========================================================================
    // Typing / presence (best-effort, never surfaced to the customer)
    // =========================================================================

    /// No-op on a closed or unknown conversation rather than reviving
    /// ephemeral state for it.
    pub async fn set_typing(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<()> {
        let Some(conv) = self.open_conversation(conversation_id).await else {
            return Ok(());
        };

        self.typing.set_typing(conversation_id, agent_id).await;
        self.hub
            .broadcast(
                conv.company_id,
                ConversationEvent::TypingChanged {
                    conversation_id,
                    agent_id,
                    is_typing: true,
                },
            )
            .await;
        Ok(())
    }

    pub async fn clear_typing(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<()> {
        self.typing.clear_typing(conversation_id, agent_id).await;
        if let Some(conv) = self.open_conversation(conversation_id).await {
            self.hub
                .broadcast(
                    conv.company_id,
                    ConversationEvent::TypingChanged {
                        conversation_id,
                        agent_id,
                        is_typing: false,
                    },
                )
                .await;
        }
        Ok(())
    }

    pub async fn mark_online(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<()> {
        let Some(conv) = self.open_conversation(conversation_id).await else {
            return Ok(());
        };

        self.presence
            .mark_online(conv.company_id, conversation_id, agent_id)
            .await;
        self.hub
            .broadcast(
                conv.company_id,
                ConversationEvent::PresenceChanged {
                    conversation_id,
                    agent_id,
                    online: true,
                },
            )
            .await;
        Ok(())
    }

    pub async fn mark_offline(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<()> {
        self.presence.mark_offline(conversation_id, agent_id).await;
        if let Some(conv) = self.open_conversation(conversation_id).await {
            self.hub
                .broadcast(
                    conv.company_id,
                    ConversationEvent::PresenceChanged {
                        conversation_id,
                        agent_id,
                        online: false,
                    },
                )
                .await;
        }
        Ok(())
    }

    /// Load a conversation for a best-effort ephemeral update; None means
    /// "silently ignore" (unknown or closed).
    async fn open_conversation(&self, conversation_id: ConversationId) -> Option<Conversation> {
        match self.store.load_conversation(conversation_id).await {
            Ok(conv) if conv.status == ConversationStatus::Open => Some(conv),
            Ok(_) => None,
            Err(err) => {
                tracing::debug!(
                    conversation_id = %conversation_id,
                    error = %err,
                    "Ignoring ephemeral update for unknown conversation"
                );
                None
            }
        }
    }

    // =========================================================================
    // Labels
    // =========================================================================

    pub async fn add_label(
        &self,
        conversation_id: ConversationId,
        name: &str,
        source: Option<&str>,
    ) -> CoreResult<Label> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;
        self.labels.add(conversation_id, name, source).await
    }

    pub async fn update_label(
        &self,
        conversation_id: ConversationId,
        label_id: LabelId,
        name: Option<&str>,
        source: Option<&str>,
    ) -> CoreResult<Label> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;
        self.labels
            .update(conversation_id, label_id, name, source)
            .await
    }

    pub async fn delete_label(
        &self,
        conversation_id: ConversationId,
        label_id: LabelId,
    ) -> CoreResult<()> {
        let lock = self.lock_for(conversation_id).await;
        let _guard = lock.lock().await;
        self.labels.remove(conversation_id, label_id).await
    }

    // =========================================================================
    // Queries
    // =========================================================================

    /// Conversation record without the detail fan-in; used by transport
    /// layers for tenant checks before an operation.
    pub async fn conversation(&self, id: ConversationId) -> CoreResult<Conversation> {
        self.load_with_retry(id).await
    }

    pub async fn list_conversations(
        &self,
        company_id: CompanyId,
        bucket: Bucket,
        filter: ListFilter,
    ) -> CoreResult<Vec<ConversationSummary>> {
        let strategy = ExponentialBackoff::from_millis(10).take(3);
        let conversations = RetryIf::spawn(
            strategy,
            || self.store.list_conversations(company_id, bucket, &filter),
            is_transient,
        )
        .await?;

        let mut summaries = Vec::with_capacity(conversations.len());
        for conv in conversations {
            let unread_count = self.messages.unread_count(conv.id, SenderType::Agent).await?;
            let labels = self.labels.list(conv.id).await?;
            summaries.push(ConversationSummary {
                conversation: conv,
                unread_count,
                labels,
            });
        }
        Ok(summaries)
    }

    pub async fn get_conversation(
        &self,
        conversation_id: ConversationId,
    ) -> CoreResult<ConversationDetail> {
        let conv = self.load_with_retry(conversation_id).await?;

        let mut messages = self
            .messages
            .page(conversation_id, None, self.config.default_page_size)
            .await?;
        messages.reverse(); // chronological for the detail view

        let labels = self.labels.list(conversation_id).await?;
        let unread_count = self
            .messages
            .unread_count(conversation_id, SenderType::Agent)
            .await?;
        let typing = self.typing.list_typing(conversation_id).await;
        let online = self.presence.list_online(conversation_id).await;

        Ok(ConversationDetail {
            conversation: conv,
            messages,
            labels,
            unread_count,
            typing,
            online,
        })
    }

    pub async fn release_history(
        &self,
        conversation_id: ConversationId,
    ) -> CoreResult<Vec<ReleaseRecord>> {
        self.store.release_history(conversation_id).await
    }

    pub async fn assignment_stats(
        &self,
        company_id: CompanyId,
        me: AgentId,
    ) -> CoreResult<AssignmentStats> {
        let stored = self.store.stats(company_id, me).await?;
        let online = self.presence.online_agents(company_id).await;
        let agents = self.directory.company_agents(company_id).await?;
        let eligible_reps = agents
            .iter()
            .filter(|a| {
                a.role == chatdesk_shared::AgentRole::CustomerCare && online.contains(&a.id)
            })
            .count() as i64;

        Ok(AssignmentStats {
            total_conversations: stored.total_conversations,
            facebook_conversations: stored.facebook_conversations,
            whatsapp_conversations: stored.whatsapp_conversations,
            other_conversations: stored.other_conversations,
            inbox: stored.inbox,
            taken: stored.taken,
            complete: stored.complete,
            assigned_to_me: stored.assigned_to_me,
            eligible_reps,
        })
    }

    // =========================================================================
    // Subscriptions
    // =========================================================================

    /// Subscribe a session to one conversation's events. The agent must
    /// belong to the conversation's company.
    pub async fn subscribe_conversation(
        &self,
        conversation_id: ConversationId,
        agent_id: AgentId,
        sub: Arc<Subscriber>,
    ) -> CoreResult<()> {
        let conv = self.load_with_retry(conversation_id).await?;
        let agent = self.directory.agent(agent_id).await?;
        if conv.company_id != agent.company_id {
            return Err(CoreError::Forbidden(
                "conversation belongs to another company".to_string(),
            ));
        }
        self.hub.join_conversation(conversation_id, sub).await;
        Ok(())
    }

    /// Subscribe a session to a company's aggregate feed (list badges).
    pub async fn subscribe_company(
        &self,
        company_id: CompanyId,
        agent_id: AgentId,
        sub: Arc<Subscriber>,
    ) -> CoreResult<()> {
        let agent = self.directory.agent(agent_id).await?;
        if agent.company_id != company_id {
            return Err(CoreError::Forbidden(
                "agent belongs to another company".to_string(),
            ));
        }
        self.hub.join_company(company_id, sub).await;
        Ok(())
    }

    pub async fn unsubscribe_conversation(
        &self,
        conversation_id: ConversationId,
        session_id: &Uuid,
    ) {
        self.hub
            .leave_conversation(&conversation_id, session_id)
            .await;
    }

    /// Disconnect cleanup: drop the session from every room and feed.
    pub async fn remove_session(&self, session_id: &Uuid) {
        self.hub.remove_session(session_id).await;
    }
}

fn is_transient(err: &CoreError) -> bool {
    matches!(err, CoreError::Storage(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::directory::InMemoryDirectory;
    use crate::store::memory::MemoryStore;
    use chatdesk_shared::{Agent, AgentRole};
    use tokio::sync::mpsc;

    struct Fixture {
        service: Arc<ConversationService>,
        directory: Arc<InMemoryDirectory>,
        company_id: CompanyId,
    }

    async fn fixture() -> Fixture {
        let store: Arc<dyn ConversationStore> = Arc::new(MemoryStore::new());
        let directory = Arc::new(InMemoryDirectory::new());
        let service = Arc::new(ConversationService::new(
            store,
            Arc::clone(&directory) as Arc<dyn AgentDirectory>,
            CoreConfig::default(),
        ));
        Fixture {
            service,
            directory,
            company_id: CompanyId::new(),
        }
    }

    async fn add_agent(fx: &Fixture, role: AgentRole) -> AgentId {
        let agent = Agent {
            id: AgentId::new(),
            company_id: fx.company_id,
            display_name: "rep".to_string(),
            role,
        };
        let id = agent.id;
        fx.directory.add_agent(agent, id.to_string()).await;
        id
    }

    fn inbound(fx: &Fixture, external: &str, content: &str) -> InboundMessage {
        InboundMessage {
            company_id: fx.company_id,
            platform: Platform::Whatsapp,
            external_user_id: external.to_string(),
            external_user_name: "Ada".to_string(),
            content: Some(content.to_string()),
            image_url: None,
        }
    }

    fn subscriber(agent_id: AgentId) -> (Arc<Subscriber>, mpsc::UnboundedReceiver<ConversationEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Subscriber::new(agent_id, tx)), rx)
    }

    #[tokio::test]
    async fn test_inbound_threads_into_open_conversation() {
        let fx = fixture().await;

        let (conv1, msg1) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "hi")).await.unwrap();
        let (conv2, msg2) = fx
            .service
            .ingest_inbound(inbound(&fx, "wa-1", "anyone there?"))
            .await
            .unwrap();

        assert_eq!(conv1.id, conv2.id);
        assert_eq!(msg1.seq, 1);
        assert_eq!(msg2.seq, 2);

        // A different channel user opens a new conversation
        let (conv3, _) = fx.service.ingest_inbound(inbound(&fx, "wa-2", "hello")).await.unwrap();
        assert_ne!(conv3.id, conv1.id);
    }

    #[tokio::test]
    async fn test_inbound_auto_routes_to_online_agent() {
        let fx = fixture().await;
        let rep = add_agent(&fx, AgentRole::CustomerCare).await;

        // No one online: stays in inbox
        let (conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "hi")).await.unwrap();
        assert_eq!(conv.bucket(), Bucket::Inbox);

        // Rep comes online; the next inbound conversation routes to them
        fx.service.mark_online(conv.id, rep).await.unwrap();
        let (routed, _) = fx.service.ingest_inbound(inbound(&fx, "wa-2", "hi")).await.unwrap();
        assert_eq!(routed.assignment, Assignment::AssignedTo(rep));
        assert_eq!(routed.bucket(), Bucket::Taken);
    }

    #[tokio::test]
    async fn test_take_release_retake_scenario() {
        let fx = fixture().await;
        let a1 = add_agent(&fx, AgentRole::CustomerCare).await;
        let a2 = add_agent(&fx, AgentRole::CustomerCare).await;

        let (conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "help")).await.unwrap();

        fx.service.assign(conv.id, a1).await.unwrap();
        let lost = fx.service.assign(conv.id, a2).await;
        assert!(matches!(lost, Err(CoreError::Conflict(_))));

        let (released, record) = fx.service.unassign(conv.id, a1).await.unwrap();
        assert_eq!(released.bucket(), Bucket::Inbox);
        assert_eq!(record.agent_id, a1);
        assert_eq!(fx.service.release_history(conv.id).await.unwrap().len(), 1);

        let retaken = fx.service.assign(conv.id, a2).await.unwrap();
        assert_eq!(retaken.assignment, Assignment::AssignedTo(a2));
    }

    #[tokio::test]
    async fn test_typing_on_closed_conversation_is_a_noop() {
        let fx = fixture().await;
        let rep = add_agent(&fx, AgentRole::CustomerCare).await;

        let (conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "hi")).await.unwrap();
        fx.service.assign(conv.id, rep).await.unwrap();
        fx.service.set_typing(conv.id, rep).await.unwrap();

        fx.service.complete(conv.id, rep).await.unwrap();

        // Closing cleared the indicator, and a late set_typing is ignored
        assert!(fx.service.typing().list_typing(conv.id).await.is_empty());
        fx.service.set_typing(conv.id, rep).await.unwrap();
        assert!(fx.service.typing().list_typing(conv.id).await.is_empty());
        assert!(fx.service.presence().list_online(conv.id).await.is_empty());
    }

    #[tokio::test]
    async fn test_send_message_on_closed_conversation_fails() {
        let fx = fixture().await;
        let rep = add_agent(&fx, AgentRole::CustomerCare).await;

        let (conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "hi")).await.unwrap();
        fx.service.assign(conv.id, rep).await.unwrap();
        fx.service.complete(conv.id, rep).await.unwrap();

        let err = fx
            .service
            .send_message(conv.id, rep, Some("too late".to_string()), None)
            .await;
        assert!(matches!(
            err,
            Err(CoreError::InvalidTransition {
                expected: Bucket::Taken,
                actual: Bucket::Complete,
            })
        ));
    }

    #[tokio::test]
    async fn test_owned_conversation_rejects_other_senders() {
        let fx = fixture().await;
        let owner = add_agent(&fx, AgentRole::CustomerCare).await;
        let other = add_agent(&fx, AgentRole::CustomerCare).await;
        let boss = add_agent(&fx, AgentRole::Supervisor).await;

        let (conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "hi")).await.unwrap();
        fx.service.assign(conv.id, owner).await.unwrap();

        let denied = fx
            .service
            .send_message(conv.id, other, Some("mine now".to_string()), None)
            .await;
        assert!(matches!(denied, Err(CoreError::Forbidden(_))));

        fx.service
            .send_message(conv.id, boss, Some("supervisor here".to_string()), None)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_subscriber_receives_events_in_order() {
        let fx = fixture().await;
        let rep = add_agent(&fx, AgentRole::CustomerCare).await;

        let (conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "hi")).await.unwrap();
        fx.service.assign(conv.id, rep).await.unwrap();

        let (sub, mut rx) = subscriber(rep);
        fx.service
            .subscribe_conversation(conv.id, rep, sub)
            .await
            .unwrap();

        fx.service
            .send_message(conv.id, rep, Some("one".to_string()), None)
            .await
            .unwrap();
        fx.service
            .send_message(conv.id, rep, Some("two".to_string()), None)
            .await
            .unwrap();

        let first = rx.try_recv().unwrap();
        let second = rx.try_recv().unwrap();
        match (first, second) {
            (
                ConversationEvent::MessageCreated { message: m1, .. },
                ConversationEvent::MessageCreated { message: m2, .. },
            ) => {
                assert_eq!(m1.content.as_deref(), Some("one"));
                assert_eq!(m2.content.as_deref(), Some("two"));
                assert!(m1.seq < m2.seq);
            }
            other => panic!("unexpected events: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_disconnected_subscriber_refetches_exactly_once() {
        let fx = fixture().await;
        let rep = add_agent(&fx, AgentRole::CustomerCare).await;

        let (conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "hi")).await.unwrap();
        fx.service.assign(conv.id, rep).await.unwrap();

        // Subscriber's receiver is dropped: the gateway side went away
        let (sub, rx) = subscriber(rep);
        fx.service
            .subscribe_conversation(conv.id, rep, Arc::clone(&sub))
            .await
            .unwrap();
        drop(rx);

        fx.service
            .send_message(conv.id, rep, Some("hello".to_string()), None)
            .await
            .unwrap();
        fx.service.remove_session(&sub.session_id).await;

        // On reconnect the client re-fetches; the message appears exactly once
        let detail = fx.service.get_conversation(conv.id).await.unwrap();
        let hellos = detail
            .messages
            .iter()
            .filter(|m| m.content.as_deref() == Some("hello"))
            .count();
        assert_eq!(hellos, 1);
    }

    #[tokio::test]
    async fn test_list_buckets_and_unread_counts() {
        let fx = fixture().await;
        let rep = add_agent(&fx, AgentRole::CustomerCare).await;

        let (inbox_conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "a")).await.unwrap();
        fx.service
            .ingest_inbound(inbound(&fx, "wa-1", "b"))
            .await
            .unwrap();
        let (taken_conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-2", "c")).await.unwrap();
        fx.service.assign(taken_conv.id, rep).await.unwrap();

        let inbox = fx
            .service
            .list_conversations(fx.company_id, Bucket::Inbox, ListFilter::default())
            .await
            .unwrap();
        assert_eq!(inbox.len(), 1);
        assert_eq!(inbox[0].conversation.id, inbox_conv.id);
        assert_eq!(inbox[0].unread_count, 2);

        let taken = fx
            .service
            .list_conversations(fx.company_id, Bucket::Taken, ListFilter::default())
            .await
            .unwrap();
        assert_eq!(taken.len(), 1);

        fx.service.mark_read(inbox_conv.id, SenderType::Agent).await.unwrap();
        let inbox = fx
            .service
            .list_conversations(fx.company_id, Bucket::Inbox, ListFilter::default())
            .await
            .unwrap();
        assert_eq!(inbox[0].unread_count, 0);
    }

    #[tokio::test]
    async fn test_label_filter_on_list() {
        let fx = fixture().await;

        let (tagged, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "a")).await.unwrap();
        fx.service.ingest_inbound(inbound(&fx, "wa-2", "b")).await.unwrap();
        fx.service.add_label(tagged.id, "VIP", None).await.unwrap();

        let filtered = fx
            .service
            .list_conversations(
                fx.company_id,
                Bucket::Inbox,
                ListFilter {
                    status: None,
                    label: Some("vip".to_string()),
                },
            )
            .await
            .unwrap();
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].conversation.id, tagged.id);
    }

    #[tokio::test]
    async fn test_assignment_stats() {
        let fx = fixture().await;
        let me = add_agent(&fx, AgentRole::CustomerCare).await;
        let boss = add_agent(&fx, AgentRole::Supervisor).await;

        let (c1, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "a")).await.unwrap();
        let (c2, _) = fx.service.ingest_inbound(inbound(&fx, "fb-1", "b")).await.unwrap();
        fx.service.ingest_inbound(inbound(&fx, "wa-3", "c")).await.unwrap();

        fx.service.assign(c1.id, me).await.unwrap();
        fx.service.complete(c2.id, boss).await.unwrap();
        fx.service.mark_online(c1.id, me).await.unwrap();

        let stats = fx.service.assignment_stats(fx.company_id, me).await.unwrap();
        assert_eq!(stats.total_conversations, 3);
        assert_eq!(stats.whatsapp_conversations, 3);
        assert_eq!(stats.inbox, 1);
        assert_eq!(stats.taken, 1);
        assert_eq!(stats.complete, 1);
        assert_eq!(stats.assigned_to_me, 1);
        assert_eq!(stats.eligible_reps, 1);
    }

    #[tokio::test]
    async fn test_subscribe_enforces_company_boundary() {
        let fx = fixture().await;
        let rep = add_agent(&fx, AgentRole::CustomerCare).await;

        // Agent from another company
        let outsider = Agent {
            id: AgentId::new(),
            company_id: CompanyId::new(),
            display_name: "spy".to_string(),
            role: AgentRole::CustomerCare,
        };
        let outsider_id = outsider.id;
        fx.directory.add_agent(outsider, "spy-token").await;

        let (conv, _) = fx.service.ingest_inbound(inbound(&fx, "wa-1", "hi")).await.unwrap();

        let (sub, _rx) = subscriber(outsider_id);
        let denied = fx
            .service
            .subscribe_conversation(conv.id, outsider_id, sub)
            .await;
        assert!(matches!(denied, Err(CoreError::Forbidden(_))));

        let (sub, _rx) = subscriber(rep);
        fx.service
            .subscribe_conversation(conv.id, rep, sub)
            .await
            .unwrap();
    }
}
