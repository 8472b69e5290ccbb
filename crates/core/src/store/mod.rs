//! Storage contract for the conversation core
//!
//! The persistent store is an external collaborator consumed through this
//! narrow, per-call-transactional trait. Two implementations ship with the
//! crate: [`memory::MemoryStore`] for tests and single-process use, and
//! [`postgres::PgStore`] backed by sqlx.

pub mod memory;
pub mod postgres;

use std::collections::HashMap;

use async_trait::async_trait;

use chatdesk_shared::{
    AgentId, Assignment, Bucket, CompanyId, Conversation, ConversationId, ConversationStatus,
    CoreResult, Label, LabelId, Message, Platform, ReleaseRecord, SenderType,
};

/// Input for creating a conversation from an inbound channel message.
#[derive(Debug, Clone)]
pub struct NewConversation {
    pub company_id: CompanyId,
    pub platform: Platform,
    pub external_user_id: String,
    pub external_user_name: String,
}

/// Input for appending a message. The store assigns id, seq, and timestamp.
#[derive(Debug, Clone)]
pub struct NewMessage {
    pub conversation_id: ConversationId,
    pub sender: SenderType,
    pub content: Option<String>,
    pub image_url: Option<String>,
}

/// List-view filters applied on top of the bucket.
#[derive(Debug, Clone, Default)]
pub struct ListFilter {
    pub status: Option<ConversationStatus>,
    pub label: Option<String>,
}

/// Per-company aggregate counters, before presence enrichment.
#[derive(Debug, Clone, Default)]
pub struct StoredStats {
    pub total_conversations: i64,
    pub facebook_conversations: i64,
    pub whatsapp_conversations: i64,
    pub other_conversations: i64,
    pub inbox: i64,
    pub taken: i64,
    pub complete: i64,
    pub assigned_to_me: i64,
}

/// Transactional repository contract for conversations and their owned
/// records. Every method is atomic with respect to concurrent callers.
#[async_trait]
pub trait ConversationStore: Send + Sync {
    // Conversations ----------------------------------------------------------

    async fn insert_conversation(&self, new: NewConversation) -> CoreResult<Conversation>;

    async fn load_conversation(&self, id: ConversationId) -> CoreResult<Conversation>;

    /// Find an open conversation for a channel user, used to thread inbound
    /// messages into an existing conversation instead of opening a new one.
    async fn find_open_by_external(
        &self,
        company_id: CompanyId,
        platform: Platform,
        external_user_id: &str,
    ) -> CoreResult<Option<Conversation>>;

    /// Compare-and-swap on the assignment field. Returns the updated
    /// conversation when the current assignment matched `expected` (and the
    /// conversation is still open), or `None` when the caller lost the race.
    async fn update_assignment(
        &self,
        id: ConversationId,
        expected: Assignment,
        new: Assignment,
    ) -> CoreResult<Option<Conversation>>;

    /// Close an open conversation. Returns `None` if it was not open.
    async fn close_conversation(&self, id: ConversationId) -> CoreResult<Option<Conversation>>;

    async fn list_conversations(
        &self,
        company_id: CompanyId,
        bucket: Bucket,
        filter: &ListFilter,
    ) -> CoreResult<Vec<Conversation>>;

    // Messages ---------------------------------------------------------------

    async fn append_message(&self, new: NewMessage) -> CoreResult<Message>;

    /// Page messages newest-first. `before_seq` is an exclusive cursor;
    /// pages are stable under concurrent appends.
    async fn page_messages(
        &self,
        id: ConversationId,
        before_seq: Option<i64>,
        limit: i64,
    ) -> CoreResult<Vec<Message>>;

    /// Mark all messages not authored by `reader` as read. Idempotent;
    /// returns the number of newly-read messages.
    async fn mark_read(&self, id: ConversationId, reader: SenderType) -> CoreResult<u64>;

    /// Unread messages authored by the side opposite to `reader`.
    async fn unread_count(&self, id: ConversationId, reader: SenderType) -> CoreResult<i64>;

    // Labels -----------------------------------------------------------------

    async fn insert_label(
        &self,
        id: ConversationId,
        name: &str,
        source: Option<&str>,
    ) -> CoreResult<Label>;

    async fn update_label(
        &self,
        id: ConversationId,
        label_id: LabelId,
        name: Option<&str>,
        source: Option<&str>,
    ) -> CoreResult<Label>;

    async fn delete_label(&self, id: ConversationId, label_id: LabelId) -> CoreResult<()>;

    async fn labels(&self, id: ConversationId) -> CoreResult<Vec<Label>>;

    // Release ledger ---------------------------------------------------------

    async fn append_release(
        &self,
        id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<ReleaseRecord>;

    async fn release_history(&self, id: ConversationId) -> CoreResult<Vec<ReleaseRecord>>;

    // Aggregates -------------------------------------------------------------

    /// Open conversations currently assigned, per agent. Agents with zero
    /// assignments are absent from the map.
    async fn open_assignment_counts(
        &self,
        company_id: CompanyId,
    ) -> CoreResult<HashMap<AgentId, i64>>;

    async fn stats(&self, company_id: CompanyId, me: AgentId) -> CoreResult<StoredStats>;
}
