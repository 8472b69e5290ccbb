//! In-memory conversation store
//!
//! Backs tests and single-process deployments. Each conversation lives in
//! its own cell behind a `tokio::Mutex`, so mutations on one conversation
//! serialize while different conversations proceed fully in parallel; the
//! outer map lock is held only long enough to clone the cell handle.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use time::OffsetDateTime;
use tokio::sync::{Mutex, RwLock};

use chatdesk_shared::{
    AgentId, Assignment, Bucket, CompanyId, Conversation, ConversationId, ConversationStatus,
    CoreError, CoreResult, Label, LabelId, Message, MessageId, Platform, ReleaseId, ReleaseRecord,
    SenderType,
};

use super::{ConversationStore, ListFilter, NewConversation, NewMessage, StoredStats};

struct Cell {
    conv: Conversation,
    next_seq: i64,
    messages: Vec<Message>,
    labels: Vec<Label>,
    releases: Vec<ReleaseRecord>,
}

pub struct MemoryStore {
    cells: RwLock<HashMap<ConversationId, Arc<Mutex<Cell>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self {
            cells: RwLock::new(HashMap::new()),
        }
    }

    async fn cell(&self, id: ConversationId) -> CoreResult<Arc<Mutex<Cell>>> {
        let cells = self.cells.read().await;
        cells
            .get(&id)
            .cloned()
            .ok_or(CoreError::NotFound("conversation"))
    }

    async fn all_cells(&self) -> Vec<Arc<Mutex<Cell>>> {
        let cells = self.cells.read().await;
        cells.values().cloned().collect()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConversationStore for MemoryStore {
    async fn insert_conversation(&self, new: NewConversation) -> CoreResult<Conversation> {
        let now = OffsetDateTime::now_utc();
        let conv = Conversation {
            id: ConversationId::new(),
            company_id: new.company_id,
            platform: new.platform,
            external_user_id: new.external_user_id,
            external_user_name: new.external_user_name,
            status: ConversationStatus::Open,
            assignment: Assignment::Unassigned,
            last_message_at: None,
            created_at: now,
            updated_at: now,
            closed_at: None,
        };

        let mut cells = self.cells.write().await;
        cells.insert(
            conv.id,
            Arc::new(Mutex::new(Cell {
                conv: conv.clone(),
                next_seq: 1,
                messages: Vec::new(),
                labels: Vec::new(),
                releases: Vec::new(),
            })),
        );
        Ok(conv)
    }

    async fn load_conversation(&self, id: ConversationId) -> CoreResult<Conversation> {
        let cell = self.cell(id).await?;
        let cell = cell.lock().await;
        Ok(cell.conv.clone())
    }

    async fn find_open_by_external(
        &self,
        company_id: CompanyId,
        platform: Platform,
        external_user_id: &str,
    ) -> CoreResult<Option<Conversation>> {
        for cell in self.all_cells().await {
            let cell = cell.lock().await;
            let conv = &cell.conv;
            if conv.company_id == company_id
                && conv.platform == platform
                && conv.external_user_id == external_user_id
                && conv.status == ConversationStatus::Open
            {
                return Ok(Some(conv.clone()));
            }
        }
        Ok(None)
    }

    async fn update_assignment(
        &self,
        id: ConversationId,
        expected: Assignment,
        new: Assignment,
    ) -> CoreResult<Option<Conversation>> {
        let cell = self.cell(id).await?;
        let mut cell = cell.lock().await;
        if cell.conv.status != ConversationStatus::Open || cell.conv.assignment != expected {
            return Ok(None);
        }
        cell.conv.assignment = new;
        cell.conv.updated_at = OffsetDateTime::now_utc();
        Ok(Some(cell.conv.clone()))
    }

    async fn close_conversation(&self, id: ConversationId) -> CoreResult<Option<Conversation>> {
        let cell = self.cell(id).await?;
        let mut cell = cell.lock().await;
        if cell.conv.status != ConversationStatus::Open {
            return Ok(None);
        }
        let now = OffsetDateTime::now_utc();
        cell.conv.status = ConversationStatus::Closed;
        cell.conv.closed_at = Some(now);
        cell.conv.updated_at = now;
        Ok(Some(cell.conv.clone()))
    }

    async fn list_conversations(
        &self,
        company_id: CompanyId,
        bucket: Bucket,
        filter: &ListFilter,
    ) -> CoreResult<Vec<Conversation>> {
        let mut out = Vec::new();
        for cell in self.all_cells().await {
            let cell = cell.lock().await;
            let conv = &cell.conv;
            if conv.company_id != company_id || conv.bucket() != bucket {
                continue;
            }
            if let Some(status) = filter.status {
                if conv.status != status {
                    continue;
                }
            }
            if let Some(ref label) = filter.label {
                let wanted = label.to_lowercase();
                if !cell.labels.iter().any(|l| l.name.to_lowercase() == wanted) {
                    continue;
                }
            }
            out.push(conv.clone());
        }
        // Most recently active first; conversations with no messages yet sort
        // by creation time.
        out.sort_by_key(|c| std::cmp::Reverse(c.last_message_at.unwrap_or(c.created_at)));
        Ok(out)
    }

    async fn append_message(&self, new: NewMessage) -> CoreResult<Message> {
        let cell = self.cell(new.conversation_id).await?;
        let mut cell = cell.lock().await;

        let now = OffsetDateTime::now_utc();
        let seq = cell.next_seq;
        cell.next_seq += 1;

        let message = Message {
            id: MessageId::new(),
            conversation_id: new.conversation_id,
            seq,
            sender: new.sender,
            content: new.content,
            image_url: new.image_url,
            created_at: now,
            is_read: false,
            is_seen: false,
        };
        cell.messages.push(message.clone());
        cell.conv.last_message_at = Some(now);
        cell.conv.updated_at = now;
        Ok(message)
    }

    async fn page_messages(
        &self,
        id: ConversationId,
        before_seq: Option<i64>,
        limit: i64,
    ) -> CoreResult<Vec<Message>> {
        let limit = limit.clamp(1, 100) as usize;
        let cell = self.cell(id).await?;
        let cell = cell.lock().await;

        let mut page: Vec<Message> = cell
            .messages
            .iter()
            .filter(|m| before_seq.map_or(true, |cursor| m.seq < cursor))
            .cloned()
            .collect();
        page.sort_by_key(|m| std::cmp::Reverse(m.seq));
        page.truncate(limit);
        Ok(page)
    }

    async fn mark_read(&self, id: ConversationId, reader: SenderType) -> CoreResult<u64> {
        let cell = self.cell(id).await?;
        let mut cell = cell.lock().await;
        let mut newly_read = 0;
        for message in cell.messages.iter_mut() {
            if message.sender != reader && !message.is_read {
                message.is_read = true;
                message.is_seen = true;
                newly_read += 1;
            }
        }
        Ok(newly_read)
    }

    async fn unread_count(&self, id: ConversationId, reader: SenderType) -> CoreResult<i64> {
        let cell = self.cell(id).await?;
        let cell = cell.lock().await;
        Ok(cell
            .messages
            .iter()
            .filter(|m| m.sender != reader && !m.is_read)
            .count() as i64)
    }

    async fn insert_label(
        &self,
        id: ConversationId,
        name: &str,
        source: Option<&str>,
    ) -> CoreResult<Label> {
        let cell = self.cell(id).await?;
        let mut cell = cell.lock().await;

        let lowered = name.to_lowercase();
        if cell.labels.iter().any(|l| l.name.to_lowercase() == lowered) {
            return Err(CoreError::Conflict(format!(
                "label '{name}' already exists on this conversation"
            )));
        }

        let label = Label {
            id: LabelId::new(),
            conversation_id: id,
            name: name.to_string(),
            source: source.map(ToString::to_string),
            created_at: OffsetDateTime::now_utc(),
        };
        cell.labels.push(label.clone());
        Ok(label)
    }

    async fn update_label(
        &self,
        id: ConversationId,
        label_id: LabelId,
        name: Option<&str>,
        source: Option<&str>,
    ) -> CoreResult<Label> {
        let cell = self.cell(id).await?;
        let mut cell = cell.lock().await;

        if let Some(new_name) = name {
            let lowered = new_name.to_lowercase();
            if cell
                .labels
                .iter()
                .any(|l| l.id != label_id && l.name.to_lowercase() == lowered)
            {
                return Err(CoreError::Conflict(format!(
                    "label '{new_name}' already exists on this conversation"
                )));
            }
        }

        let label = cell
            .labels
            .iter_mut()
            .find(|l| l.id == label_id)
            .ok_or(CoreError::NotFound("label"))?;
        if let Some(new_name) = name {
            label.name = new_name.to_string();
        }
        if let Some(new_source) = source {
            label.source = Some(new_source.to_string());
        }
        Ok(label.clone())
    }

    async fn delete_label(&self, id: ConversationId, label_id: LabelId) -> CoreResult<()> {
        let cell = self.cell(id).await?;
        let mut cell = cell.lock().await;
        let before = cell.labels.len();
        cell.labels.retain(|l| l.id != label_id);
        if cell.labels.len() == before {
            return Err(CoreError::NotFound("label"));
        }
        Ok(())
    }

    async fn labels(&self, id: ConversationId) -> CoreResult<Vec<Label>> {
        let cell = self.cell(id).await?;
        let cell = cell.lock().await;
        Ok(cell.labels.clone())
    }

    async fn append_release(
        &self,
        id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<ReleaseRecord> {
        let cell = self.cell(id).await?;
        let mut cell = cell.lock().await;
        let record = ReleaseRecord {
            id: ReleaseId::new(),
            conversation_id: id,
            agent_id,
            released_at: OffsetDateTime::now_utc(),
        };
        cell.releases.push(record.clone());
        Ok(record)
    }

    async fn release_history(&self, id: ConversationId) -> CoreResult<Vec<ReleaseRecord>> {
        let cell = self.cell(id).await?;
        let cell = cell.lock().await;
        Ok(cell.releases.clone())
    }

    async fn open_assignment_counts(
        &self,
        company_id: CompanyId,
    ) -> CoreResult<HashMap<AgentId, i64>> {
        let mut counts = HashMap::new();
        for cell in self.all_cells().await {
            let cell = cell.lock().await;
            let conv = &cell.conv;
            if conv.company_id == company_id && conv.status == ConversationStatus::Open {
                if let Some(agent) = conv.assignment.agent() {
                    *counts.entry(agent).or_insert(0) += 1;
                }
            }
        }
        Ok(counts)
    }

    async fn stats(&self, company_id: CompanyId, me: AgentId) -> CoreResult<StoredStats> {
        let mut stats = StoredStats::default();
        for cell in self.all_cells().await {
            let cell = cell.lock().await;
            let conv = &cell.conv;
            if conv.company_id != company_id {
                continue;
            }
            stats.total_conversations += 1;
            match conv.platform {
                Platform::Facebook => stats.facebook_conversations += 1,
                Platform::Whatsapp => stats.whatsapp_conversations += 1,
                Platform::Other => stats.other_conversations += 1,
            }
            match conv.bucket() {
                Bucket::Inbox => stats.inbox += 1,
                Bucket::Taken => stats.taken += 1,
                Bucket::Complete => stats.complete += 1,
            }
            if conv.status == ConversationStatus::Open
                && conv.assignment.agent() == Some(me)
            {
                stats.assigned_to_me += 1;
            }
        }
        Ok(stats)
    }
}
