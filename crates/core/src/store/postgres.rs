//! Postgres-backed conversation store
//!
//! Runtime sqlx queries against the schema in `migrations/`. Assignment
//! transitions use conditional UPDATEs so the compare-and-swap happens in
//! the database; there is no read-then-write window.

use std::collections::HashMap;

use async_trait::async_trait;
use sqlx::{FromRow, PgPool};
use time::OffsetDateTime;
use uuid::Uuid;

use chatdesk_shared::{
    Agent, AgentId, AgentRole, Assignment, Bucket, CompanyId, Conversation, ConversationId,
    ConversationStatus, CoreError, CoreResult, Label, LabelId, Message, Platform, ReleaseRecord,
    SenderType,
};

use crate::directory::{role_grants, AgentDirectory};

use super::{ConversationStore, ListFilter, NewConversation, NewMessage, StoredStats};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

// =============================================================================
// Database Row Types
// =============================================================================

#[derive(Debug, FromRow)]
struct ConversationRow {
    id: Uuid,
    company_id: Uuid,
    platform: String,
    external_user_id: String,
    external_user_name: String,
    status: String,
    assigned_to: Option<Uuid>,
    last_message_at: Option<OffsetDateTime>,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
    closed_at: Option<OffsetDateTime>,
}

impl From<ConversationRow> for Conversation {
    fn from(row: ConversationRow) -> Self {
        Conversation {
            id: row.id.into(),
            company_id: row.company_id.into(),
            platform: Platform::parse(&row.platform),
            external_user_id: row.external_user_id,
            external_user_name: row.external_user_name,
            status: ConversationStatus::parse(&row.status),
            assignment: row.assigned_to.map(AgentId::from).into(),
            last_message_at: row.last_message_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
            closed_at: row.closed_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: Uuid,
    conversation_id: Uuid,
    seq: i64,
    sender: String,
    content: Option<String>,
    image_url: Option<String>,
    is_read: bool,
    is_seen: bool,
    created_at: OffsetDateTime,
}

impl From<MessageRow> for Message {
    fn from(row: MessageRow) -> Self {
        Message {
            id: row.id.into(),
            conversation_id: row.conversation_id.into(),
            seq: row.seq,
            sender: SenderType::parse(&row.sender),
            content: row.content,
            image_url: row.image_url,
            created_at: row.created_at,
            is_read: row.is_read,
            is_seen: row.is_seen,
        }
    }
}

#[derive(Debug, FromRow)]
struct LabelRow {
    id: Uuid,
    conversation_id: Uuid,
    name: String,
    source: Option<String>,
    created_at: OffsetDateTime,
}

impl From<LabelRow> for Label {
    fn from(row: LabelRow) -> Self {
        Label {
            id: row.id.into(),
            conversation_id: row.conversation_id.into(),
            name: row.name,
            source: row.source,
            created_at: row.created_at,
        }
    }
}

#[derive(Debug, FromRow)]
struct ReleaseRow {
    id: Uuid,
    conversation_id: Uuid,
    agent_id: Uuid,
    released_at: OffsetDateTime,
}

impl From<ReleaseRow> for ReleaseRecord {
    fn from(row: ReleaseRow) -> Self {
        ReleaseRecord {
            id: row.id.into(),
            conversation_id: row.conversation_id.into(),
            agent_id: row.agent_id.into(),
            released_at: row.released_at,
        }
    }
}

const CONVERSATION_COLUMNS: &str = "id, company_id, platform, external_user_id, \
     external_user_name, status, assigned_to, last_message_at, created_at, updated_at, closed_at";

// =============================================================================
// ConversationStore
// =============================================================================

#[async_trait]
impl ConversationStore for PgStore {
    async fn insert_conversation(&self, new: NewConversation) -> CoreResult<Conversation> {
        let row: ConversationRow = sqlx::query_as(&format!(
            r#"
            INSERT INTO conversations (company_id, platform, external_user_id, external_user_name)
            VALUES ($1, $2, $3, $4)
            RETURNING {CONVERSATION_COLUMNS}
            "#,
        ))
        .bind(new.company_id.0)
        .bind(new.platform.as_str())
        .bind(&new.external_user_id)
        .bind(&new.external_user_name)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn load_conversation(&self, id: ConversationId) -> CoreResult<Conversation> {
        let row: Option<ConversationRow> = sqlx::query_as(&format!(
            "SELECT {CONVERSATION_COLUMNS} FROM conversations WHERE id = $1",
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into).ok_or(CoreError::NotFound("conversation"))
    }

    async fn find_open_by_external(
        &self,
        company_id: CompanyId,
        platform: Platform,
        external_user_id: &str,
    ) -> CoreResult<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE company_id = $1 AND platform = $2 AND external_user_id = $3
              AND status = 'open'
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        ))
        .bind(company_id.0)
        .bind(platform.as_str())
        .bind(external_user_id)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn update_assignment(
        &self,
        id: ConversationId,
        expected: Assignment,
        new: Assignment,
    ) -> CoreResult<Option<Conversation>> {
        let new_agent = new.agent().map(|a| a.0);

        let row: Option<ConversationRow> = match expected {
            Assignment::Unassigned => {
                sqlx::query_as(&format!(
                    r#"
                    UPDATE conversations
                    SET assigned_to = $2, updated_at = NOW()
                    WHERE id = $1 AND status = 'open' AND assigned_to IS NULL
                    RETURNING {CONVERSATION_COLUMNS}
                    "#,
                ))
                .bind(id.0)
                .bind(new_agent)
                .fetch_optional(&self.pool)
                .await?
            }
            Assignment::AssignedTo(owner) => {
                sqlx::query_as(&format!(
                    r#"
                    UPDATE conversations
                    SET assigned_to = $2, updated_at = NOW()
                    WHERE id = $1 AND status = 'open' AND assigned_to = $3
                    RETURNING {CONVERSATION_COLUMNS}
                    "#,
                ))
                .bind(id.0)
                .bind(new_agent)
                .bind(owner.0)
                .fetch_optional(&self.pool)
                .await?
            }
        };

        Ok(row.map(Into::into))
    }

    async fn close_conversation(&self, id: ConversationId) -> CoreResult<Option<Conversation>> {
        let row: Option<ConversationRow> = sqlx::query_as(&format!(
            r#"
            UPDATE conversations
            SET status = 'closed', closed_at = NOW(), updated_at = NOW()
            WHERE id = $1 AND status = 'open'
            RETURNING {CONVERSATION_COLUMNS}
            "#,
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn list_conversations(
        &self,
        company_id: CompanyId,
        bucket: Bucket,
        filter: &ListFilter,
    ) -> CoreResult<Vec<Conversation>> {
        let bucket_clause = match bucket {
            Bucket::Inbox => "status = 'open' AND assigned_to IS NULL",
            Bucket::Taken => "status = 'open' AND assigned_to IS NOT NULL",
            Bucket::Complete => "status = 'closed'",
        };

        let rows: Vec<ConversationRow> = sqlx::query_as(&format!(
            r#"
            SELECT {CONVERSATION_COLUMNS}
            FROM conversations
            WHERE company_id = $1
              AND {bucket_clause}
              AND ($2::text IS NULL OR status = $2)
              AND ($3::text IS NULL OR EXISTS(
                    SELECT 1 FROM labels l
                    WHERE l.conversation_id = conversations.id
                      AND LOWER(l.name) = LOWER($3)))
            ORDER BY COALESCE(last_message_at, created_at) DESC
            "#,
        ))
        .bind(company_id.0)
        .bind(filter.status.map(|s| s.as_str()))
        .bind(filter.label.as_deref())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn append_message(&self, new: NewMessage) -> CoreResult<Message> {
        let mut tx = self.pool.begin().await?;

        // next_seq hands out the per-conversation sequence atomically
        let seq: Option<i64> = sqlx::query_scalar(
            r#"
            UPDATE conversations
            SET next_seq = next_seq + 1, last_message_at = NOW(), updated_at = NOW()
            WHERE id = $1
            RETURNING next_seq - 1
            "#,
        )
        .bind(new.conversation_id.0)
        .fetch_optional(&mut *tx)
        .await?;

        let seq = seq.ok_or(CoreError::NotFound("conversation"))?;

        let row: MessageRow = sqlx::query_as(
            r#"
            INSERT INTO messages (conversation_id, seq, sender, content, image_url)
            VALUES ($1, $2, $3, $4, $5)
            RETURNING id, conversation_id, seq, sender, content, image_url,
                      is_read, is_seen, created_at
            "#,
        )
        .bind(new.conversation_id.0)
        .bind(seq)
        .bind(new.sender.as_str())
        .bind(&new.content)
        .bind(&new.image_url)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn page_messages(
        &self,
        id: ConversationId,
        before_seq: Option<i64>,
        limit: i64,
    ) -> CoreResult<Vec<Message>> {
        let rows: Vec<MessageRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, seq, sender, content, image_url,
                   is_read, is_seen, created_at
            FROM messages
            WHERE conversation_id = $1
              AND ($2::bigint IS NULL OR seq < $2)
            ORDER BY seq DESC
            LIMIT $3
            "#,
        )
        .bind(id.0)
        .bind(before_seq)
        .bind(limit.clamp(1, 100))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn mark_read(&self, id: ConversationId, reader: SenderType) -> CoreResult<u64> {
        let result = sqlx::query(
            r#"
            UPDATE messages
            SET is_read = TRUE, is_seen = TRUE
            WHERE conversation_id = $1 AND sender <> $2 AND is_read = FALSE
            "#,
        )
        .bind(id.0)
        .bind(reader.as_str())
        .execute(&self.pool)
        .await?;

        Ok(result.rows_affected())
    }

    async fn unread_count(&self, id: ConversationId, reader: SenderType) -> CoreResult<i64> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*)
            FROM messages
            WHERE conversation_id = $1 AND sender <> $2 AND is_read = FALSE
            "#,
        )
        .bind(id.0)
        .bind(reader.as_str())
        .fetch_one(&self.pool)
        .await?;

        Ok(count)
    }

    async fn insert_label(
        &self,
        id: ConversationId,
        name: &str,
        source: Option<&str>,
    ) -> CoreResult<Label> {
        // The unique index on (conversation_id, LOWER(name)) turns duplicate
        // adds into a Conflict via the 23505 mapping.
        let row: LabelRow = sqlx::query_as(
            r#"
            INSERT INTO labels (conversation_id, name, source)
            VALUES ($1, $2, $3)
            RETURNING id, conversation_id, name, source, created_at
            "#,
        )
        .bind(id.0)
        .bind(name)
        .bind(source)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn update_label(
        &self,
        id: ConversationId,
        label_id: LabelId,
        name: Option<&str>,
        source: Option<&str>,
    ) -> CoreResult<Label> {
        let row: Option<LabelRow> = sqlx::query_as(
            r#"
            UPDATE labels
            SET name = COALESCE($3, name), source = COALESCE($4, source)
            WHERE id = $2 AND conversation_id = $1
            RETURNING id, conversation_id, name, source, created_at
            "#,
        )
        .bind(id.0)
        .bind(label_id.0)
        .bind(name)
        .bind(source)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into).ok_or(CoreError::NotFound("label"))
    }

    async fn delete_label(&self, id: ConversationId, label_id: LabelId) -> CoreResult<()> {
        let result = sqlx::query("DELETE FROM labels WHERE id = $2 AND conversation_id = $1")
            .bind(id.0)
            .bind(label_id.0)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(CoreError::NotFound("label"));
        }
        Ok(())
    }

    async fn labels(&self, id: ConversationId) -> CoreResult<Vec<Label>> {
        let rows: Vec<LabelRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, name, source, created_at
            FROM labels
            WHERE conversation_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn append_release(
        &self,
        id: ConversationId,
        agent_id: AgentId,
    ) -> CoreResult<ReleaseRecord> {
        let row: ReleaseRow = sqlx::query_as(
            r#"
            INSERT INTO release_records (conversation_id, agent_id)
            VALUES ($1, $2)
            RETURNING id, conversation_id, agent_id, released_at
            "#,
        )
        .bind(id.0)
        .bind(agent_id.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(row.into())
    }

    async fn release_history(&self, id: ConversationId) -> CoreResult<Vec<ReleaseRecord>> {
        let rows: Vec<ReleaseRow> = sqlx::query_as(
            r#"
            SELECT id, conversation_id, agent_id, released_at
            FROM release_records
            WHERE conversation_id = $1
            ORDER BY released_at DESC
            "#,
        )
        .bind(id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn open_assignment_counts(
        &self,
        company_id: CompanyId,
    ) -> CoreResult<HashMap<AgentId, i64>> {
        let rows: Vec<(Uuid, i64)> = sqlx::query_as(
            r#"
            SELECT assigned_to, COUNT(*)
            FROM conversations
            WHERE company_id = $1 AND status = 'open' AND assigned_to IS NOT NULL
            GROUP BY assigned_to
            "#,
        )
        .bind(company_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(agent, count)| (agent.into(), count))
            .collect())
    }

    async fn stats(&self, company_id: CompanyId, me: AgentId) -> CoreResult<StoredStats> {
        let row: (i64, i64, i64, i64, i64, i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*) as total_conversations,
                COUNT(*) FILTER (WHERE platform = 'facebook') as facebook_conversations,
                COUNT(*) FILTER (WHERE platform = 'whatsapp') as whatsapp_conversations,
                COUNT(*) FILTER (WHERE platform NOT IN ('facebook', 'whatsapp')) as other_conversations,
                COUNT(*) FILTER (WHERE status = 'open' AND assigned_to IS NULL) as inbox,
                COUNT(*) FILTER (WHERE status = 'open' AND assigned_to IS NOT NULL) as taken,
                COUNT(*) FILTER (WHERE status = 'closed') as complete,
                COUNT(*) FILTER (WHERE status = 'open' AND assigned_to = $2) as assigned_to_me
            FROM conversations
            WHERE company_id = $1
            "#,
        )
        .bind(company_id.0)
        .bind(me.0)
        .fetch_one(&self.pool)
        .await?;

        Ok(StoredStats {
            total_conversations: row.0,
            facebook_conversations: row.1,
            whatsapp_conversations: row.2,
            other_conversations: row.3,
            inbox: row.4,
            taken: row.5,
            complete: row.6,
            assigned_to_me: row.7,
        })
    }
}

// =============================================================================
// Agent Directory
// =============================================================================

/// Directory backed by the agents table.
pub struct PgDirectory {
    pool: PgPool,
}

impl PgDirectory {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(Debug, FromRow)]
struct AgentRow {
    id: Uuid,
    company_id: Uuid,
    display_name: String,
    role: String,
}

impl From<AgentRow> for Agent {
    fn from(row: AgentRow) -> Self {
        Agent {
            id: row.id.into(),
            company_id: row.company_id.into(),
            display_name: row.display_name,
            role: AgentRole::parse(&row.role),
        }
    }
}

#[async_trait]
impl AgentDirectory for PgDirectory {
    async fn agent(&self, id: AgentId) -> CoreResult<Agent> {
        let row: Option<AgentRow> = sqlx::query_as(
            "SELECT id, company_id, display_name, role FROM agents WHERE id = $1",
        )
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.map(Into::into).ok_or(CoreError::NotFound("agent"))
    }

    async fn agent_by_token(&self, token: &str) -> CoreResult<Option<Agent>> {
        let row: Option<AgentRow> = sqlx::query_as(
            "SELECT id, company_id, display_name, role FROM agents WHERE api_token = $1",
        )
        .bind(token)
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.map(Into::into))
    }

    async fn company_agents(&self, company_id: CompanyId) -> CoreResult<Vec<Agent>> {
        let rows: Vec<AgentRow> = sqlx::query_as(
            r#"
            SELECT id, company_id, display_name, role
            FROM agents
            WHERE company_id = $1
            ORDER BY created_at ASC
            "#,
        )
        .bind(company_id.0)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    async fn has_permission(&self, agent_id: AgentId, permission_name: &str) -> CoreResult<bool> {
        let agent = self.agent(agent_id).await?;
        Ok(role_grants(agent.role, permission_name))
    }
}
