//! Common types used across chatdesk

use std::fmt;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

// =============================================================================
// ID Wrappers
// =============================================================================

macro_rules! id_wrapper {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                Self(id)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }
    };
}

id_wrapper!(
    /// Company (tenant) ID wrapper
    CompanyId
);
id_wrapper!(
    /// Agent (employee) ID wrapper
    AgentId
);
id_wrapper!(
    /// Conversation ID wrapper
    ConversationId
);
id_wrapper!(
    /// Message ID wrapper
    MessageId
);
id_wrapper!(
    /// Label ID wrapper
    LabelId
);
id_wrapper!(
    /// Release record ID wrapper
    ReleaseId
);

// =============================================================================
// Enums
// =============================================================================

/// Source channel of a conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Platform {
    Facebook,
    Whatsapp,
    Other,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Facebook => "facebook",
            Platform::Whatsapp => "whatsapp",
            Platform::Other => "other",
        }
    }

    /// Parse a stored platform string. Unknown values map to `Other` so that
    /// new channel adapters never break existing rows.
    pub fn parse(s: &str) -> Self {
        match s {
            "facebook" => Platform::Facebook,
            "whatsapp" => Platform::Whatsapp,
            _ => Platform::Other,
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Conversation lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    Open,
    Closed,
}

impl ConversationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConversationStatus::Open => "open",
            ConversationStatus::Closed => "closed",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "closed" => ConversationStatus::Closed,
            _ => ConversationStatus::Open,
        }
    }
}

impl fmt::Display for ConversationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who authored a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SenderType {
    Customer,
    Agent,
    System,
}

impl SenderType {
    pub fn as_str(&self) -> &'static str {
        match self {
            SenderType::Customer => "customer",
            SenderType::Agent => "agent",
            SenderType::System => "system",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "customer" => SenderType::Customer,
            "agent" => SenderType::Agent,
            _ => SenderType::System,
        }
    }
}

/// Role of an agent within a company
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentRole {
    CustomerCare,
    Supervisor,
    Admin,
}

impl AgentRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentRole::CustomerCare => "customer_care",
            AgentRole::Supervisor => "supervisor",
            AgentRole::Admin => "admin",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "supervisor" => AgentRole::Supervisor,
            "admin" => AgentRole::Admin,
            _ => AgentRole::CustomerCare,
        }
    }
}

/// Current owner of a conversation.
///
/// Serializes as a nullable agent id (`assigned_to` style) to match the wire
/// shape clients already consume.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "Option<AgentId>", into = "Option<AgentId>")]
pub enum Assignment {
    Unassigned,
    AssignedTo(AgentId),
}

impl Assignment {
    pub fn agent(&self) -> Option<AgentId> {
        match self {
            Assignment::Unassigned => None,
            Assignment::AssignedTo(id) => Some(*id),
        }
    }

    pub fn is_assigned(&self) -> bool {
        matches!(self, Assignment::AssignedTo(_))
    }
}

impl From<Option<AgentId>> for Assignment {
    fn from(agent: Option<AgentId>) -> Self {
        match agent {
            Some(id) => Assignment::AssignedTo(id),
            None => Assignment::Unassigned,
        }
    }
}

impl From<Assignment> for Option<AgentId> {
    fn from(assignment: Assignment) -> Self {
        assignment.agent()
    }
}

/// The three list-view buckets. A view over status + assignment, never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Bucket {
    Inbox,
    Taken,
    Complete,
}

impl Bucket {
    pub fn derive(status: ConversationStatus, assignment: Assignment) -> Self {
        match (status, assignment) {
            (ConversationStatus::Closed, _) => Bucket::Complete,
            (ConversationStatus::Open, Assignment::Unassigned) => Bucket::Inbox,
            (ConversationStatus::Open, Assignment::AssignedTo(_)) => Bucket::Taken,
        }
    }
}

// =============================================================================
// Permissions
// =============================================================================

/// Permission names consulted through the opaque directory check.
pub mod permission {
    /// Take, release, and complete own conversations
    pub const HANDLE_CONVERSATIONS: &str = "handle_conversations";
    /// Release/complete conversations owned by other agents
    pub const SUPERVISE_CONVERSATIONS: &str = "supervise_conversations";
}

// =============================================================================
// Domain Records
// =============================================================================

/// An inbound customer conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conversation {
    pub id: ConversationId,
    pub company_id: CompanyId,
    pub platform: Platform,
    pub external_user_id: String,
    pub external_user_name: String,
    pub status: ConversationStatus,
    #[serde(rename = "assigned_to")]
    pub assignment: Assignment,
    #[serde(with = "time::serde::rfc3339::option")]
    pub last_message_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub closed_at: Option<OffsetDateTime>,
}

impl Conversation {
    pub fn bucket(&self) -> Bucket {
        Bucket::derive(self.status, self.assignment)
    }
}

/// A single message within a conversation. Append-only; `seq` is the
/// canonical read order, strictly increasing per conversation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub conversation_id: ConversationId,
    pub seq: i64,
    pub sender: SenderType,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    pub is_read: bool,
    pub is_seen: bool,
}

/// A named tag attached to a conversation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Label {
    pub id: LabelId,
    pub conversation_id: ConversationId,
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

/// Audit record of an unassignment. Append-only, never mutated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReleaseRecord {
    pub id: ReleaseId,
    pub conversation_id: ConversationId,
    pub agent_id: AgentId,
    #[serde(with = "time::serde::rfc3339")]
    pub released_at: OffsetDateTime,
}

/// An agent as seen by the messaging core. Credentials live in the directory.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Agent {
    pub id: AgentId,
    pub company_id: CompanyId,
    pub display_name: String,
    pub role: AgentRole,
}

// =============================================================================
// Composite Views
// =============================================================================

/// List-view row: conversation plus derived counters and labels
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub unread_count: i64,
    pub labels: Vec<Label>,
}

/// Detail view: everything a conversation page needs in one fetch
#[derive(Debug, Clone, Serialize)]
pub struct ConversationDetail {
    #[serde(flatten)]
    pub conversation: Conversation,
    pub messages: Vec<Message>,
    pub labels: Vec<Label>,
    pub unread_count: i64,
    pub typing: Vec<AgentId>,
    pub online: Vec<AgentId>,
}

/// Per-company dashboard counters
#[derive(Debug, Clone, Default, Serialize)]
pub struct AssignmentStats {
    pub total_conversations: i64,
    pub facebook_conversations: i64,
    pub whatsapp_conversations: i64,
    pub other_conversations: i64,
    pub inbox: i64,
    pub taken: i64,
    pub complete: i64,
    pub assigned_to_me: i64,
    pub eligible_reps: i64,
}
