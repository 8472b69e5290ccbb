//! Conversation routes
//!
//! The REST fallback surface. Every handler delegates to the same
//! `ConversationService` operation the WebSocket gateway invokes, so a
//! client that loses its socket falls back here with identical semantics.

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

use chatdesk_core::store::ListFilter;
use chatdesk_shared::{
    AssignmentStats, Bucket, Conversation, ConversationDetail, ConversationId,
    ConversationStatus, ConversationSummary, Label, LabelId, Message, ReleaseRecord, SenderType,
};

use crate::{
    auth::AuthAgent,
    error::{ApiError, ApiResult},
    state::AppState,
};

// =============================================================================
// Request/Response Types
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct ListConversationsQuery {
    pub bucket: Option<Bucket>,
    pub status: Option<ConversationStatus>,
    pub label: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ConversationsListResponse {
    pub conversations: Vec<ConversationSummary>,
}

#[derive(Debug, Deserialize)]
pub struct SendMessageRequest {
    pub content: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct PageMessagesQuery {
    pub before_seq: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseResponse {
    pub conversation: Conversation,
    pub release: ReleaseRecord,
}

#[derive(Debug, Serialize)]
pub struct MarkReadResponse {
    pub updated: u64,
}

#[derive(Debug, Deserialize)]
pub struct TypingRequest {
    pub is_typing: bool,
}

#[derive(Debug, Deserialize)]
pub struct PresenceRequest {
    pub online: bool,
}

#[derive(Debug, Deserialize)]
pub struct CreateLabelRequest {
    pub name: String,
    pub source: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct UpdateLabelRequest {
    pub name: Option<String>,
    pub source: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ReleaseHistoryResponse {
    pub releases: Vec<ReleaseRecord>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Load a conversation and verify it belongs to the caller's company.
/// Cross-tenant ids read as NotFound so they leak nothing.
async fn conversation_for(
    state: &AppState,
    agent: &AuthAgent,
    conversation_id: Uuid,
) -> ApiResult<Conversation> {
    let conv = state
        .service
        .conversation(ConversationId::from(conversation_id))
        .await?;
    if conv.company_id != agent.0.company_id {
        return Err(ApiError::NotFound);
    }
    Ok(conv)
}

// =============================================================================
// Handlers
// =============================================================================

pub async fn list_conversations(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Query(query): Query<ListConversationsQuery>,
) -> ApiResult<Json<ConversationsListResponse>> {
    let conversations = state
        .service
        .list_conversations(
            agent.0.company_id,
            query.bucket.unwrap_or(Bucket::Inbox),
            ListFilter {
                status: query.status,
                label: query.label,
            },
        )
        .await?;

    Ok(Json(ConversationsListResponse { conversations }))
}

pub async fn get_conversation(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<ConversationDetail>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let detail = state
        .service
        .get_conversation(ConversationId::from(conversation_id))
        .await?;
    Ok(Json(detail))
}

pub async fn assign_conversation(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let conv = state
        .service
        .assign(ConversationId::from(conversation_id), agent.0.id)
        .await?;
    Ok(Json(conv))
}

pub async fn release_conversation(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<ReleaseResponse>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let (conversation, release) = state
        .service
        .unassign(ConversationId::from(conversation_id), agent.0.id)
        .await?;
    Ok(Json(ReleaseResponse {
        conversation,
        release,
    }))
}

pub async fn complete_conversation(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<Conversation>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let conv = state
        .service
        .complete(ConversationId::from(conversation_id), agent.0.id)
        .await?;
    Ok(Json(conv))
}

pub async fn send_message(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<Message>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let message = state
        .service
        .send_message(
            ConversationId::from(conversation_id),
            agent.0.id,
            req.content,
            req.image_url,
        )
        .await?;
    Ok(Json(message))
}

pub async fn page_messages(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
    Query(query): Query<PageMessagesQuery>,
) -> ApiResult<Json<MessagesResponse>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let messages = state
        .service
        .page_messages(
            ConversationId::from(conversation_id),
            query.before_seq,
            query.limit,
        )
        .await?;
    Ok(Json(MessagesResponse { messages }))
}

pub async fn mark_read(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<MarkReadResponse>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let updated = state
        .service
        .mark_read(ConversationId::from(conversation_id), SenderType::Agent)
        .await?;
    Ok(Json(MarkReadResponse { updated }))
}

/// Typing is best-effort: failures are swallowed, the caller always gets ok.
pub async fn set_typing(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<TypingRequest>,
) -> Json<Value> {
    if conversation_for(&state, &agent, conversation_id).await.is_ok() {
        let id = ConversationId::from(conversation_id);
        let result = if req.is_typing {
            state.service.set_typing(id, agent.0.id).await
        } else {
            state.service.clear_typing(id, agent.0.id).await
        };
        if let Err(err) = result {
            tracing::debug!(conversation_id = %id, error = %err, "Typing update ignored");
        }
    }
    Json(json!({ "status": "ok" }))
}

/// Presence is best-effort, same contract as typing.
pub async fn set_presence(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<PresenceRequest>,
) -> Json<Value> {
    if conversation_for(&state, &agent, conversation_id).await.is_ok() {
        let id = ConversationId::from(conversation_id);
        let result = if req.online {
            state.service.mark_online(id, agent.0.id).await
        } else {
            state.service.mark_offline(id, agent.0.id).await
        };
        if let Err(err) = result {
            tracing::debug!(conversation_id = %id, error = %err, "Presence update ignored");
        }
    }
    Json(json!({ "status": "ok" }))
}

pub async fn add_label(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
    Json(req): Json<CreateLabelRequest>,
) -> ApiResult<Json<Label>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let label = state
        .service
        .add_label(
            ConversationId::from(conversation_id),
            &req.name,
            req.source.as_deref(),
        )
        .await?;
    Ok(Json(label))
}

pub async fn update_label(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path((conversation_id, label_id)): Path<(Uuid, Uuid)>,
    Json(req): Json<UpdateLabelRequest>,
) -> ApiResult<Json<Label>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let label = state
        .service
        .update_label(
            ConversationId::from(conversation_id),
            LabelId::from(label_id),
            req.name.as_deref(),
            req.source.as_deref(),
        )
        .await?;
    Ok(Json(label))
}

pub async fn delete_label(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path((conversation_id, label_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<Value>> {
    conversation_for(&state, &agent, conversation_id).await?;
    state
        .service
        .delete_label(
            ConversationId::from(conversation_id),
            LabelId::from(label_id),
        )
        .await?;
    Ok(Json(json!({ "status": "deleted" })))
}

pub async fn get_release_history(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
    Path(conversation_id): Path<Uuid>,
) -> ApiResult<Json<ReleaseHistoryResponse>> {
    conversation_for(&state, &agent, conversation_id).await?;
    let releases = state
        .service
        .release_history(ConversationId::from(conversation_id))
        .await?;
    Ok(Json(ReleaseHistoryResponse { releases }))
}

pub async fn get_stats(
    State(state): State<AppState>,
    Extension(agent): Extension<AuthAgent>,
) -> ApiResult<Json<AssignmentStats>> {
    let stats = state
        .service
        .assignment_stats(agent.0.company_id, agent.0.id)
        .await?;
    Ok(Json(stats))
}
