//! Channel adapter ingestion
//!
//! Adapters (Facebook/WhatsApp webhook normalizers) deliver inbound
//! messages as a normalized tuple; this endpoint is the only entry point
//! for customer-authored messages. Adapter payload parsing happens
//! upstream, never here.

use axum::{
    extract::State,
    http::HeaderMap,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chatdesk_core::service::InboundMessage;
use chatdesk_shared::{CompanyId, Conversation, Message, Platform};

use crate::{
    error::{ApiError, ApiResult},
    state::AppState,
};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub company_id: Uuid,
    pub platform: Platform,
    pub external_user_id: String,
    #[serde(default)]
    pub external_user_name: String,
    pub content: Option<String>,
    pub image_url: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub conversation: Conversation,
    pub message: Message,
}

pub async fn ingest_message(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<IngestRequest>,
) -> ApiResult<Json<IngestResponse>> {
    let token = headers
        .get("x-ingest-token")
        .and_then(|h| h.to_str().ok())
        .ok_or(ApiError::Unauthorized)?;
    if token != state.config.ingest_token {
        return Err(ApiError::Unauthorized);
    }

    let (conversation, message) = state
        .service
        .ingest_inbound(InboundMessage {
            company_id: CompanyId::from(req.company_id),
            platform: req.platform,
            external_user_id: req.external_user_id,
            external_user_name: req.external_user_name,
            content: req.content,
            image_url: req.image_url,
        })
        .await?;

    Ok(Json(IngestResponse {
        conversation,
        message,
    }))
}
