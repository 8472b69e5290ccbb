//! Bearer-token authentication middleware
//!
//! Session issuance lives outside this service; the middleware only
//! resolves an opaque bearer token to an agent through the directory.

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use chatdesk_shared::Agent;

use crate::{error::ApiError, state::AppState};

/// Authenticated agent attached to the request extensions
#[derive(Debug, Clone)]
pub struct AuthAgent(pub Agent);

pub async fn require_agent(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|h| h.strip_prefix("Bearer "))
        .ok_or(ApiError::Unauthorized)?;

    let agent = state
        .service
        .directory()
        .agent_by_token(token)
        .await
        .map_err(ApiError::from)?
        .ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(AuthAgent(agent));
    Ok(next.run(req).await)
}
