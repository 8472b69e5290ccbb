//! API routes

pub mod conversations;
pub mod health;
pub mod ingest;

use axum::{
    extract::DefaultBodyLimit,
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::{auth::require_agent, state::AppState, websocket::ws_handler};

/// Create all API routes
pub fn create_router(state: AppState) -> Router {
    // Health check routes (at root level for infrastructure monitoring)
    let health_routes = Router::new().route("/health", get(health::health));

    // Channel adapter ingestion (shared-secret header, not agent auth)
    let ingest_routes = Router::new().route("/ingest/message", post(ingest::ingest_message));

    // Agent-facing routes (bearer token required). Every operation here is
    // also reachable over the WebSocket path with identical semantics.
    let protected_routes = Router::new()
        .route("/conversations", get(conversations::list_conversations))
        .route(
            "/conversations/:conversation_id",
            get(conversations::get_conversation),
        )
        .route(
            "/conversations/:conversation_id/assign",
            post(conversations::assign_conversation),
        )
        .route(
            "/conversations/:conversation_id/release",
            post(conversations::release_conversation),
        )
        .route(
            "/conversations/:conversation_id/complete",
            post(conversations::complete_conversation),
        )
        .route(
            "/conversations/:conversation_id/messages",
            get(conversations::page_messages).post(conversations::send_message),
        )
        .route(
            "/conversations/:conversation_id/read",
            post(conversations::mark_read),
        )
        .route(
            "/conversations/:conversation_id/typing",
            post(conversations::set_typing),
        )
        .route(
            "/conversations/:conversation_id/presence",
            post(conversations::set_presence),
        )
        .route(
            "/conversations/:conversation_id/labels",
            post(conversations::add_label),
        )
        .route(
            "/conversations/:conversation_id/labels/:label_id",
            axum::routing::patch(conversations::update_label).delete(conversations::delete_label),
        )
        .route(
            "/conversations/:conversation_id/releases",
            get(conversations::get_release_history),
        )
        .route("/stats", get(conversations::get_stats))
        .layer(middleware::from_fn_with_state(state.clone(), require_agent));

    // WebSocket route (auth handled in handler via query parameter)
    let websocket_routes = Router::new().route("/ws", get(ws_handler));

    let api_v1_routes = Router::new()
        .merge(protected_routes)
        .merge(ingest_routes)
        .merge(websocket_routes);

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", api_v1_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .layer(DefaultBodyLimit::max(1024 * 1024))
        .with_state(state)
}
