//! WebSocket handler for Axum
//!
//! Handles connection upgrade, token authentication, and event routing.
//! Inbound client events are mapped onto the same `ConversationService`
//! operations the REST routes call; outbound events arrive through the
//! core fan-out hub.

use axum::{
    extract::{
        ws::{Message, WebSocket},
        Query, State, WebSocketUpgrade,
    },
    http::StatusCode,
    response::Response,
};
use futures::{stream::StreamExt, SinkExt};
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::mpsc;

use chatdesk_core::{ConversationEvent, Subscriber};
use chatdesk_shared::{Agent, ConversationId, SenderType};

use crate::state::AppState;

use super::events::{ClientEvent, ControlEvent, ServerFrame};

#[derive(Debug, Deserialize)]
pub struct WebSocketQuery {
    token: String,
}

/// WebSocket handler - upgrades HTTP connection to WebSocket.
/// Authenticates via query parameter token instead of middleware Extension.
pub async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<AppState>,
    Query(params): Query<WebSocketQuery>,
) -> Result<Response, StatusCode> {
    let agent = match state.service.directory().agent_by_token(&params.token).await {
        Ok(Some(agent)) => agent,
        Ok(None) => {
            tracing::warn!("WebSocket auth failed: unknown token");
            return Err(StatusCode::UNAUTHORIZED);
        }
        Err(err) => {
            tracing::error!(error = %err, "WebSocket auth: directory error");
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    tracing::info!(agent_id = %agent.id, "WebSocket connection upgrade requested");
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, agent, state)))
}

/// Handle individual WebSocket connection
async fn handle_socket(socket: WebSocket, agent: Agent, state: AppState) {
    let (mut sender, mut receiver) = socket.split();

    // Frames to the client go through one channel; core events are
    // forwarded into it so ordering per producer is preserved.
    let (frame_tx, mut frame_rx) = mpsc::unbounded_channel::<ServerFrame>();
    let (event_tx, mut event_rx) = mpsc::unbounded_channel::<ConversationEvent>();

    let sub = Arc::new(Subscriber::new(agent.id, event_tx));
    let session_id = sub.session_id;

    let forward_tx = frame_tx.clone();
    let forward_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            if forward_tx.send(ServerFrame::Event(event)).is_err() {
                break; // Connection closed
            }
        }
    });

    // Every session follows its company's aggregate feed for list badges.
    if let Err(err) = state
        .service
        .subscribe_company(agent.company_id, agent.id, Arc::clone(&sub))
        .await
    {
        tracing::error!(agent_id = %agent.id, error = %err, "Company feed subscription failed");
    }

    let _ = frame_tx.send(ServerFrame::Control(ControlEvent::Connected { session_id }));

    // Spawn task to send frames to the client
    let send_task = tokio::spawn(async move {
        while let Some(frame) = frame_rx.recv().await {
            match serde_json::to_string(&frame) {
                Ok(json) => {
                    if sender.send(Message::Text(json)).await.is_err() {
                        break; // Connection closed
                    }
                }
                Err(err) => {
                    tracing::error!(error = %err, "Failed to serialize WebSocket frame");
                }
            }
        }
    });

    // Handle incoming messages
    while let Some(msg) = receiver.next().await {
        let Ok(msg) = msg else { break };
        match msg {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    handle_client_event(event, &agent, &sub, &frame_tx, &state).await;
                }
                Err(err) => {
                    tracing::warn!(
                        error = %err,
                        message = %text,
                        "Failed to parse client event"
                    );
                    let _ = frame_tx.send(ServerFrame::Control(ControlEvent::Error {
                        message: "Invalid event format".to_string(),
                    }));
                }
            },
            Message::Close(_) => {
                tracing::info!(session_id = %session_id, "WebSocket close frame received");
                break;
            }
            Message::Ping(_) | Message::Pong(_) => {
                // Axum handles ping/pong automatically
            }
            _ => {} // Ignore binary messages
        }
    }

    // Cleanup on disconnect. The client re-subscribes and re-fetches on
    // reconnect; there is no missed-event replay.
    tracing::info!(session_id = %session_id, agent_id = %agent.id, "WebSocket connection closing");
    state.service.remove_session(&session_id).await;
    forward_task.abort();
    send_task.abort();
}

/// Handle client event
async fn handle_client_event(
    event: ClientEvent,
    agent: &Agent,
    sub: &Arc<Subscriber>,
    frame_tx: &mpsc::UnboundedSender<ServerFrame>,
    state: &AppState,
) {
    use ClientEvent::*;

    match event {
        Subscribe { conversation_id } => {
            let result = state
                .service
                .subscribe_conversation(
                    ConversationId::from(conversation_id),
                    agent.id,
                    Arc::clone(sub),
                )
                .await;
            if let Err(err) = result {
                let _ = frame_tx.send(ServerFrame::Control(ControlEvent::Error {
                    message: err.to_string(),
                }));
            }
        }

        Unsubscribe { conversation_id } => {
            state
                .service
                .unsubscribe_conversation(ConversationId::from(conversation_id), &sub.session_id)
                .await;
        }

        SendMessage {
            conversation_id,
            content,
            image_url,
        } => {
            let result = state
                .service
                .send_message(
                    ConversationId::from(conversation_id),
                    agent.id,
                    content,
                    image_url,
                )
                .await;
            if let Err(err) = result {
                let _ = frame_tx.send(ServerFrame::Control(ControlEvent::Error {
                    message: err.to_string(),
                }));
            }
        }

        TypingStart { conversation_id } => {
            // Best-effort: typing must never interrupt the session
            if let Err(err) = state
                .service
                .set_typing(ConversationId::from(conversation_id), agent.id)
                .await
            {
                tracing::debug!(error = %err, "Typing start ignored");
            }
        }

        TypingStop { conversation_id } => {
            if let Err(err) = state
                .service
                .clear_typing(ConversationId::from(conversation_id), agent.id)
                .await
            {
                tracing::debug!(error = %err, "Typing stop ignored");
            }
        }

        MarkOnline { conversation_id } => {
            if let Err(err) = state
                .service
                .mark_online(ConversationId::from(conversation_id), agent.id)
                .await
            {
                tracing::debug!(error = %err, "Presence update ignored");
            }
        }

        MarkOffline { conversation_id } => {
            if let Err(err) = state
                .service
                .mark_offline(ConversationId::from(conversation_id), agent.id)
                .await
            {
                tracing::debug!(error = %err, "Presence update ignored");
            }
        }

        MarkRead { conversation_id } => {
            let result = state
                .service
                .mark_read(ConversationId::from(conversation_id), SenderType::Agent)
                .await;
            if let Err(err) = result {
                let _ = frame_tx.send(ServerFrame::Control(ControlEvent::Error {
                    message: err.to_string(),
                }));
            }
        }

        Ping => {
            let _ = frame_tx.send(ServerFrame::Control(ControlEvent::Pong));
        }
    }
}
