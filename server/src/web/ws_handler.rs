use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use futures_util::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use crate::engine::events::ClientFrame;

use super::app_state::AppState;

/// WebSocket close code for policy violations (RFC 6455 §7.4.1).
const CLOSE_POLICY_VIOLATION: u16 = 1008;

/// GET /sessions/{session_id} — upgrade to the session's real-time channel.
pub async fn ws_upgrade(
    ws: WebSocketUpgrade,
    Path(session_id): Path<String>,
    State(state): State<Arc<AppState>>,
) -> Response {
    ws.on_upgrade(move |socket| handle_socket(socket, state, session_id))
}

/// Per-connection loop. The connection is unbound until a `join` frame is
/// processed, bound until a `leave` frame or transport close, then gone.
async fn handle_socket(socket: WebSocket, state: Arc<AppState>, session_id: String) {
    let (mut sender, mut receiver) = socket.split();

    if !state.registry.contains(&session_id) {
        let _ = sender
            .send(Message::Close(Some(CloseFrame {
                code: CLOSE_POLICY_VIOLATION,
                reason: "Session not found".into(),
            })))
            .await;
        return;
    }

    info!(%session_id, "websocket connected");

    // ── Unbound: wait for the join frame ────────────────────────────
    let (connection_id, user_name, mut outbound_rx) = loop {
        let Some(Ok(msg)) = receiver.next().await else {
            debug!(%session_id, "client disconnected before joining");
            return;
        };
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => return,
            _ => continue,
        };

        match serde_json::from_str::<ClientFrame>(&text) {
            Ok(ClientFrame::Join { user_name, avatar, color }) => {
                // The session may have been evicted since the pre-check.
                match state.registry.bind(&session_id, &user_name, avatar, color) {
                    Ok((connection_id, rx)) => break (connection_id, user_name, rx),
                    Err(err) => {
                        warn!(%session_id, %err, "join rejected");
                        let _ = sender
                            .send(Message::Close(Some(CloseFrame {
                                code: CLOSE_POLICY_VIOLATION,
                                reason: err.to_string().into(),
                            })))
                            .await;
                        return;
                    }
                }
            }
            Ok(_) => debug!(%session_id, "ignoring frame from unbound connection"),
            Err(err) => warn!(%session_id, error = %err, "failed to parse frame"),
        }
    };

    // ── Outbound pump: registry events → socket ─────────────────────
    // Ends when the registry drops this connection's handle (leave or
    // session removal) or the socket dies.
    let writer = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                Err(err) => warn!(error = %err, "failed to encode event"),
            }
        }
        let _ = sender.close().await;
    });

    // ── Bound: dispatch frames until leave or close ─────────────────
    while let Some(Ok(msg)) = receiver.next().await {
        let text = match msg {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let frame = match serde_json::from_str::<ClientFrame>(&text) {
            Ok(frame) => frame,
            Err(err) => {
                // Malformed frames never terminate the session for anyone.
                warn!(%session_id, error = %err, "failed to parse frame");
                continue;
            }
        };

        match frame {
            ClientFrame::Join { user_name: name, avatar, color } => {
                // A repeated join on an already-bound connection is treated
                // as a profile refresh for the bound identity.
                if name == user_name {
                    state.registry.update_profile(&session_id, &user_name, avatar, color);
                } else {
                    debug!(%session_id, "ignoring join with a different identity on a bound connection");
                }
            }
            ClientFrame::Message { message, sender } => {
                state
                    .registry
                    .post_message(&session_id, &user_name, message, sender);
            }
            ClientFrame::WhiteboardAction { action, target_board } => {
                state.registry.post_whiteboard_action(
                    &session_id,
                    &user_name,
                    action,
                    target_board,
                    connection_id,
                );
            }
            ClientFrame::ProfileUpdate { avatar, color } => {
                state
                    .registry
                    .update_profile(&session_id, &user_name, avatar, color);
            }
            ClientFrame::Leave => break,
            ClientFrame::Unknown => debug!(%session_id, "ignoring unrecognized frame type"),
        }
    }

    // Explicit leave and transport close take the same path; leave() is a
    // no-op if the registry already dropped this connection.
    state.registry.leave(connection_id);
    writer.abort();
    info!(%session_id, %user_name, "websocket disconnected");
}
